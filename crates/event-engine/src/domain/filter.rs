//! # Event Filters
//!
//! LDAP-style filter expressions (RFC 1960) evaluated against event
//! properties.
//!
//! ```text
//! (&(severity>=3)(|(source=net*)(source=disk))(!(muted=true)))
//! ```
//!
//! Attribute names are matched case-insensitively. Array properties match
//! when any element matches. Numbers and booleans are compared by value.

use crate::error::{EngineError, EngineResult};
use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag, take_while1},
    character::complete::{anychar, char, multispace0, none_of},
    combinator::{all_consuming, map, map_res, opt},
    multi::{many1, separated_list1},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum EventFilter {
    And(Vec<EventFilter>),
    Or(Vec<EventFilter>),
    Not(Box<EventFilter>),
    /// `(key=*)`
    Present(String),
    /// `(key=value)`
    Equal(String, String),
    /// `(key~=value)`
    Approx(String, String),
    /// `(key>=value)`
    GreaterEq(String, String),
    /// `(key<=value)`
    LessEq(String, String),
    /// `(key=a*b*c)`: literal pieces between wildcards; empty first/last
    /// piece means an unanchored start/end.
    Substring(String, Vec<String>),
}

impl EventFilter {
    /// Parse a filter expression.
    pub fn parse(expression: &str) -> EngineResult<Self> {
        all_consuming(delimited(multispace0, filter, multispace0))(expression)
            .map(|(_, filter)| filter)
            .map_err(|e| invalid(expression, e))
    }

    /// Evaluate against a property lookup.
    ///
    /// `lookup` receives the attribute name as written in the filter and is
    /// responsible for case-insensitive resolution.
    pub fn matches<F>(&self, lookup: &F) -> bool
    where
        F: Fn(&str) -> Option<Value>,
    {
        match self {
            Self::And(filters) => filters.iter().all(|f| f.matches(lookup)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(lookup)),
            Self::Not(filter) => !filter.matches(lookup),
            Self::Present(key) => lookup(key).is_some_and(|v| !v.is_null()),
            Self::Equal(key, expected) => compare_with(lookup(key), &|v| equal(v, expected)),
            Self::Approx(key, expected) => compare_with(lookup(key), &|v| approx(v, expected)),
            Self::GreaterEq(key, expected) => compare_with(lookup(key), &|v| {
                ordering(v, expected).is_some_and(|o| o != Ordering::Less)
            }),
            Self::LessEq(key, expected) => compare_with(lookup(key), &|v| {
                ordering(v, expected).is_some_and(|o| o != Ordering::Greater)
            }),
            Self::Substring(key, pieces) => {
                compare_with(lookup(key), &|v| scalar_text(v).is_some_and(|s| substring(&s, pieces)))
            }
        }
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(filters) => {
                f.write_str("(&")?;
                filters.iter().try_for_each(|x| write!(f, "{x}"))?;
                f.write_str(")")
            }
            Self::Or(filters) => {
                f.write_str("(|")?;
                filters.iter().try_for_each(|x| write!(f, "{x}"))?;
                f.write_str(")")
            }
            Self::Not(filter) => write!(f, "(!{filter})"),
            Self::Present(key) => write!(f, "({key}=*)"),
            Self::Equal(key, v) => write!(f, "({key}={})", escape(v)),
            Self::Approx(key, v) => write!(f, "({key}~={})", escape(v)),
            Self::GreaterEq(key, v) => write!(f, "({key}>={})", escape(v)),
            Self::LessEq(key, v) => write!(f, "({key}<={})", escape(v)),
            Self::Substring(key, pieces) => {
                let joined: Vec<String> = pieces.iter().map(|p| escape(p)).collect();
                write!(f, "({key}={})", joined.join("*"))
            }
        }
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Apply `test` to the value, or to each element when it is an array.
fn compare_with(value: Option<Value>, test: &dyn Fn(&Value) -> bool) -> bool {
    match value {
        Some(Value::Array(items)) => items.iter().any(test),
        Some(value) => test(&value),
        None => false,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn equal(value: &Value, expected: &str) -> bool {
    match value {
        Value::Number(_) => ordering(value, expected) == Some(Ordering::Equal),
        Value::Bool(b) => expected.trim().parse::<bool>().is_ok_and(|e| e == *b),
        Value::String(s) => s == expected,
        _ => false,
    }
}

fn approx(value: &Value, expected: &str) -> bool {
    let normalize = |s: &str| -> String {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect()
    };
    match value {
        Value::String(s) => normalize(s) == normalize(expected),
        other => equal(other, expected) || scalar_text(other).is_some_and(|s| normalize(&s) == normalize(expected)),
    }
}

fn ordering(value: &Value, expected: &str) -> Option<Ordering> {
    match value {
        Value::Number(n) => {
            let expected = expected.trim();
            if let (Some(actual), Ok(wanted)) = (n.as_i64(), expected.parse::<i64>()) {
                return Some(actual.cmp(&wanted));
            }
            let wanted = expected.parse::<f64>().ok()?;
            n.as_f64()?.partial_cmp(&wanted)
        }
        Value::String(s) => Some(s.as_str().cmp(expected)),
        _ => None,
    }
}

fn substring(text: &str, pieces: &[String]) -> bool {
    let Some((first, rest)) = pieces.split_first() else {
        return true;
    };
    let Some((last, middle)) = rest.split_last() else {
        return text == first;
    };
    let Some(mut remaining) = text.strip_prefix(first.as_str()) else {
        return false;
    };
    for piece in middle {
        match remaining.find(piece.as_str()) {
            Some(idx) => remaining = &remaining[idx + piece.len()..],
            None => return false,
        }
    }
    remaining.len() >= last.len() && remaining.ends_with(last.as_str())
}

// =============================================================================
// Grammar
// =============================================================================
//
// filter   = "(" ( "&" filter+ / "|" filter+ / "!" filter / item ) ")"
// item     = attr ( "=" / "~=" / ">=" / "<=" ) value
// value    = piece *( "*" piece )
// piece    = *( plain / "\\" any )

type ParseResult<'a, O> = IResult<&'a str, O>;

fn filter(input: &str) -> ParseResult<'_, EventFilter> {
    delimited(
        pair(multispace0, char('(')),
        preceded(multispace0, alt((and, or, not, item))),
        pair(multispace0, char(')')),
    )(input)
}

fn and(input: &str) -> ParseResult<'_, EventFilter> {
    map(preceded(char('&'), many1(filter)), EventFilter::And)(input)
}

fn or(input: &str) -> ParseResult<'_, EventFilter> {
    map(preceded(char('|'), many1(filter)), EventFilter::Or)(input)
}

fn not(input: &str) -> ParseResult<'_, EventFilter> {
    map(preceded(char('!'), filter), |f| EventFilter::Not(Box::new(f)))(input)
}

fn attribute(input: &str) -> ParseResult<'_, String> {
    map_res(
        take_while1(|c: char| !matches!(c, '=' | '~' | '<' | '>' | '(' | ')')),
        |raw: &str| match raw.trim() {
            "" => Err("missing attribute name"),
            key => Ok(key.to_owned()),
        },
    )(input)
}

fn operator(input: &str) -> ParseResult<'_, &str> {
    alt((tag("~="), tag(">="), tag("<="), tag("=")))(input)
}

/// Literal run between unescaped wildcards; may be empty.
fn piece(input: &str) -> ParseResult<'_, String> {
    map(
        opt(escaped_transform(none_of("\\*()"), '\\', anychar)),
        Option::unwrap_or_default,
    )(input)
}

fn value(input: &str) -> ParseResult<'_, Vec<String>> {
    separated_list1(char('*'), piece)(input)
}

fn item(input: &str) -> ParseResult<'_, EventFilter> {
    map_res(tuple((attribute, operator, value)), |(key, op, pieces)| {
        build_item(key, op, pieces)
    })(input)
}

fn build_item(key: String, op: &str, mut pieces: Vec<String>) -> Result<EventFilter, &'static str> {
    if op != "=" {
        if pieces.len() > 1 {
            return Err("wildcard only allowed in equality");
        }
        let value = pieces.pop().unwrap_or_default();
        return Ok(match op {
            "~=" => EventFilter::Approx(key, value),
            ">=" => EventFilter::GreaterEq(key, value),
            _ => EventFilter::LessEq(key, value),
        });
    }
    Ok(match pieces.as_slice() {
        [single] => EventFilter::Equal(key, single.clone()),
        [a, b] if a.is_empty() && b.is_empty() => EventFilter::Present(key),
        _ => EventFilter::Substring(key, pieces),
    })
}

fn invalid(expression: &str, err: nom::Err<nom::error::Error<&str>>) -> EngineError {
    let reason = match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => format!(
            "{:?} at offset {}",
            e.code,
            expression.len() - e.input.len()
        ),
        nom::Err::Incomplete(_) => "unexpected end of filter".to_owned(),
    };
    EngineError::InvalidFilter {
        filter: expression.to_owned(),
        reason,
    }
}
