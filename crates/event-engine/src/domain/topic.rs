//! # Topics
//!
//! Hierarchical `/`-separated topic names and the subscription patterns that
//! select them.
//!
//! ```text
//! "org/apache/ant"   discrete topic
//! "org/apache/*"     wildcard, prefix key "org/apache/"
//! "*"                wildcard, prefix key "" (matches every topic)
//! ```

use crate::domain::index::TopicData;
use crate::error::{EngineError, EngineResult};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// Separator between topic segments.
pub const TOPIC_SEPARATOR: char = '/';

/// Marker that turns a pattern into a wildcard.
pub const WILDCARD: &str = "*";

/// One parsed subscription (or stage) pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TopicPattern {
    /// Matches exactly this topic name.
    Discrete(String),
    /// Matches every topic starting with this prefix (trailing `/` kept).
    Wildcard(String),
}

impl TopicPattern {
    /// Parse a raw pattern. Malformed patterns yield `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == WILDCARD {
            return Some(Self::Wildcard(String::new()));
        }
        if let Some(body) = raw.strip_suffix("/*") {
            return validate_name(body)
                .ok()
                .map(|()| Self::Wildcard(format!("{body}{TOPIC_SEPARATOR}")));
        }
        validate_name(raw)
            .ok()
            .map(|()| Self::Discrete(raw.to_owned()))
    }

    /// Whether this pattern selects `topic`.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            Self::Discrete(name) => name == topic,
            Self::Wildcard(prefix) => topic.starts_with(prefix.as_str()),
        }
    }
}

/// Discrete and wildcard sets derived from a list of raw patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicPatterns {
    pub discrete: BTreeSet<String>,
    pub wildcard: BTreeSet<String>,
}

impl TopicPatterns {
    /// Parse every pattern, silently dropping malformed ones.
    pub fn parse<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Self::default();
        for raw in patterns {
            match TopicPattern::parse(raw.as_ref()) {
                Some(TopicPattern::Discrete(name)) => {
                    parsed.discrete.insert(name);
                }
                Some(TopicPattern::Wildcard(prefix)) => {
                    parsed.wildcard.insert(prefix);
                }
                None => {}
            }
        }
        parsed
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.discrete.is_empty() && self.wildcard.is_empty()
    }

    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        self.discrete.contains(topic)
            || self
                .wildcard
                .iter()
                .any(|prefix| topic.starts_with(prefix.as_str()))
    }
}

/// Check that `name` is a well-formed discrete topic name.
///
/// Non-empty, no leading or trailing `/`, no empty segment, and no `*`
/// anywhere. `*` only has meaning as the final segment of a subscription
/// pattern, which [`TopicPattern::parse`] strips before validating, so a
/// topic containing it could never be told apart from a pattern.
pub fn validate_name(name: &str) -> EngineResult<()> {
    let reason = if name.is_empty() {
        "topic is empty"
    } else if name.starts_with(TOPIC_SEPARATOR) {
        "topic starts with '/'"
    } else if name.ends_with(TOPIC_SEPARATOR) {
        "topic ends with '/'"
    } else if name.contains("//") {
        "topic contains an empty segment"
    } else if name.contains(WILDCARD) {
        "wildcard is only allowed as the final segment of a pattern"
    } else {
        return Ok(());
    };
    Err(EngineError::InvalidTopic {
        topic: name.to_owned(),
        reason: reason.to_owned(),
    })
}

/// Every wildcard prefix key that could select `topic`, longest first.
///
/// For `org/apache/ant` this yields `org/apache/`, `org/`, and finally `""`.
pub(crate) fn wildcard_candidates(topic: &str) -> impl Iterator<Item = &str> {
    topic
        .rmatch_indices(TOPIC_SEPARATOR)
        .map(move |(idx, _)| &topic[..=idx])
        .chain(std::iter::once(""))
}

/// Immutable topic name with a memoized pointer to its resolved routing data.
///
/// Cloning is cheap and clones share the cached pointer. Equality and hashing
/// use the name only, so distinct instances with the same name are
/// interchangeable for routing.
#[derive(Clone)]
pub struct Topic {
    inner: Arc<TopicInner>,
}

struct TopicInner {
    name: String,
    cached: RwLock<Option<CachedData>>,
}

struct CachedData {
    generation: u64,
    data: Arc<TopicData>,
}

impl Topic {
    /// Create a topic, validating its name.
    pub fn new(name: impl Into<String>) -> EngineResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            inner: Arc::new(TopicInner {
                name,
                cached: RwLock::new(None),
            }),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether two handles point at the same topic instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Cached routing data, if it was attached under `generation`.
    ///
    /// Data attached under an older generation is dropped on sight.
    pub(crate) fn cached(&self, generation: u64) -> Option<Arc<TopicData>> {
        {
            let cached = self.inner.cached.read();
            match cached.as_ref() {
                Some(entry) if entry.generation == generation => return Some(entry.data.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.clear_cache();
        None
    }

    pub(crate) fn attach(&self, generation: u64, data: Arc<TopicData>) {
        *self.inner.cached.write() = Some(CachedData { generation, data });
    }

    fn clear_cache(&self) {
        self.inner.cached.write().take();
    }

    /// Whether routing data is currently attached (regardless of staleness).
    #[must_use]
    pub fn has_cached_data(&self) -> bool {
        self.inner.cached.read().is_some()
    }

    pub(crate) fn downgrade(&self) -> WeakTopic {
        WeakTopic(Arc::downgrade(&self.inner))
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Topic").field(&self.inner.name).finish()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

impl PartialEq for Topic {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name
    }
}

impl Eq for Topic {}

impl Hash for Topic {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.name.hash(state);
    }
}

/// Non-owning topic handle kept by the engine's topic table.
pub(crate) struct WeakTopic(Weak<TopicInner>);

impl WeakTopic {
    pub(crate) fn upgrade(&self) -> Option<Topic> {
        self.0.upgrade().map(|inner| Topic { inner })
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.0.strong_count() == 0
    }
}
