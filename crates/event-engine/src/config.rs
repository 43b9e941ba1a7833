//! Engine configuration.
//!
//! Built in code, deserialized with serde, or read from `EVENT_ENGINE_*`
//! environment variables.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;

/// Stage used for topics no stage mapping claims.
pub const DEFAULT_STAGE: &str = "Default";

/// Topic names whose routing is memoized before the cache is dropped.
pub const DEFAULT_TOPIC_CACHE_CAPACITY: usize = 4096;

/// What [`crate::Local::declare`] does when the name is already declared on
/// the same event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateLocalPolicy {
    /// Hand out another handle to the same value.
    #[default]
    Allow,
    /// Fail with [`EngineError::DuplicateLocal`].
    Reject,
}

impl DuplicateLocalPolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "allow" => Some(Self::Allow),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Stage for topics without a mapping
    pub default_stage: String,
    /// Reentrancy of subscribers that do not declare it
    pub reentrant_default: bool,
    /// Handling of duplicate named locals
    pub duplicate_locals: DuplicateLocalPolicy,
    /// Stage name → topic patterns routed to it
    pub stage_topics: BTreeMap<String, Vec<String>>,
    /// Distinct topic names memoized by the routing cache
    pub topic_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_stage: DEFAULT_STAGE.to_string(),
            reentrant_default: false,
            duplicate_locals: DuplicateLocalPolicy::Allow,
            stage_topics: BTreeMap::new(),
            topic_cache_capacity: DEFAULT_TOPIC_CACHE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `EVENT_ENGINE_DEFAULT_STAGE`: Default stage (default: Default)
    /// - `EVENT_ENGINE_REENTRANT_DEFAULT`: Subscriber reentrancy (default: false)
    /// - `EVENT_ENGINE_DUPLICATE_LOCALS`: `allow` or `reject` (default: allow)
    /// - `EVENT_ENGINE_STAGE_TOPICS`: `stage=a/*,b;other=*` (default: none)
    /// - `EVENT_ENGINE_TOPIC_CACHE_CAPACITY`: Memoized topic names (default: 4096)
    ///
    /// Unparsable values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            default_stage: lookup("EVENT_ENGINE_DEFAULT_STAGE")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.default_stage),

            reentrant_default: lookup("EVENT_ENGINE_REENTRANT_DEFAULT")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.reentrant_default),

            duplicate_locals: lookup("EVENT_ENGINE_DUPLICATE_LOCALS")
                .and_then(|v| DuplicateLocalPolicy::parse(&v))
                .unwrap_or(defaults.duplicate_locals),

            stage_topics: lookup("EVENT_ENGINE_STAGE_TOPICS")
                .map(|v| parse_stage_topics(&v))
                .unwrap_or(defaults.stage_topics),

            topic_cache_capacity: lookup("EVENT_ENGINE_TOPIC_CACHE_CAPACITY")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.topic_cache_capacity),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> EngineResult<()> {
        if self.default_stage.trim().is_empty() {
            return Err(EngineError::InvalidArgument {
                reason: "default_stage cannot be empty".into(),
            });
        }
        if let Some(stage) = self.stage_topics.keys().find(|s| s.trim().is_empty()) {
            return Err(EngineError::InvalidArgument {
                reason: format!("stage name {stage:?} cannot be empty"),
            });
        }
        if self.topic_cache_capacity == 0 {
            return Err(EngineError::InvalidArgument {
                reason: "topic_cache_capacity must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn with_stage<I, S>(mut self, stage: &str, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stage_topics
            .insert(stage.to_owned(), topics.into_iter().map(Into::into).collect());
        self
    }
}

/// Parse `stage=a/*,b;other=*`. Entries without `=` are skipped and a stage
/// named twice keeps its last entry.
fn parse_stage_topics(raw: &str) -> BTreeMap<String, Vec<String>> {
    raw.split(';')
        .filter_map(|entry| {
            let (stage, topics) = entry.split_once('=')?;
            let stage = stage.trim();
            if stage.is_empty() {
                return None;
            }
            let topics = topics
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_owned)
                .collect();
            Some((stage.to_owned(), topics))
        })
        .collect()
}
