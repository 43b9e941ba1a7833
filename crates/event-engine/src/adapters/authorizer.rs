//! Topic Access Control Adapter
//!
//! Implements `TopicAuthorizer` with per-action topic pattern grants.
//! Nothing is permitted unless granted.

use crate::domain::topic::{TopicPattern, TopicPatterns};
use crate::error::{EngineError, EngineResult, TopicAction};
use crate::ports::outbound::TopicAuthorizer;
use parking_lot::RwLock;
use tracing::{debug, warn};

/// Publish and subscribe grants, each a set of topic patterns.
///
/// Publishing to `t` requires a grant matching `t`. Subscribing to a pattern
/// requires a grant covering every topic the pattern can select: `a/b/*` is
/// covered by `a/*`, but `a/*` is not covered by `a/b/*`.
#[derive(Debug, Default)]
pub struct TopicAcl {
    publish: RwLock<TopicPatterns>,
    subscribe: RwLock<TopicPatterns>,
}

impl TopicAcl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant both actions on every topic.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::new().with_publish("*").with_subscribe("*")
    }

    #[must_use]
    pub fn with_publish(self, pattern: &str) -> Self {
        self.grant(TopicAction::Publish, pattern);
        self
    }

    #[must_use]
    pub fn with_subscribe(self, pattern: &str) -> Self {
        self.grant(TopicAction::Subscribe, pattern);
        self
    }

    /// Add a grant. Malformed patterns grant nothing.
    pub fn grant(&self, action: TopicAction, pattern: &str) {
        let Some(parsed) = TopicPattern::parse(pattern) else {
            warn!(%action, pattern, "Ignoring malformed topic grant");
            return;
        };
        let mut grants = self.grants(action).write();
        match parsed {
            TopicPattern::Discrete(name) => grants.discrete.insert(name),
            TopicPattern::Wildcard(prefix) => grants.wildcard.insert(prefix),
        };
        debug!(%action, pattern, "Topic grant added");
    }

    /// Drop every grant for `action`.
    pub fn revoke_all(&self, action: TopicAction) {
        *self.grants(action).write() = TopicPatterns::default();
    }

    fn grants(&self, action: TopicAction) -> &RwLock<TopicPatterns> {
        match action {
            TopicAction::Publish => &self.publish,
            TopicAction::Subscribe => &self.subscribe,
        }
    }

    fn denied(action: TopicAction, topic: &str) -> EngineError {
        EngineError::Unauthorized {
            action,
            topic: topic.to_owned(),
        }
    }
}

impl TopicAuthorizer for TopicAcl {
    fn check_publish(&self, topic: &str) -> EngineResult<()> {
        if self.publish.read().matches(topic) {
            Ok(())
        } else {
            Err(Self::denied(TopicAction::Publish, topic))
        }
    }

    fn check_subscribe(&self, topic: &str) -> EngineResult<()> {
        let grants = self.subscribe.read();
        let covered = match TopicPattern::parse(topic) {
            // Dropped at registration, so it selects nothing.
            None => true,
            Some(TopicPattern::Discrete(name)) => grants.matches(&name),
            Some(TopicPattern::Wildcard(prefix)) => grants
                .wildcard
                .iter()
                .any(|granted| prefix.starts_with(granted.as_str())),
        };
        if covered {
            Ok(())
        } else {
            Err(Self::denied(TopicAction::Subscribe, topic))
        }
    }
}
