//! Driving Ports (API - Inbound)
//!
//! What publishers and the subscriber registry call on the engine.

use crate::domain::dispatch::EventDispatch;
use crate::domain::event::{Event, Properties};
use crate::domain::subscription::SubscriberId;
use crate::domain::topic::Topic;
use crate::error::EngineResult;

/// Registration metadata supplied by the subscriber registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriberRegistration {
    /// Opaque registry handle
    pub id: SubscriberId,
    /// Raw topic patterns (`a/b`, `a/*`, `*`)
    pub topics: Vec<String>,
    /// Optional filter expression over event properties
    pub filter: Option<String>,
    /// Higher ranking is invoked first
    pub ranking: i32,
    /// Registration ordinal, tie-break for equal ranking (older first)
    pub ordinal: i64,
    /// Explicit reentrancy; `None` uses the engine default
    pub reentrant: Option<bool>,
}

impl SubscriberRegistration {
    pub fn new(id: SubscriberId, ordinal: i64) -> Self {
        Self {
            id,
            topics: Vec::new(),
            filter: None,
            ranking: 0,
            ordinal,
            reentrant: None,
        }
    }

    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_ranking(mut self, ranking: i32) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn with_reentrant(mut self, reentrant: bool) -> Self {
        self.reentrant = Some(reentrant);
        self
    }
}

/// Publisher-facing API.
pub trait EventApi: Send + Sync {
    /// Unsealed event for `topic`.
    fn create_event(&self, topic: &str) -> EngineResult<Event>;

    /// Shared topic handle for `name`.
    fn get_topic(&self, name: &str) -> EngineResult<Topic>;

    /// Deliver synchronously; returns after every matched handler ran.
    fn send_event(&self, topic: &str, properties: Properties) -> EngineResult<EventDispatch>;

    /// Submit to the topic's stage executor and return immediately.
    fn post_event(&self, topic: &str, properties: Properties) -> EngineResult<EventDispatch>;
}

/// Registry-facing API: subscriber lifecycle notifications.
pub trait SubscriptionApi: Send + Sync {
    fn subscriber_added(&self, registration: SubscriberRegistration) -> EngineResult<()>;

    /// Re-derives topics and filter from the new metadata.
    fn subscriber_modified(&self, registration: SubscriberRegistration) -> EngineResult<()>;

    /// Returns `false` if the subscriber was not registered.
    fn subscriber_removed(&self, id: SubscriberId) -> bool;
}
