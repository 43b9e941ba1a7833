//! # Subscription Holders
//!
//! Normalized view of one subscriber registration: its topic sets, filter,
//! ranking, reentrancy flag, and the lazily resolved handler.
//!
//! Holders order by ranking descending, then by registration ordinal
//! ascending, so the highest ranked and then the oldest subscriber is invoked
//! first.

use crate::domain::event::Event;
use crate::domain::filter::EventFilter;
use crate::domain::topic::TopicPatterns;
use crate::error::EngineResult;
use crate::ports::inbound::SubscriberRegistration;
use crate::ports::outbound::{EventHandler, HandlerResolver};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Opaque registry handle identifying one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

pub struct SubscriptionHolder {
    id: SubscriberId,
    topics: TopicPatterns,
    filter_expression: Option<String>,
    filter: Option<EventFilter>,
    ranking: i32,
    ordinal: i64,
    reentrant: bool,
    resolver: Arc<dyn HandlerResolver>,
    handler: Mutex<Option<Arc<dyn EventHandler>>>,
}

impl SubscriptionHolder {
    /// Derive a holder from registration metadata.
    ///
    /// Malformed topic patterns are dropped silently; an unparsable filter
    /// fails the whole registration.
    pub fn from_registration(
        registration: &SubscriberRegistration,
        default_reentrant: bool,
        resolver: Arc<dyn HandlerResolver>,
    ) -> EngineResult<Self> {
        let filter = registration
            .filter
            .as_deref()
            .map(EventFilter::parse)
            .transpose()?;

        Ok(Self {
            id: registration.id,
            topics: TopicPatterns::parse(&registration.topics),
            filter_expression: registration.filter.clone(),
            filter,
            ranking: registration.ranking,
            ordinal: registration.ordinal,
            reentrant: registration.reentrant.unwrap_or(default_reentrant),
            resolver,
            handler: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    #[must_use]
    pub fn discrete_topics(&self) -> &BTreeSet<String> {
        &self.topics.discrete
    }

    /// Wildcard prefix keys (trailing `*` stripped, trailing `/` kept).
    #[must_use]
    pub fn wildcard_prefixes(&self) -> &BTreeSet<String> {
        &self.topics.wildcard
    }

    #[must_use]
    pub fn filter_expression(&self) -> Option<&str> {
        self.filter_expression.as_deref()
    }

    #[must_use]
    pub fn ranking(&self) -> i32 {
        self.ranking
    }

    #[must_use]
    pub fn ordinal(&self) -> i64 {
        self.ordinal
    }

    #[must_use]
    pub fn is_reentrant(&self) -> bool {
        self.reentrant
    }

    #[cfg(test)]
    fn subscribes_to(&self, topic: &str) -> bool {
        self.topics.matches(topic)
    }

    /// Whether the holder's filter (if any) accepts `event`.
    #[must_use]
    pub fn accepts(&self, event: &Event) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |filter| event.matches_filter(filter))
    }

    /// The live handler, resolved through the registry on first use.
    ///
    /// A failed resolution returns `None` and is retried on the next call.
    pub fn handler(&self) -> Option<Arc<dyn EventHandler>> {
        let mut slot = self.handler.lock();
        if let Some(handler) = slot.as_ref() {
            return Some(handler.clone());
        }

        let resolved = catch_unwind(AssertUnwindSafe(|| self.resolver.resolve(self.id)))
            .unwrap_or_else(|_| {
                warn!(subscriber = %self.id, "Handler resolution panicked");
                None
            });
        if let Some(handler) = &resolved {
            *slot = Some(handler.clone());
        }
        resolved
    }

    /// Dispatch priority: ranking descending, then ordinal ascending.
    #[must_use]
    pub fn priority_cmp(&self, other: &Self) -> Ordering {
        other
            .ranking
            .cmp(&self.ranking)
            .then(self.ordinal.cmp(&other.ordinal))
            .then(self.id.cmp(&other.id))
    }
}

impl PartialEq for SubscriptionHolder {
    fn eq(&self, other: &Self) -> bool {
        self.priority_cmp(other) == Ordering::Equal
    }
}

impl Eq for SubscriptionHolder {}

impl PartialOrd for SubscriptionHolder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SubscriptionHolder {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority_cmp(other)
    }
}

impl fmt::Debug for SubscriptionHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHolder")
            .field("id", &self.id)
            .field("topics", &self.topics)
            .field("filter", &self.filter_expression)
            .field("ranking", &self.ranking)
            .field("ordinal", &self.ordinal)
            .field("reentrant", &self.reentrant)
            .finish()
    }
}
