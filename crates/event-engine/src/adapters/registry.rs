//! Subscriber Registry Adapter
//!
//! In-process subscriber registry: owns the live handlers, assigns
//! registration ids and ordinals, and notifies the engine of every change.

use crate::domain::subscription::SubscriberId;
use crate::error::{EngineError, EngineResult};
use crate::ports::inbound::{SubscriberRegistration, SubscriptionApi};
use crate::ports::outbound::{EventHandler, HandlerResolver};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Registration handle → live handler.
#[derive(Default)]
pub struct HandlerTable {
    handlers: RwLock<HashMap<SubscriberId, Arc<dyn EventHandler>>>,
}

impl HandlerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: SubscriberId, handler: Arc<dyn EventHandler>) {
        self.handlers.write().insert(id, handler);
    }

    pub fn remove(&self, id: SubscriberId) -> Option<Arc<dyn EventHandler>> {
        self.handlers.write().remove(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl HandlerResolver for HandlerTable {
    fn resolve(&self, id: SubscriberId) -> Option<Arc<dyn EventHandler>> {
        self.handlers.read().get(&id).cloned()
    }
}

/// Registry that keeps an engine's subscriber set in step with its own.
///
/// ```ignore
/// let handlers = Arc::new(HandlerTable::new());
/// let engine = Arc::new(EventEngine::new(EngineConfig::default(), handlers.clone())?);
/// let registry = InMemorySubscriberRegistry::new(handlers, engine.clone());
/// let id = registry.register(|r| r.with_topics(["org/*"]).with_ranking(5), handler)?;
/// ```
pub struct InMemorySubscriberRegistry {
    handlers: Arc<HandlerTable>,
    listener: Arc<dyn SubscriptionApi>,
    registrations: RwLock<HashMap<SubscriberId, SubscriberRegistration>>,
    next_id: AtomicU64,
    next_ordinal: AtomicI64,
}

impl InMemorySubscriberRegistry {
    pub fn new(handlers: Arc<HandlerTable>, listener: Arc<dyn SubscriptionApi>) -> Self {
        Self {
            handlers,
            listener,
            registrations: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            next_ordinal: AtomicI64::new(0),
        }
    }

    /// Register `handler` for `topics` with default ranking and no filter.
    pub fn subscribe<I, S>(&self, topics: I, handler: Arc<dyn EventHandler>) -> EngineResult<SubscriberId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.register(|registration| registration.with_topics(topics), handler)
    }

    /// Register `handler` with metadata built by `configure`.
    ///
    /// The registry assigns the id and ordinal; values set by `configure`
    /// for either are overwritten. If the engine refuses the registration
    /// the handler is discarded and the error returned.
    pub fn register<F>(&self, configure: F, handler: Arc<dyn EventHandler>) -> EngineResult<SubscriberId>
    where
        F: FnOnce(SubscriberRegistration) -> SubscriberRegistration,
    {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let ordinal = self.next_ordinal.fetch_add(1, Ordering::SeqCst);
        let mut registration = configure(SubscriberRegistration::new(id, ordinal));
        registration.id = id;
        registration.ordinal = ordinal;

        self.handlers.insert(id, handler);
        if let Err(e) = self.listener.subscriber_added(registration.clone()) {
            self.handlers.remove(id);
            return Err(e);
        }
        debug!(subscriber = %id, ordinal, "Subscriber registered");
        self.registrations.write().insert(id, registration);
        Ok(id)
    }

    /// Change a registration's metadata. On failure the previous metadata
    /// stays in force.
    pub fn modify<F>(&self, id: SubscriberId, configure: F) -> EngineResult<()>
    where
        F: FnOnce(SubscriberRegistration) -> SubscriberRegistration,
    {
        let current = self
            .registration(id)
            .ok_or_else(|| EngineError::InvalidArgument {
                reason: format!("{id} is not registered"),
            })?;
        let mut updated = configure(current.clone());
        updated.id = current.id;
        updated.ordinal = current.ordinal;

        self.listener.subscriber_modified(updated.clone())?;
        self.registrations.write().insert(id, updated);
        Ok(())
    }

    /// Remove a registration. Returns `false` if `id` is unknown.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        if self.registrations.write().remove(&id).is_none() {
            return false;
        }
        self.listener.subscriber_removed(id);
        self.handlers.remove(id);
        info!(subscriber = %id, "Subscriber unregistered");
        true
    }

    #[must_use]
    pub fn registration(&self, id: SubscriberId) -> Option<SubscriberRegistration> {
        self.registrations.read().get(&id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    #[must_use]
    pub fn handlers(&self) -> &Arc<HandlerTable> {
        &self.handlers
    }
}
