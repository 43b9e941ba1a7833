//! Event Engine Service - Core dispatch logic
//!
//! Routes published events to ranked subscribers, either inline on the
//! publishing thread (`send`) or on the topic's stage executor (`post`).
//!
//! ## Dispatch
//!
//! ```text
//! send/post ──→ authorize ──→ seal ──→ [stage executor] ──→ deliver
//!                                                             │
//!   for each ranked holder:  filter? ─ reentrant? ─ handler ─ catch failure
//! ```
//!
//! Handler failures (errors and panics) are logged with the subscriber's
//! identity and never abort the dispatch.

use crate::adapters::TracingLogSink;
use crate::config::EngineConfig;
use crate::domain::context::{self, CurrentEvent};
use crate::domain::dispatch::{DispatchHandle, EventDispatch};
use crate::domain::event::{Event, Properties};
use crate::domain::index::TopicIndex;
use crate::domain::locals::EventLocalStore;
use crate::domain::subscription::{SubscriberId, SubscriptionHolder};
use crate::domain::topic::{validate_name, Topic, WeakTopic};
use crate::error::{EngineError, EngineResult};
use crate::metrics;
use crate::ports::inbound::{EventApi, SubscriberRegistration, SubscriptionApi};
use crate::ports::outbound::{
    ExecutorFactory, HandlerResolver, LogLevel, LogSink, TopicAuthorizer,
};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::error::Error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handler failure raised as a panic rather than an `Err`.
#[derive(Debug, thiserror::Error)]
#[error("handler panicked: {0}")]
struct HandlerPanic(String);

impl HandlerPanic {
    fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self(message)
    }
}

/// Marks a started dispatch done however delivery exits.
struct FinishOnDrop<'a>(&'a DispatchHandle);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Owned by a posted task. A task the executor drops without running
/// cancels its dispatch so waiters are released.
struct CancelOnDrop(DispatchHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.0.cancel() {
            debug!("Posted task dropped before it ran");
        }
    }
}

struct EngineCore {
    config: EngineConfig,
    index: TopicIndex,
    topics: Mutex<HashMap<String, WeakTopic>>,
    resolver: Arc<dyn HandlerResolver>,
    authorizer: RwLock<Option<Arc<dyn TopicAuthorizer>>>,
    log_sink: RwLock<Option<Arc<dyn LogSink>>>,
}

impl EngineCore {
    fn log(
        &self,
        source: Option<SubscriberId>,
        level: LogLevel,
        message: &str,
        error: Option<&(dyn Error + 'static)>,
    ) {
        let Some(sink) = self.log_sink.read().clone() else {
            TracingLogSink.log(source, level, message, error);
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| sink.log(source, level, message, error))).is_err() {
            warn!(?source, ?level, record = message, "Log sink panicked; record dropped");
        }
    }

    fn check_publish(&self, topic: &str) -> EngineResult<()> {
        let authorizer = self.authorizer.read().clone();
        match authorizer {
            Some(authorizer) => authorizer.check_publish(topic),
            None => Ok(()),
        }
    }

    fn check_subscribe(&self, registration: &SubscriberRegistration) -> EngineResult<()> {
        let Some(authorizer) = self.authorizer.read().clone() else {
            return Ok(());
        };
        registration
            .topics
            .iter()
            .try_for_each(|topic| authorizer.check_subscribe(topic))
    }

    /// Run every matching handler for `event` on the calling thread.
    fn deliver(&self, event: &Arc<Event>, handle: &DispatchHandle) {
        if !handle.begin() {
            debug!(event_id = %event.id(), topic = event.topic_name(), "Dispatch cancelled before start");
            return;
        }
        let _finish = FinishOnDrop(handle);

        let data = self.index.topic_data(Some(event.topic()), event.topic_name());
        {
            let _scope = CurrentEvent::enter(event.clone());
            for holder in data.subscribers() {
                self.invoke(holder, event, handle);
            }
        }

        debug!(
            event_id = %event.id(),
            topic = event.topic_name(),
            delivered = handle.delivered(),
            failed = handle.failed(),
            "Dispatch finished"
        );
    }

    fn invoke(&self, holder: &SubscriptionHolder, event: &Event, handle: &DispatchHandle) {
        let id = holder.id();
        match catch_unwind(AssertUnwindSafe(|| holder.accepts(event))) {
            Ok(true) => {}
            Ok(false) => return,
            Err(payload) => {
                handle.record_failure();
                let panic = HandlerPanic::from_payload(payload.as_ref());
                self.log(
                    Some(id),
                    LogLevel::Error,
                    &format!("filter evaluation panicked on topic {}", event.topic_name()),
                    Some(&panic),
                );
                return;
            }
        }
        if !holder.is_reentrant() && context::is_subscriber_active(id) {
            debug!(subscriber = %id, topic = event.topic_name(), "Skipping re-entrant delivery");
            return;
        }
        let Some(handler) = holder.handler() else {
            self.log(
                Some(id),
                LogLevel::Warning,
                &format!("handler unavailable for topic {}", event.topic_name()),
                None,
            );
            return;
        };

        let _active = context::enter_subscriber(id);
        match catch_unwind(AssertUnwindSafe(|| handler.handle_event(event))) {
            Ok(Ok(())) => handle.record_delivery(),
            Ok(Err(e)) => {
                handle.record_failure();
                metrics::record_handler_failure();
                let cause: &(dyn Error + 'static) = e.as_ref();
                self.log(
                    Some(id),
                    LogLevel::Warning,
                    &format!("handler failed on topic {}", event.topic_name()),
                    Some(cause),
                );
            }
            Err(payload) => {
                handle.record_failure();
                metrics::record_handler_failure();
                let panic = HandlerPanic::from_payload(payload.as_ref());
                self.log(
                    Some(id),
                    LogLevel::Error,
                    &format!("handler panicked on topic {}", event.topic_name()),
                    Some(&panic),
                );
            }
        }
    }
}

/// The event engine.
///
/// Cheap to clone; clones share one engine.
#[derive(Clone)]
pub struct EventEngine {
    core: Arc<EngineCore>,
}

impl EventEngine {
    /// Build an engine resolving handlers through `resolver`.
    ///
    /// The configured stage mappings are applied to the index.
    pub fn new(config: EngineConfig, resolver: Arc<dyn HandlerResolver>) -> EngineResult<Self> {
        config.validate()?;
        let index = TopicIndex::new(config.default_stage.clone())
            .with_cache_capacity(config.topic_cache_capacity);
        for (stage, topics) in &config.stage_topics {
            index.set_stage_topics(stage, topics);
        }
        info!(
            default_stage = %config.default_stage,
            stages = config.stage_topics.len(),
            reentrant_default = config.reentrant_default,
            "Event engine created"
        );
        Ok(Self {
            core: Arc::new(EngineCore {
                config,
                index,
                topics: Mutex::new(HashMap::new()),
                resolver,
                authorizer: RwLock::new(None),
                log_sink: RwLock::new(None),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    /// Routing index, for inspection.
    #[must_use]
    pub fn index(&self) -> &TopicIndex {
        &self.core.index
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    /// Install (or with `None`, remove) the authorization hook.
    pub fn set_authorizer(&self, authorizer: Option<Arc<dyn TopicAuthorizer>>) {
        *self.core.authorizer.write() = authorizer;
    }

    /// Install (or remove) the executor factory. Cached routing is dropped.
    pub fn set_executor_factory(&self, factory: Option<Arc<dyn ExecutorFactory>>) {
        self.core.index.set_executor_factory(factory);
    }

    /// Install (or remove) the log sink. Without one, records go to `tracing`.
    pub fn set_log_sink(&self, sink: Option<Arc<dyn LogSink>>) {
        *self.core.log_sink.write() = sink;
    }

    /// Re-resolve subscribers, stages and executors for every topic.
    pub fn refresh_routing(&self) {
        self.core.index.invalidate();
    }

    pub fn log(
        &self,
        source: Option<SubscriberId>,
        level: LogLevel,
        message: &str,
        error: Option<&(dyn Error + 'static)>,
    ) {
        self.core.log(source, level, message, error);
    }

    // =========================================================================
    // Topics and events
    // =========================================================================

    /// Shared topic handle for `name`.
    ///
    /// While any handle for a name is alive, every call returns a clone of
    /// it, so routing data memoized on one is seen by all.
    pub fn get_topic(&self, name: &str) -> EngineResult<Topic> {
        validate_name(name)?;
        let mut topics = self.core.topics.lock();
        if let Some(topic) = topics.get(name).and_then(WeakTopic::upgrade) {
            return Ok(topic);
        }
        topics.retain(|_, topic| !topic.is_dead());
        let topic = Topic::new(name)?;
        topics.insert(name.to_owned(), topic.downgrade());
        Ok(topic)
    }

    /// Unsealed event for `topic`.
    ///
    /// Created while another event is being processed on this thread, its
    /// locals inherit from that event's locals.
    pub fn create_event(&self, topic: &str) -> EngineResult<Event> {
        let topic = self.get_topic(topic)?;
        Ok(self.create_event_for(&topic))
    }

    #[must_use]
    pub fn create_event_for(&self, topic: &Topic) -> Event {
        let locals = match CurrentEvent::current() {
            Some(current) => EventLocalStore::child(current.locals()),
            None => EventLocalStore::with_policy(self.core.config.duplicate_locals),
        };
        Event::with_locals(topic.clone(), Arc::new(locals))
    }

    /// Publish synchronously with `properties`.
    pub fn send_event(&self, topic: &str, properties: Properties) -> EngineResult<EventDispatch> {
        let event = self.create_event(topic)?;
        event.set_properties(properties)?;
        self.send(event)
    }

    /// Publish asynchronously with `properties`.
    pub fn post_event(&self, topic: &str, properties: Properties) -> EngineResult<EventDispatch> {
        let event = self.create_event(topic)?;
        event.set_properties(properties)?;
        self.post(event)
    }

    /// Seal `event` and deliver it on the calling thread. Returns once every
    /// matching handler has run.
    pub fn send(&self, event: Event) -> EngineResult<EventDispatch> {
        self.core.check_publish(event.topic_name())?;
        event.seal();
        let event = Arc::new(event);
        let handle = DispatchHandle::new();
        debug!(event_id = %event.id(), topic = event.topic_name(), "Sending event");

        self.core.deliver(&event, &handle);
        metrics::record_event_sent();
        Ok(EventDispatch::new(event, handle))
    }

    /// Seal `event` and hand it to its stage's executor.
    ///
    /// Fails with [`EngineError::NoExecutor`] when the stage has no executor
    /// and [`EngineError::ExecutorRejected`] when the executor refuses the
    /// task; in both cases no handler runs.
    pub fn post(&self, event: Event) -> EngineResult<EventDispatch> {
        self.core.check_publish(event.topic_name())?;
        let data = self
            .core
            .index
            .topic_data(Some(event.topic()), event.topic_name());
        let executor = data
            .executor()
            .cloned()
            .ok_or_else(|| EngineError::NoExecutor {
                stage: data.stage().to_owned(),
            })?;

        event.seal();
        let event = Arc::new(event);
        let handle = DispatchHandle::new();
        debug!(event_id = %event.id(), topic = event.topic_name(), stage = data.stage(), "Posting event");

        let task = {
            let core = self.core.clone();
            let event = event.clone();
            let guard = CancelOnDrop(handle.clone());
            Box::new(move || core.deliver(&event, &guard.0))
        };
        if let Err(e) = executor.execute(task) {
            handle.cancel();
            return Err(match e {
                EngineError::ExecutorRejected { .. } => e,
                other => EngineError::ExecutorRejected {
                    stage: data.stage().to_owned(),
                    reason: other.to_string(),
                },
            });
        }
        metrics::record_event_posted(data.stage());
        Ok(EventDispatch::new(event, handle))
    }

    // =========================================================================
    // Subscribers and stages
    // =========================================================================

    /// Index a new subscriber.
    ///
    /// Every declared topic pattern must pass the subscribe check and the
    /// filter must parse; otherwise nothing is indexed.
    pub fn register_subscriber(&self, registration: SubscriberRegistration) -> EngineResult<()> {
        let holder = self.build_holder(&registration)?;
        self.core.index.add_subscriber(Arc::new(holder));
        info!(
            subscriber = %registration.id,
            topics = ?registration.topics,
            ranking = registration.ranking,
            "Subscriber registered"
        );
        Ok(())
    }

    /// Re-derive a subscriber from new metadata. On failure the previous
    /// registration stays in force.
    pub fn modify_subscriber(&self, registration: SubscriberRegistration) -> EngineResult<()> {
        let holder = self.build_holder(&registration)?;
        self.core.index.add_subscriber(Arc::new(holder));
        info!(subscriber = %registration.id, topics = ?registration.topics, "Subscriber modified");
        Ok(())
    }

    /// Returns `false` if `id` was not registered.
    pub fn unregister_subscriber(&self, id: SubscriberId) -> bool {
        let removed = self.core.index.remove_subscriber(id).is_some();
        if removed {
            info!(subscriber = %id, "Subscriber unregistered");
        }
        removed
    }

    fn build_holder(&self, registration: &SubscriberRegistration) -> EngineResult<SubscriptionHolder> {
        let result = self.core.check_subscribe(registration).and_then(|()| {
            SubscriptionHolder::from_registration(
                registration,
                self.core.config.reentrant_default,
                self.core.resolver.clone(),
            )
        });
        if let Err(e) = &result {
            self.core.log(
                Some(registration.id),
                LogLevel::Error,
                "subscriber registration rejected",
                Some(e),
            );
        }
        result
    }

    /// Route topics matching `patterns` to `stage`.
    pub fn set_stage_topics<I, S>(&self, stage: &str, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.core.index.set_stage_topics(stage, patterns);
    }

    pub fn remove_stage(&self, stage: &str) -> bool {
        self.core.index.remove_stage(stage)
    }
}

impl EventApi for EventEngine {
    fn create_event(&self, topic: &str) -> EngineResult<Event> {
        EventEngine::create_event(self, topic)
    }

    fn get_topic(&self, name: &str) -> EngineResult<Topic> {
        EventEngine::get_topic(self, name)
    }

    fn send_event(&self, topic: &str, properties: Properties) -> EngineResult<EventDispatch> {
        EventEngine::send_event(self, topic, properties)
    }

    fn post_event(&self, topic: &str, properties: Properties) -> EngineResult<EventDispatch> {
        EventEngine::post_event(self, topic, properties)
    }
}

impl SubscriptionApi for EventEngine {
    fn subscriber_added(&self, registration: SubscriberRegistration) -> EngineResult<()> {
        self.register_subscriber(registration)
    }

    fn subscriber_modified(&self, registration: SubscriberRegistration) -> EngineResult<()> {
        self.modify_subscriber(registration)
    }

    fn subscriber_removed(&self, id: SubscriberId) -> bool {
        self.unregister_subscriber(id)
    }
}
