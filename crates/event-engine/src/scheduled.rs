//! Scheduled Event Service
//!
//! Posts events after a delay or at a fixed rate through a `Scheduler`
//! collaborator. The engine is looked up when the timer fires, so a task
//! scheduled before an unbind posts nothing.

use crate::domain::event::Properties;
use crate::domain::topic::validate_name;
use crate::error::{EngineError, EngineResult};
use crate::ports::inbound::EventApi;
use crate::ports::outbound::{ScheduledHandle, Scheduler};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type EngineBinding = Arc<RwLock<Option<Arc<dyn EventApi>>>>;

pub struct ScheduledEventService {
    scheduler: Arc<dyn Scheduler>,
    engine: EngineBinding,
}

impl ScheduledEventService {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            engine: Arc::new(RwLock::new(None)),
        }
    }

    /// Bind the engine scheduled events are posted to, replacing any other.
    pub fn bind(&self, engine: Arc<dyn EventApi>) {
        *self.engine.write() = Some(engine);
    }

    /// Returns `false` if no engine was bound.
    pub fn unbind(&self) -> bool {
        self.engine.write().take().is_some()
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.engine.read().is_some()
    }

    /// Post an event to `topic` once, after `delay`.
    pub fn schedule(
        &self,
        topic: &str,
        properties: Properties,
        delay: Duration,
    ) -> EngineResult<ScheduledHandle> {
        self.check(topic)?;
        let engine = self.engine.clone();
        let topic = topic.to_owned();
        debug!(topic = %topic, delay_ms = delay.as_millis() as u64, "Scheduling event");
        self.scheduler
            .schedule(delay, Box::new(move || fire(&engine, &topic, properties)))
    }

    /// Post an event to `topic` after `initial_delay` and then every `period`.
    pub fn schedule_at_fixed_rate(
        &self,
        topic: &str,
        properties: Properties,
        initial_delay: Duration,
        period: Duration,
    ) -> EngineResult<ScheduledHandle> {
        self.check(topic)?;
        if period.is_zero() {
            return Err(EngineError::InvalidArgument {
                reason: "period must be greater than zero".into(),
            });
        }
        let engine = self.engine.clone();
        let topic = topic.to_owned();
        debug!(
            topic = %topic,
            initial_delay_ms = initial_delay.as_millis() as u64,
            period_ms = period.as_millis() as u64,
            "Scheduling repeating event"
        );
        self.scheduler.schedule_at_fixed_rate(
            initial_delay,
            period,
            Arc::new(move || fire(&engine, &topic, properties.clone())),
        )
    }

    fn check(&self, topic: &str) -> EngineResult<()> {
        if topic.is_empty() {
            return Err(EngineError::InvalidArgument {
                reason: "topic is required".into(),
            });
        }
        validate_name(topic)?;
        if !self.is_bound() {
            return Err(EngineError::IllegalState {
                reason: "no event engine bound".into(),
            });
        }
        Ok(())
    }
}

fn fire(engine: &EngineBinding, topic: &str, properties: Properties) {
    let Some(engine) = engine.read().clone() else {
        warn!(topic, "Scheduled event dropped, no event engine bound");
        return;
    };
    if let Err(e) = engine.post_event(topic, properties) {
        warn!(topic, error = %e, "Scheduled event could not be posted");
    }
}
