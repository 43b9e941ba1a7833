//! Driven Ports (SPI - Outbound Dependencies)
//!
//! Collaborators the engine consumes. Every one of them is optional at
//! runtime except the handler resolver; a missing authorizer allows
//! everything and a missing log sink is tolerated silently.

use crate::domain::event::Event;
use crate::domain::subscription::SubscriberId;
use crate::error::EngineResult;
use parking_lot::Mutex;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Receiver of dispatched events.
///
/// Returning `Err` (or panicking) is a handler failure: it is logged with the
/// subscriber's identity and dispatch continues with the next handler.
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &Event) -> anyhow::Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    fn handle_event(&self, event: &Event) -> anyhow::Result<()> {
        self(event)
    }
}

/// Subscriber registry lookup: registration handle → live handler.
pub trait HandlerResolver: Send + Sync {
    fn resolve(&self, id: SubscriberId) -> Option<Arc<dyn EventHandler>>;
}

/// Unit of work handed to a stage executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Execution context backing one stage.
pub trait StageExecutor: Send + Sync {
    /// Accept `task` for execution. An `Err` means the task was not accepted
    /// and will never run.
    fn execute(&self, task: Task) -> EngineResult<()>;
}

/// Maps stage names to executors.
pub trait ExecutorFactory: Send + Sync {
    fn executor(&self, stage: &str) -> Option<Arc<dyn StageExecutor>>;
}

/// Publish/subscribe permission checks.
pub trait TopicAuthorizer: Send + Sync {
    /// Fails with [`crate::EngineError::Unauthorized`] when publishing to
    /// `topic` is not permitted.
    fn check_publish(&self, topic: &str) -> EngineResult<()>;

    /// Fails with [`crate::EngineError::Unauthorized`] when subscribing to
    /// the pattern `topic` is not permitted.
    fn check_subscribe(&self, topic: &str) -> EngineResult<()>;
}

/// Severity passed to the log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// External logging collaborator.
pub trait LogSink: Send + Sync {
    fn log(
        &self,
        source: Option<SubscriberId>,
        level: LogLevel,
        message: &str,
        error: Option<&(dyn Error + 'static)>,
    );
}

/// Repeating body of a periodic schedule.
pub type RepeatingTask = Arc<dyn Fn() + Send + Sync + 'static>;

/// Timer collaborator used by the scheduled event service.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: Task) -> EngineResult<ScheduledHandle>;

    /// Run `task` after `initial_delay` and then every `period`.
    fn schedule_at_fixed_rate(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: RepeatingTask,
    ) -> EngineResult<ScheduledHandle>;
}

/// Cancellation handle for a scheduled task.
#[derive(Clone)]
pub struct ScheduledHandle {
    cancelled: Arc<AtomicBool>,
    on_cancel: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl ScheduledHandle {
    /// Handle whose cancellation additionally runs `on_cancel` once.
    pub fn new(on_cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            on_cancel: Arc::new(Mutex::new(Some(Box::new(on_cancel)))),
        }
    }

    /// Stop future runs. Returns `false` if already cancelled.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(on_cancel) = self.on_cancel.lock().take() {
            on_cancel();
        }
        true
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ScheduledHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
