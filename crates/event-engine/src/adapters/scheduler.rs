//! Tokio Scheduler Adapter
//!
//! Implements `Scheduler` with `tokio::time` on a runtime handle.
//! Cancelling a handle aborts the timer task.

use crate::error::{EngineError, EngineResult};
use crate::ports::outbound::{RepeatingTask, ScheduledHandle, Scheduler, Task};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{self, Instant};

pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler on the runtime the caller is running in.
    pub fn current() -> EngineResult<Self> {
        let handle = Handle::try_current().map_err(|e| EngineError::IllegalState {
            reason: format!("no tokio runtime available: {e}"),
        })?;
        Ok(Self::new(handle))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> EngineResult<ScheduledHandle> {
        let join = self.handle.spawn(async move {
            time::sleep(delay).await;
            task();
        });
        Ok(ScheduledHandle::new(move || join.abort()))
    }

    fn schedule_at_fixed_rate(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: RepeatingTask,
    ) -> EngineResult<ScheduledHandle> {
        if period.is_zero() {
            return Err(EngineError::InvalidArgument {
                reason: "period must be greater than zero".into(),
            });
        }
        let join = self.handle.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + initial_delay, period);
            loop {
                ticker.tick().await;
                task();
            }
        });
        Ok(ScheduledHandle::new(move || join.abort()))
    }
}
