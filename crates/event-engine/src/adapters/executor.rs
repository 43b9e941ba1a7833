//! Stage Executor Adapters
//!
//! Implements `StageExecutor` on a tokio runtime and inline on the caller,
//! and `ExecutorFactory` over a stage name → executor map.

use crate::error::{EngineError, EngineResult};
use crate::ports::outbound::{ExecutorFactory, StageExecutor, Task};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

/// Runs every task immediately on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl StageExecutor for InlineExecutor {
    fn execute(&self, task: Task) -> EngineResult<()> {
        task();
        Ok(())
    }
}

/// Runs tasks on a tokio runtime's blocking pool.
///
/// Handlers are synchronous and may block, so they never run on the async
/// worker threads.
pub struct TokioStageExecutor {
    stage: String,
    handle: Handle,
    shut_down: AtomicBool,
}

impl TokioStageExecutor {
    pub fn new(stage: impl Into<String>, handle: Handle) -> Self {
        Self {
            stage: stage.into(),
            handle,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Executor on the runtime the caller is running in.
    pub fn current(stage: impl Into<String>) -> EngineResult<Self> {
        let handle = Handle::try_current().map_err(|e| EngineError::IllegalState {
            reason: format!("no tokio runtime available: {e}"),
        })?;
        Ok(Self::new(stage, handle))
    }

    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Reject every task submitted from now on. Tasks already accepted still run.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        debug!(stage = %self.stage, "Stage executor shut down");
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl StageExecutor for TokioStageExecutor {
    fn execute(&self, task: Task) -> EngineResult<()> {
        if self.is_shut_down() {
            return Err(EngineError::ExecutorRejected {
                stage: self.stage.clone(),
                reason: "executor is shut down".into(),
            });
        }
        // Completion is observed through the dispatch handle, not the join handle.
        drop(self.handle.spawn_blocking(task));
        Ok(())
    }
}

/// `ExecutorFactory` backed by a stage name → executor map.
///
/// Routing data captures the executor when a topic is first resolved; call
/// `EventEngine::refresh_routing` after changing the map of a live engine.
#[derive(Default)]
pub struct StageExecutors {
    executors: RwLock<HashMap<String, Arc<dyn StageExecutor>>>,
}

impl StageExecutors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(self, stage: impl Into<String>, executor: Arc<dyn StageExecutor>) -> Self {
        self.insert(stage, executor);
        self
    }

    /// Bind `executor` to `stage`, returning the executor it replaced.
    pub fn insert(
        &self,
        stage: impl Into<String>,
        executor: Arc<dyn StageExecutor>,
    ) -> Option<Arc<dyn StageExecutor>> {
        self.executors.write().insert(stage.into(), executor)
    }

    pub fn remove(&self, stage: &str) -> Option<Arc<dyn StageExecutor>> {
        self.executors.write().remove(stage)
    }

    /// Bound stage names, sorted.
    #[must_use]
    pub fn stages(&self) -> Vec<String> {
        let mut stages: Vec<String> = self.executors.read().keys().cloned().collect();
        stages.sort();
        stages
    }
}

impl ExecutorFactory for StageExecutors {
    fn executor(&self, stage: &str) -> Option<Arc<dyn StageExecutor>> {
        self.executors.read().get(stage).cloned()
    }
}
