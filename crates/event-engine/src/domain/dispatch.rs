//! # Dispatch Completion
//!
//! Future-like handle for one event dispatch, kept separate from the event
//! payload. It moves through
//!
//! ```text
//! Pending ──begin──→ Running ──finish──→ Done
//!    │
//!    └──cancel──→ Cancelled
//! ```
//!
//! Cancelling after dispatch has begun is a no-op.

use crate::domain::event::Event;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;
const CANCELLED: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Pending,
    Running,
    Done,
    Cancelled,
}

struct DispatchState {
    status: AtomicU8,
    delivered: AtomicUsize,
    failed: AtomicUsize,
    lock: Mutex<()>,
    finished: Condvar,
    notify: Notify,
}

/// Completion and cancellation signal of one dispatch.
#[derive(Clone)]
pub struct DispatchHandle {
    state: Arc<DispatchState>,
}

impl DispatchHandle {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(DispatchState {
                status: AtomicU8::new(PENDING),
                delivered: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
                lock: Mutex::new(()),
                finished: Condvar::new(),
                notify: Notify::new(),
            }),
        }
    }

    #[must_use]
    pub fn status(&self) -> DispatchStatus {
        match self.state.status.load(Ordering::Acquire) {
            PENDING => DispatchStatus::Pending,
            RUNNING => DispatchStatus::Running,
            DONE => DispatchStatus::Done,
            _ => DispatchStatus::Cancelled,
        }
    }

    /// Finished, either by running to completion or by cancellation.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self.status(), DispatchStatus::Done | DispatchStatus::Cancelled)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status() == DispatchStatus::Cancelled
    }

    /// Prevent dispatch if it has not started. Returns whether this call
    /// cancelled it.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .state
            .status
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if cancelled {
            self.wake();
        }
        cancelled
    }

    /// Handlers that returned normally.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.state.delivered.load(Ordering::Acquire)
    }

    /// Handlers that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.state.failed.load(Ordering::Acquire)
    }

    /// Block until done.
    pub fn wait(&self) {
        let mut guard = self.state.lock.lock();
        while !self.is_done() {
            self.state.finished.wait(&mut guard);
        }
    }

    /// Block until done or `timeout` elapses. Returns whether it is done.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.state.lock.lock();
        if self.is_done() {
            return true;
        }
        let _ = self
            .state
            .finished
            .wait_while_for(&mut guard, |_| !self.is_done(), timeout);
        self.is_done()
    }

    /// Resolve once done.
    pub async fn completed(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }

    /// Move from pending to running. `false` if cancelled first.
    pub(crate) fn begin(&self) -> bool {
        self.state
            .status
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn record_delivery(&self) {
        self.state.delivered.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_failure(&self) {
        self.state.failed.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn finish(&self) {
        self.state.status.store(DONE, Ordering::Release);
        self.wake();
    }

    fn wake(&self) {
        {
            let _guard = self.state.lock.lock();
            self.state.finished.notify_all();
        }
        self.state.notify.notify_waiters();
    }
}

impl fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchHandle")
            .field("status", &self.status())
            .field("delivered", &self.delivered())
            .field("failed", &self.failed())
            .finish()
    }
}

/// A published event together with its dispatch handle.
#[derive(Debug, Clone)]
pub struct EventDispatch {
    event: Arc<Event>,
    handle: DispatchHandle,
}

impl EventDispatch {
    pub(crate) fn new(event: Arc<Event>, handle: DispatchHandle) -> Self {
        Self { event, handle }
    }

    #[must_use]
    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }

    #[must_use]
    pub fn handle(&self) -> &DispatchHandle {
        &self.handle
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.handle.is_done()
    }

    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    pub fn wait(&self) {
        self.handle.wait();
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.handle.wait_timeout(timeout)
    }

    pub async fn completed(&self) {
        self.handle.completed().await;
    }
}
