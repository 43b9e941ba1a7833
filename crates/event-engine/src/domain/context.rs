//! # Current Event Context
//!
//! Per-thread stack of the events being processed, plus the set of
//! subscribers currently executing on this thread (the reentrancy guard).
//!
//! Both are entered through RAII scopes so the stack is popped on every exit
//! path, including a handler panic unwinding through dispatch.

use crate::domain::event::Event;
use crate::domain::subscription::SubscriberId;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

thread_local! {
    static EVENT_STACK: RefCell<Vec<Arc<Event>>> = const { RefCell::new(Vec::new()) };
    static ACTIVE_SUBSCRIBERS: RefCell<Vec<SubscriberId>> = const { RefCell::new(Vec::new()) };
}

/// Access to the event currently being processed on the calling thread.
pub struct CurrentEvent;

impl CurrentEvent {
    /// Push `event` as the current event until the returned scope drops.
    #[must_use = "the event is popped as soon as the scope is dropped"]
    pub fn enter(event: Arc<Event>) -> EventScope {
        EVENT_STACK.with(|stack| stack.borrow_mut().push(event));
        EventScope {
            _not_send: PhantomData,
        }
    }

    /// The innermost event on this thread's stack.
    #[must_use]
    pub fn current() -> Option<Arc<Event>> {
        EVENT_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Number of nested events on this thread.
    #[must_use]
    pub fn depth() -> usize {
        EVENT_STACK.with(|stack| stack.borrow().len())
    }
}

/// Guard returned by [`CurrentEvent::enter`]. Not `Send`: it must be dropped
/// on the thread that entered it.
pub struct EventScope {
    _not_send: PhantomData<*const ()>,
}

impl Drop for EventScope {
    fn drop(&mut self) {
        EVENT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Whether a handler of `id` is already running further up this thread's stack.
pub(crate) fn is_subscriber_active(id: SubscriberId) -> bool {
    ACTIVE_SUBSCRIBERS.with(|active| active.borrow().contains(&id))
}

/// Mark `id` as executing until the scope drops.
pub(crate) fn enter_subscriber(id: SubscriberId) -> SubscriberScope {
    ACTIVE_SUBSCRIBERS.with(|active| active.borrow_mut().push(id));
    SubscriberScope {
        _not_send: PhantomData,
    }
}

pub(crate) struct SubscriberScope {
    _not_send: PhantomData<*const ()>,
}

impl Drop for SubscriberScope {
    fn drop(&mut self) {
        ACTIVE_SUBSCRIBERS.with(|active| {
            active.borrow_mut().pop();
        });
    }
}
