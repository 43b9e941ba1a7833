//! Ports module for the event engine

pub mod inbound;
pub mod outbound;

pub use inbound::{EventApi, SubscriberRegistration, SubscriptionApi};
pub use outbound::{
    EventHandler, ExecutorFactory, HandlerResolver, LogLevel, LogSink, RepeatingTask,
    ScheduledHandle, Scheduler, StageExecutor, Task, TopicAuthorizer,
};
