//! # Adapters Layer (Hexagonal Architecture)
//!
//! In-process implementations of every outbound port: stage executors, the
//! subscriber registry, topic access control, log sinks and the scheduler.

mod authorizer;
mod executor;
mod log_sink;
mod registry;
mod scheduler;

pub use authorizer::TopicAcl;
pub use executor::{InlineExecutor, StageExecutors, TokioStageExecutor};
pub use log_sink::{LogEntry, RecordingLogSink, TracingLogSink};
pub use registry::{HandlerTable, InMemorySubscriberRegistry};
pub use scheduler::TokioScheduler;
