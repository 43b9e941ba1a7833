//! Error types for the event engine

use thiserror::Error;

/// Event engine errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Mutation attempted on a sealed event
    #[error("Event for topic {topic} is read-only")]
    ImmutableEvent { topic: String },

    /// Typed property getter requested an incompatible type
    #[error("Property {key} is not assignable to {expected}: {reason}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        reason: String,
    },

    /// Publish or subscribe permission denied
    #[error("Not authorized to {action} topic {topic}")]
    Unauthorized { action: TopicAction, topic: String },

    /// Invalid argument supplied by the caller
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Malformed topic name
    #[error("Invalid topic {topic:?}: {reason}")]
    InvalidTopic { topic: String, reason: String },

    /// Filter expression could not be parsed
    #[error("Invalid filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },

    /// Operation not valid in the current state
    #[error("Illegal state: {reason}")]
    IllegalState { reason: String },

    /// A named local with this name is already live on the current event
    #[error("Duplicate event local: {name}")]
    DuplicateLocal { name: String },

    /// No executor is bound for the stage the topic routes to
    #[error("No executor bound for stage {stage}")]
    NoExecutor { stage: String },

    /// The stage executor refused the task
    #[error("Executor for stage {stage} rejected the event: {reason}")]
    ExecutorRejected { stage: String, reason: String },
}

/// Action guarded by the authorization hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicAction {
    Publish,
    Subscribe,
}

impl std::fmt::Display for TopicAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Publish => f.write_str("publish"),
            Self::Subscribe => f.write_str("subscribe"),
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
