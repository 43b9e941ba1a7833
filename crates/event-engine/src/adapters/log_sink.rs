//! Log Sink Adapters
//!
//! `TracingLogSink` writes engine log records as `tracing` events and is what
//! the engine falls back to when no sink is bound. `RecordingLogSink` keeps
//! them in memory.

use crate::domain::subscription::SubscriberId;
use crate::ports::outbound::{LogLevel, LogSink};
use parking_lot::Mutex;
use std::error::Error;
use tracing::{debug, error, info, warn};

/// Forwards log records to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(
        &self,
        source: Option<SubscriberId>,
        level: LogLevel,
        message: &str,
        cause: Option<&(dyn Error + 'static)>,
    ) {
        let source = source.map(|id| id.to_string());
        let source = source.as_deref();
        let cause = cause.map(|e| e.to_string());
        let cause = cause.as_deref();
        match level {
            LogLevel::Error => error!(source, error = cause, "{message}"),
            LogLevel::Warning => warn!(source, error = cause, "{message}"),
            LogLevel::Info => info!(source, error = cause, "{message}"),
            LogLevel::Debug => debug!(source, error = cause, "{message}"),
        }
    }
}

/// One record captured by [`RecordingLogSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub source: Option<SubscriberId>,
    pub level: LogLevel,
    pub message: String,
    /// Display form of the attached error
    pub error: Option<String>,
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct RecordingLogSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingLogSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Records logged at `level`.
    #[must_use]
    pub fn at_level(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.level == level)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl LogSink for RecordingLogSink {
    fn log(
        &self,
        source: Option<SubscriberId>,
        level: LogLevel,
        message: &str,
        error: Option<&(dyn Error + 'static)>,
    ) {
        self.entries.lock().push(LogEntry {
            source,
            level,
            message: message.to_owned(),
            error: error.map(ToString::to_string),
        });
    }
}
