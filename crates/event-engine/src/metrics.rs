//! # Engine Metrics
//!
//! Prometheus counters for dispatch activity.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! event-engine = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `event_engine_events_sent_total` - Counter of synchronous dispatches
//! - `event_engine_events_posted_total` - Counter of asynchronous dispatches (by stage)
//! - `event_engine_handler_failures_total` - Counter of failed handler invocations
//! - `event_engine_topic_cache_misses_total` - Counter of topic routing computations

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Total events delivered synchronously
    pub static ref EVENTS_SENT: IntCounter = register_int_counter!(
        "event_engine_events_sent_total",
        "Total number of events dispatched synchronously"
    )
    .expect("Failed to create EVENTS_SENT metric");

    /// Total events handed to a stage executor, labeled by stage
    pub static ref EVENTS_POSTED: IntCounterVec = register_int_counter_vec!(
        "event_engine_events_posted_total",
        "Total number of events submitted to a stage executor",
        &["stage"]
    )
    .expect("Failed to create EVENTS_POSTED metric");

    /// Total handler invocations that returned an error or panicked
    pub static ref HANDLER_FAILURES: IntCounter = register_int_counter!(
        "event_engine_handler_failures_total",
        "Total number of failed handler invocations"
    )
    .expect("Failed to create HANDLER_FAILURES metric");

    /// Total topic routing computations
    pub static ref TOPIC_CACHE_MISSES: IntCounter = register_int_counter!(
        "event_engine_topic_cache_misses_total",
        "Total number of topic routing cache misses"
    )
    .expect("Failed to create TOPIC_CACHE_MISSES metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

/// Record a synchronous dispatch
#[cfg(feature = "metrics")]
pub fn record_event_sent() {
    EVENTS_SENT.inc();
}

/// Record an asynchronous dispatch accepted by `stage`
#[cfg(feature = "metrics")]
pub fn record_event_posted(stage: &str) {
    EVENTS_POSTED.with_label_values(&[stage]).inc();
}

/// Record a failed handler invocation
#[cfg(feature = "metrics")]
pub fn record_handler_failure() {
    HANDLER_FAILURES.inc();
}

/// Record a topic routing computation
#[cfg(feature = "metrics")]
pub fn record_topic_cache_miss() {
    TOPIC_CACHE_MISSES.inc();
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature is disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_event_sent() {}

#[cfg(not(feature = "metrics"))]
pub fn record_event_posted(_stage: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_handler_failure() {}

#[cfg(not(feature = "metrics"))]
pub fn record_topic_cache_miss() {}
