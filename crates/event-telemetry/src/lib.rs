//! # Event Telemetry
//!
//! Logging bootstrap for processes hosting the event engine. The engine only
//! emits `tracing` events; this crate installs the subscriber that writes them.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use event_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     init_logging(&config).expect("Failed to init logging");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `event-engine` | Service name in log records |
//! | `EVENT_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `EVENT_CONSOLE_OUTPUT` | `true` | Write records to stdout |
//! | `EVENT_JSON_LOGS` | `false` | JSON records (default `true` in containers) |

mod config;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::{build_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Span around the handling of one event.
///
/// # Example
///
/// ```rust,ignore
/// use event_telemetry::event_span;
///
/// let _span = event_span!("deliver", topic = "org/apache/ant").entered();
/// ```
#[macro_export]
macro_rules! event_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}
