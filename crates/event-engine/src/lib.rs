//! # Event Engine - Topic-Routed Publish/Subscribe
//!
//! In-process event engine: publishers send events to hierarchical topics,
//! subscribers register topic patterns, and every event is delivered to the
//! matching subscribers in ranked order.
//!
//! ## Dispatch Model
//!
//! ```text
//! ┌──────────────┐  send_event()   ┌──────────────┐   ranked    ┌──────────────┐
//! │  Publisher   │ ──────────────→ │ Event Engine │ ──────────→ │ Subscribers  │
//! │              │  post_event()   │              │  handlers   │              │
//! └──────────────┘        │        └──────────────┘             └──────────────┘
//!                         │               ↑ topic → subscribers, stage
//!                         ▼        ┌──────────────┐
//!                 ┌──────────────┐ │ Topic Index  │
//!                 │Stage Executor│ └──────────────┘
//!                 └──────────────┘
//! ```
//!
//! - **send:** delivered on the calling thread; done on return.
//! - **post:** handed to the executor of the topic's stage.
//!
//! ## Topics
//!
//! `org/apache/ant` is a discrete topic, `org/apache/*` selects every topic
//! under `org/apache/`, and `*` selects everything. Stages are resolved by
//! exact match first, then the longest wildcard.
//!
//! ## Failure Isolation
//!
//! A handler returning `Err` or panicking is logged with its subscriber id;
//! the remaining handlers still run.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod scheduled;
pub mod service;

// Re-export main types
pub use config::{DuplicateLocalPolicy, EngineConfig, DEFAULT_STAGE, DEFAULT_TOPIC_CACHE_CAPACITY};
pub use domain::{
    CurrentEvent, DispatchHandle, DispatchStatus, Event, EventDispatch, EventFilter,
    EventLocalStore, Local, Properties, ReservedKey, SlotRegistry, SubscriberId, Topic,
    TopicData, TopicIndex,
};
pub use error::{EngineError, EngineResult, TopicAction};
pub use ports::{
    EventApi, EventHandler, ExecutorFactory, HandlerResolver, LogLevel, LogSink,
    ScheduledHandle, Scheduler, StageExecutor, SubscriberRegistration, SubscriptionApi,
    TopicAuthorizer,
};
pub use scheduled::ScheduledEventService;
pub use service::EventEngine;

/// Separator between topic segments.
pub use domain::topic::TOPIC_SEPARATOR;
