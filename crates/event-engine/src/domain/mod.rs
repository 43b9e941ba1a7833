//! Domain module for the event engine
//!
//! ## Core Modules
//! - slots: process-wide property slot reservation
//! - topic: topic names and subscription patterns
//! - filter: property filter expressions
//! - event: the event payload and its property map
//! - locals: per-event local storage
//! - context: the thread's current event
//! - subscription: normalized subscriber registrations
//! - index: topic → subscribers and stage routing
//! - dispatch: completion handles

pub mod context;
pub mod dispatch;
pub mod event;
pub mod filter;
pub mod index;
pub mod locals;
pub mod slots;
pub mod subscription;
pub mod topic;

pub use context::{CurrentEvent, EventScope};
pub use dispatch::{DispatchHandle, DispatchStatus, EventDispatch};
pub use event::{Event, Properties, PropertiesView, PropertyKey, ReservedKey};
pub use filter::EventFilter;
pub use index::{TopicData, TopicIndex};
pub use locals::{EventLocalStore, Local, LocalKey, LocalValue};
pub use slots::SlotRegistry;
pub use subscription::{SubscriberId, SubscriptionHolder};
pub use topic::{Topic, TopicPattern, TopicPatterns};
