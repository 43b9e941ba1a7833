//! # Events
//!
//! A property bag bound to a topic. Publishers populate it, the engine seals
//! it before dispatch, and from then on every mutation fails with
//! [`EngineError::ImmutableEvent`] while reads keep working.
//!
//! Properties are addressed either by plain string key or by a
//! [`ReservedKey`], which resolves through the [`SlotRegistry`] to a
//! slot-indexed array. Both addressing modes observe the same value for the
//! same logical name.

use crate::domain::filter::EventFilter;
use crate::domain::locals::EventLocalStore;
use crate::domain::slots::SlotRegistry;
use crate::domain::topic::Topic;
use crate::error::{EngineError, EngineResult};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Ordered property map used for publishing and snapshots.
pub type Properties = IndexMap<String, Value>;

/// Property name with a pre-reserved storage slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReservedKey {
    name: Arc<str>,
    slot: usize,
}

impl ReservedKey {
    /// Reserve (or look up) the global slot for `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            slot: SlotRegistry::global().reserve_slot(name),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Either addressing mode for a property.
#[derive(Debug, Clone, Copy)]
pub enum PropertyKey<'a> {
    Name(&'a str),
    Reserved(&'a ReservedKey),
}

impl PropertyKey<'_> {
    fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Reserved(key) => key.name(),
        }
    }
}

impl<'a> From<&'a str> for PropertyKey<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a String> for PropertyKey<'a> {
    fn from(name: &'a String) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a ReservedKey> for PropertyKey<'a> {
    fn from(key: &'a ReservedKey) -> Self {
        Self::Reserved(key)
    }
}

/// Storage behind an event. Names with a reserved slot live in `slots`,
/// everything else in `named`.
#[derive(Debug, Default)]
struct PropertyBag {
    named: IndexMap<String, Value>,
    slots: Vec<Option<Value>>,
}

impl PropertyBag {
    fn slot_for(key: PropertyKey<'_>) -> Option<usize> {
        match key {
            PropertyKey::Name(name) => SlotRegistry::global().slot_of(name),
            PropertyKey::Reserved(key) => Some(key.slot()),
        }
    }

    fn get(&self, key: PropertyKey<'_>) -> Option<&Value> {
        Self::slot_for(key)
            .and_then(|slot| self.slots.get(slot).and_then(Option::as_ref))
            // Written by name before the slot was reserved.
            .or_else(|| self.named.get(key.name()))
    }

    fn insert(&mut self, key: PropertyKey<'_>, value: Value) -> Option<Value> {
        match Self::slot_for(key) {
            Some(slot) => {
                if self.slots.len() <= slot {
                    self.slots.resize(slot + 1, None);
                }
                let stale = self.named.shift_remove(key.name());
                self.slots[slot].replace(value).or(stale)
            }
            None => self.named.insert(key.name().to_owned(), value),
        }
    }

    fn remove(&mut self, key: PropertyKey<'_>) -> Option<Value> {
        let slotted = Self::slot_for(key)
            .and_then(|slot| self.slots.get_mut(slot))
            .and_then(Option::take);
        let named = self.named.shift_remove(key.name());
        slotted.or(named)
    }

    fn clear(&mut self) {
        self.named.clear();
        self.slots.clear();
    }

    fn len(&self) -> usize {
        self.named.len() + self.slots.iter().filter(|v| v.is_some()).count()
    }

    /// String-addressed names in insertion order, then reserved names by slot.
    fn names(&self) -> Vec<String> {
        let registry = SlotRegistry::global();
        self.named
            .keys()
            .cloned()
            .chain(
                self.slots
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.is_some())
                    .filter_map(|(slot, _)| registry.name_of(slot)),
            )
            .collect()
    }

    fn snapshot(&self) -> Properties {
        let mut map: Properties = self.named.clone();
        let registry = SlotRegistry::global();
        for (slot, value) in self.slots.iter().enumerate() {
            if let (Some(value), Some(name)) = (value, registry.name_of(slot)) {
                map.insert(name, value.clone());
            }
        }
        map
    }

    /// Case-insensitive lookup used by filter evaluation.
    fn lookup_ignore_case(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.get(PropertyKey::Name(key)) {
            return Some(value.clone());
        }
        self.snapshot()
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value)
    }
}

struct EventState {
    bag: PropertyBag,
    sealed: bool,
}

/// An event: topic, properties, and event-scoped locals.
pub struct Event {
    id: Uuid,
    topic: Topic,
    state: RwLock<EventState>,
    locals: Arc<EventLocalStore>,
}

impl Event {
    /// Unsealed event with no properties and a root local store.
    #[must_use]
    pub fn new(topic: Topic) -> Self {
        Self::with_locals(topic, Arc::new(EventLocalStore::new()))
    }

    pub(crate) fn with_locals(topic: Topic, locals: Arc<EventLocalStore>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic,
            state: RwLock::new(EventState {
                bag: PropertyBag::default(),
                sealed: false,
            }),
            locals,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    #[must_use]
    pub fn topic_name(&self) -> &str {
        self.topic.name()
    }

    #[must_use]
    pub fn locals(&self) -> &Arc<EventLocalStore> {
        &self.locals
    }

    #[must_use]
    pub fn get_property<'k>(&self, key: impl Into<PropertyKey<'k>>) -> Option<Value> {
        self.state.read().bag.get(key.into()).cloned()
    }

    /// Typed getter. A stored value that does not deserialize into `T` is a
    /// [`EngineError::TypeMismatch`]; the stored value is left untouched.
    pub fn get_property_as<'k, T: DeserializeOwned>(
        &self,
        key: impl Into<PropertyKey<'k>>,
    ) -> EngineResult<Option<T>> {
        let key = key.into();
        let Some(value) = self.get_property(key) else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| EngineError::TypeMismatch {
                key: key.name().to_owned(),
                expected: std::any::type_name::<T>(),
                reason: e.to_string(),
            })
    }

    pub fn set_property<'k>(
        &self,
        key: impl Into<PropertyKey<'k>>,
        value: impl Into<Value>,
    ) -> EngineResult<()> {
        self.mutate(|bag| {
            bag.insert(key.into(), value.into());
        })
    }

    pub fn remove_property<'k>(&self, key: impl Into<PropertyKey<'k>>) -> EngineResult<Option<Value>> {
        self.mutate(|bag| bag.remove(key.into()))
    }

    /// Replace every property with a copy of `properties`.
    pub fn set_properties<I, K, V>(&self, properties: I) -> EngineResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut fresh = PropertyBag::default();
        for (key, value) in properties {
            fresh.insert(PropertyKey::Name(key.as_ref()), value.into());
        }
        self.mutate(|bag| *bag = fresh)
    }

    /// View over the properties; its mutators honor the seal.
    #[must_use]
    pub fn properties(&self) -> PropertiesView<'_> {
        PropertiesView { event: self }
    }

    /// Every currently set key, string-addressed first.
    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        self.state.read().bag.names()
    }

    /// Evaluate a filter expression against the current properties.
    pub fn matches(&self, expression: &str) -> EngineResult<bool> {
        Ok(self.matches_filter(&EventFilter::parse(expression)?))
    }

    #[must_use]
    pub fn matches_filter(&self, filter: &EventFilter) -> bool {
        let state = self.state.read();
        filter.matches(&|key: &str| state.bag.lookup_ignore_case(key))
    }

    /// Seal the event. There is no way back.
    pub fn seal(&self) {
        self.state.write().sealed = true;
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.state.read().sealed
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut PropertyBag) -> R) -> EngineResult<R> {
        let mut state = self.state.write();
        if state.sealed {
            return Err(EngineError::ImmutableEvent {
                topic: self.topic.name().to_owned(),
            });
        }
        Ok(f(&mut state.bag))
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("topic", &self.topic.name())
            .field("properties", &state.bag.snapshot())
            .field("sealed", &state.sealed)
            .finish()
    }
}

/// Live view over an event's properties.
pub struct PropertiesView<'a> {
    event: &'a Event,
}

impl PropertiesView<'_> {
    #[must_use]
    pub fn get<'k>(&self, key: impl Into<PropertyKey<'k>>) -> Option<Value> {
        self.event.get_property(key)
    }

    #[must_use]
    pub fn contains_key<'k>(&self, key: impl Into<PropertyKey<'k>>) -> bool {
        self.event.state.read().bag.get(key.into()).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.event.state.read().bag.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.event.property_names()
    }

    /// Owned copy of the current properties.
    #[must_use]
    pub fn to_map(&self) -> Properties {
        self.event.state.read().bag.snapshot()
    }

    pub fn insert<'k>(
        &self,
        key: impl Into<PropertyKey<'k>>,
        value: impl Into<Value>,
    ) -> EngineResult<Option<Value>> {
        let key = key.into();
        let value = value.into();
        self.event.mutate(|bag| bag.insert(key, value))
    }

    pub fn remove<'k>(&self, key: impl Into<PropertyKey<'k>>) -> EngineResult<Option<Value>> {
        self.event.remove_property(key)
    }

    pub fn clear(&self) -> EngineResult<()> {
        self.event.mutate(PropertyBag::clear)
    }
}
