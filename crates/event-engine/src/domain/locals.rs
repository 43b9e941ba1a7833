//! # Event Locals
//!
//! Event-scoped variables kept outside the property bag.
//!
//! Each event owns an [`EventLocalStore`]. A store created for an event that
//! was raised while another event was being processed chains to the outer
//! event's store: reads fall through to the parent for keys the child has not
//! touched, writes and removals stay in the child overlay.
//!
//! ```text
//! parent:  k = "p"          parent:  k = "p2"
//! child:   (untouched)  ->  child:   k = <removed>   => child.get(k) == None
//! ```

use crate::config::DuplicateLocalPolicy;
use crate::domain::context::CurrentEvent;
use crate::error::{EngineError, EngineResult};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Type-erased local value.
pub type LocalValue = Arc<dyn Any + Send + Sync>;

static NEXT_ANONYMOUS: AtomicU64 = AtomicU64::new(0);

/// Storage key of a local. Named locals are keyed by their name, so looking a
/// value up by name and by handle always agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalKey {
    Named(Arc<str>),
    Anonymous(u64),
}

enum Entry {
    Present(LocalValue),
    /// Shadows whatever the parent holds for the key.
    Removed,
}

/// Parent-chained, copy-on-write key/value store scoped to one event.
pub struct EventLocalStore {
    parent: Option<Arc<EventLocalStore>>,
    entries: RwLock<HashMap<LocalKey, Entry>>,
    declared: Mutex<HashSet<Arc<str>>>,
    policy: DuplicateLocalPolicy,
}

impl EventLocalStore {
    /// Root store with the default duplicate policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(DuplicateLocalPolicy::default())
    }

    #[must_use]
    pub fn with_policy(policy: DuplicateLocalPolicy) -> Self {
        Self {
            parent: None,
            entries: RwLock::new(HashMap::new()),
            declared: Mutex::new(HashSet::new()),
            policy,
        }
    }

    /// Overlay on top of `parent`. The parent is never mutated through it.
    #[must_use]
    pub fn child(parent: &Arc<EventLocalStore>) -> Self {
        Self {
            parent: Some(parent.clone()),
            entries: RwLock::new(HashMap::new()),
            declared: Mutex::new(HashSet::new()),
            policy: parent.policy,
        }
    }

    #[must_use]
    pub fn parent(&self) -> Option<&Arc<EventLocalStore>> {
        self.parent.as_ref()
    }

    #[must_use]
    pub fn policy(&self) -> DuplicateLocalPolicy {
        self.policy
    }

    /// Visible value for `key`: own overlay first, then the parent chain.
    #[must_use]
    pub fn get_raw(&self, key: &LocalKey) -> Option<LocalValue> {
        if let Some(entry) = self.entries.read().get(key) {
            return match entry {
                Entry::Present(value) => Some(value.clone()),
                Entry::Removed => None,
            };
        }
        self.parent.as_ref().and_then(|parent| parent.get_raw(key))
    }

    pub fn put_raw(&self, key: LocalKey, value: LocalValue) {
        self.entries.write().insert(key, Entry::Present(value));
    }

    /// Hide `key` at this level and return the value that was visible.
    pub fn remove_raw(&self, key: &LocalKey) -> Option<LocalValue> {
        let previous = self.get_raw(key);
        self.entries.write().insert(key.clone(), Entry::Removed);
        previous
    }

    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, local: &Local<T>) -> Option<Arc<T>> {
        self.get_raw(&local.key).and_then(|v| v.downcast::<T>().ok())
    }

    pub fn put<T: Any + Send + Sync>(&self, local: &Local<T>, value: T) {
        self.put_raw(local.key.clone(), Arc::new(value));
    }

    pub fn remove<T: Any + Send + Sync>(&self, local: &Local<T>) -> Option<Arc<T>> {
        self.remove_raw(&local.key)
            .and_then(|v| v.downcast::<T>().ok())
    }

    /// Look a named local up by its name.
    #[must_use]
    pub fn get_by_name<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get_raw(&LocalKey::Named(Arc::from(name)))
            .and_then(|v| v.downcast::<T>().ok())
    }

    /// Number of keys this store itself holds a value or a removal for.
    #[must_use]
    pub fn overlay_len(&self) -> usize {
        self.entries.read().len()
    }

    fn declare(&self, name: &Arc<str>) -> EngineResult<()> {
        let mut declared = self.declared.lock();
        if !declared.insert(name.clone()) && self.policy == DuplicateLocalPolicy::Reject {
            return Err(EngineError::DuplicateLocal {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn undeclare(&self, name: &str) {
        self.declared.lock().remove(name);
    }
}

impl Default for EventLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLocalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLocalStore")
            .field("entries", &self.overlay_len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// Typed handle to an event-scoped variable.
///
/// The convenience accessors operate on the current event of the calling
/// thread; the store methods take an explicit store.
pub struct Local<T> {
    key: LocalKey,
    declared_in: Option<Weak<EventLocalStore>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> Local<T> {
    /// A local with no name, addressable only through this handle.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            key: LocalKey::Anonymous(NEXT_ANONYMOUS.fetch_add(1, Ordering::Relaxed)),
            declared_in: None,
            _marker: PhantomData,
        }
    }

    /// A named local, not tied to any event.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            key: LocalKey::Named(Arc::from(name)),
            declared_in: None,
            _marker: PhantomData,
        }
    }

    /// A named local declared on the current event.
    ///
    /// Under [`DuplicateLocalPolicy::Reject`], fails while another handle
    /// declared with the same name is still alive on that event. The
    /// declaration is released when the handle drops.
    pub fn declare(name: &str) -> EngineResult<Self> {
        let event = CurrentEvent::current().ok_or_else(|| EngineError::IllegalState {
            reason: format!("no current event to declare local {name}"),
        })?;
        let name: Arc<str> = Arc::from(name);
        event.locals().declare(&name)?;
        Ok(Self {
            key: LocalKey::Named(name),
            declared_in: Some(Arc::downgrade(event.locals())),
            _marker: PhantomData,
        })
    }

    #[must_use]
    pub fn key(&self) -> &LocalKey {
        &self.key
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match &self.key {
            LocalKey::Named(name) => Some(name),
            LocalKey::Anonymous(_) => None,
        }
    }

    /// Value on the current event, if any.
    #[must_use]
    pub fn get(&self) -> Option<Arc<T>> {
        CurrentEvent::current().and_then(|event| event.locals().get(self))
    }

    /// Set the value on the current event.
    pub fn set(&self, value: T) -> EngineResult<()> {
        let event = CurrentEvent::current().ok_or_else(|| EngineError::IllegalState {
            reason: "no current event to set local on".into(),
        })?;
        event.locals().put(self, value);
        Ok(())
    }

    /// Remove the value from the current event.
    pub fn remove(&self) -> Option<Arc<T>> {
        CurrentEvent::current().and_then(|event| event.locals().remove(self))
    }
}

impl<T> Drop for Local<T> {
    fn drop(&mut self) {
        let (Some(store), LocalKey::Named(name)) = (
            self.declared_in.as_ref().and_then(Weak::upgrade),
            &self.key,
        ) else {
            return;
        };
        store.undeclare(name);
    }
}

impl<T> fmt::Debug for Local<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Local").field("key", &self.key).finish()
    }
}
