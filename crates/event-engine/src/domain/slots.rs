//! # Slot Registry
//!
//! Process-wide assignment of stable integer slots to property names.
//!
//! Well-known property keys reserve a slot once and are then stored in a
//! slot-indexed array on every event instead of a hashed map. Slots are
//! monotonic and never reclaimed.

use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

lazy_static! {
    static ref GLOBAL_SLOTS: SlotRegistry = SlotRegistry::new();
}

/// Name → slot table.
#[derive(Debug, Default)]
pub struct SlotRegistry {
    table: RwLock<SlotTable>,
}

#[derive(Debug, Default)]
struct SlotTable {
    by_name: HashMap<String, usize>,
    /// Slot index → name. Its length is the next slot to hand out.
    names: Vec<String>,
}

impl SlotRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every event in the process.
    #[must_use]
    pub fn global() -> &'static SlotRegistry {
        &GLOBAL_SLOTS
    }

    /// Return the slot for `name`, allocating the next one if it has none yet.
    pub fn reserve_slot(&self, name: &str) -> usize {
        if let Some(&slot) = self.table.read().by_name.get(name) {
            return slot;
        }

        let mut table = self.table.write();
        // Another thread may have won the race between the two locks.
        if let Some(&slot) = table.by_name.get(name) {
            return slot;
        }
        let slot = table.names.len();
        table.names.push(name.to_owned());
        table.by_name.insert(name.to_owned(), slot);
        debug!(name, slot, "Reserved property slot");
        slot
    }

    /// Look up an existing slot without reserving one.
    #[must_use]
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.table.read().by_name.get(name).copied()
    }

    /// Name registered for `slot`.
    #[must_use]
    pub fn name_of(&self, slot: usize) -> Option<String> {
        self.table.read().names.get(slot).cloned()
    }

    /// Number of slots handed out so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
