//! Concurrent keyed store with one lock per key.
//!
//! The map itself is a [`DashMap`]; its shard locks are held only long enough
//! to find or insert a slot. Callers then lock the slot, so work on unrelated
//! keys never serializes on the same mutex.

use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

/// Concurrent map whose values each live behind their own mutex.
pub struct KeyedStore<K, V> {
    slots: DashMap<K, Arc<Mutex<V>>>,
}

impl<K, V> KeyedStore<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Returns the slot for `key`, creating it with `init` when absent.
    pub fn slot(&self, key: &K, init: impl FnOnce() -> V) -> Arc<Mutex<V>> {
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(init())))
            .clone()
    }

    /// Returns the slot for `key` when present.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<Arc<Mutex<V>>> {
        self.slots.get(key).map(|slot| Arc::clone(slot.value()))
    }

    /// Removes the slot for `key`, returning it when present.
    pub fn remove(&self, key: &K) -> Option<Arc<Mutex<V>>> {
        self.slots.remove(key).map(|(_, slot)| slot)
    }

    /// Drops every slot.
    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Returns the number of live slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` when no slots exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<K, V> Default for KeyedStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for KeyedStore<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedStore")
            .field("slots", &self.slots.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_is_created_once_and_shared() {
        let store: KeyedStore<&str, u32> = KeyedStore::new();
        let first = store.slot(&"a", || 1);
        *first.lock().unwrap() += 1;

        let second = store.slot(&"a", || 100);
        assert_eq!(*second.lock().unwrap(), 2);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_and_clear_drop_slots() {
        let store: KeyedStore<u8, ()> = KeyedStore::new();
        store.slot(&1, || ());
        store.slot(&2, || ());
        assert!(store.remove(&1).is_some());
        assert!(store.get(&1).is_none());
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_slot_calls_share_one_value() {
        let store = &KeyedStore::<u8, u32>::new();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(move || {
                    let slot = store.slot(&7, || 0);
                    *slot.lock().unwrap() += 1;
                });
            }
        });
        assert_eq!(*store.get(&7).unwrap().lock().unwrap(), 8);
        assert_eq!(store.len(), 1);
    }
}
