//! Keyed aggregation store.
//!
//! A concurrent map of per-key fold state. Every derived view in the engine is
//! a reducer applied through [`KeyedStore::apply`]; the reducer runs while the
//! key's shard entry is held, so each key's read-modify-write is atomic and
//! later reads of that key observe it. Different keys are independent.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value of a key immediately before and after one reduce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Change<V> {
    pub before: V,
    pub after: V,
}

impl<V: PartialEq> Change<V> {
    pub fn is_changed(&self) -> bool {
        self.before != self.after
    }
}

/// Per-city fold state shared by the active, completion and duration views.
///
/// `last_offset` is the log offset of the newest event folded into this key.
/// Together with the counters it forms the recoverable {state, offset} pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityAggregateState {
    pub active_count: u64,
    pub completed_count: u64,
    pub total_duration_minutes: u64,
    #[serde(default)]
    pub last_offset: Option<u64>,
}

impl CityAggregateState {
    /// True when the event at `offset` is already reflected in this state.
    pub fn has_applied(&self, offset: u64) -> bool {
        self.last_offset.is_some_and(|last| offset <= last)
    }
}

pub struct KeyedStore<V> {
    entries: DashMap<String, V>,
}

impl<V> Default for KeyedStore<V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V: Default + Clone> KeyedStore<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `event` into the value stored under `key`.
    ///
    /// A missing key starts from `V::default()`. Returns the value before and
    /// after the reduce.
    pub fn apply<E, F>(&self, key: &str, event: &E, reducer: F) -> Change<V>
    where
        F: FnOnce(&V, &E) -> V,
    {
        let mut slot = match self.entries.get_mut(key) {
            Some(slot) => slot,
            None => self.entries.entry(key.to_string()).or_default(),
        };

        let before = slot.clone();
        let after = reducer(&before, event);
        *slot = after.clone();

        Change { before, after }
    }

    /// Current value for `key`, if the key has ever been reduced or restored.
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|v| v.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point-in-time copy of every key, ordered by key.
    ///
    /// Each value is read under its own shard lock, so every entry is
    /// internally consistent; entries are not a cross-key atomic cut.
    pub fn snapshot(&self) -> BTreeMap<String, V> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Replaces the whole store with `state`.
    pub fn restore(&self, state: BTreeMap<String, V>) {
        self.entries.clear();
        for (key, value) in state {
            self.entries.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(current: &u64, delta: &u64) -> u64 {
        current + delta
    }

    #[test]
    fn test_missing_key_starts_at_default() {
        let store: KeyedStore<u64> = KeyedStore::new();
        assert_eq!(store.get("Mumbai"), None);

        let change = store.apply("Mumbai", &5, add);
        assert_eq!(change.before, 0);
        assert_eq!(change.after, 5);
        assert!(change.is_changed());
    }

    #[test]
    fn test_read_your_writes() {
        let store: KeyedStore<u64> = KeyedStore::new();
        store.apply("Delhi", &2, add);
        store.apply("Delhi", &3, add);
        assert_eq!(store.get("Delhi"), Some(5));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unchanged_reduce_reports_no_change() {
        let store: KeyedStore<u64> = KeyedStore::new();
        let change = store.apply("Delhi", &0, add);
        assert!(!change.is_changed());
        // the key still exists after a no-op reduce
        assert_eq!(store.get("Delhi"), Some(0));
    }

    #[test]
    fn test_snapshot_and_restore() {
        let store: KeyedStore<u64> = KeyedStore::new();
        store.apply("b", &2, add);
        store.apply("a", &1, add);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["a", "b"]);

        let other: KeyedStore<u64> = KeyedStore::new();
        other.apply("stale", &9, add);
        other.restore(snapshot);
        assert_eq!(other.get("stale"), None);
        assert_eq!(other.get("b"), Some(2));
    }

    #[test]
    fn test_concurrent_keys_do_not_lose_updates() {
        let store: KeyedStore<u64> = KeyedStore::new();
        let cities = ["Bangalore", "Hyderabad", "Mumbai", "Delhi"];

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for i in 0..1_000 {
                        store.apply(cities[i % cities.len()], &1, add);
                    }
                });
            }
        });

        for city in cities {
            assert_eq!(store.get(city), Some(2_000));
        }
    }

    #[test]
    fn test_has_applied() {
        let mut state = CityAggregateState::default();
        assert!(!state.has_applied(0));
        state.last_offset = Some(4);
        assert!(state.has_applied(4));
        assert!(state.has_applied(1));
        assert!(!state.has_applied(5));
    }
}
