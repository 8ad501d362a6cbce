//! Concurrent get-or-insert cache.
//!
//! Used for the repository path map, the per-extension binary sniffing cache
//! and the per-directory ignore matcher cache. Initializers run outside of any
//! lock, so two callers racing on the same key may both compute a value, but
//! only the first value committed to the map is ever returned to anyone.

use std::borrow::Borrow;
use std::hash::Hash;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

pub struct ConcurrentCache<K, V>
where
    K: Eq + Hash,
{
    map: DashMap<K, V>,
}

impl<K, V> ConcurrentCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self { map: DashMap::new() }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.get(key).map(|v| v.value().clone())
    }

    /// Returns the cached value, computing it with `init` on a miss.
    pub fn get_or_insert_with<F>(&self, key: K, init: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(existing) = self.map.get(&key) {
            return existing.value().clone();
        }
        let value = init();
        self.insert_if_absent(key, value).0
    }

    /// Commits `value` unless a value is already present.
    ///
    /// Returns the value visible after the call and whether this call's value
    /// was the one committed.
    pub fn insert_if_absent(&self, key: K, value: V) -> (V, bool) {
        match self.map.entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let stored = entry.insert(value);
                (stored.value().clone(), true)
            }
        }
    }

    /// Drops a cached entry so the next lookup recomputes it.
    pub fn invalidate<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.remove(key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn values(&self) -> Vec<V> {
        self.map.iter().map(|e| e.value().clone()).collect()
    }
}

impl<K, V> Default for ConcurrentCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
