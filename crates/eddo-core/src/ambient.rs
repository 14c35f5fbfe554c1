//! Process-scoped ambient state.
//!
//! §5/§9 call for exactly two shared caches plus a short-lived trace-context
//! bridge, all "write-through", safe for concurrent access, and resettable in
//! tests. Rather than expose bare globals, every ambient cache in this
//! workspace is an instance of one of the two generic containers below,
//! reached through a crate-local `OnceLock` the owning crate exposes.

use dashmap::{DashMap, DashSet};

/// A set of keys that have each been "ensured" exactly once per process
/// lifetime — e.g. the audit-database-index-ensured set keyed by username.
/// Entries are never evicted.
#[derive(Default)]
pub struct EnsuredSet(DashSet<String>);

impl EnsuredSet {
    pub fn new() -> Self {
        Self(DashSet::new())
    }

    /// Returns `true` the first time a given key is seen, `false` on every
    /// subsequent call. Callers use this to gate a one-time side effect
    /// (e.g. "create this secondary index") without a lock around the
    /// side effect itself.
    pub fn ensure(&self, key: &str) -> bool {
        self.0.insert(key.to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    pub fn reset_for_tests(&self) {
        self.0.clear();
    }
}

/// A write-through memoization cache keyed by an arbitrary string — e.g. the
/// per-user `couchUrl:username -> service` map. Entries are never evicted
/// within a process lifetime.
#[derive(Default)]
pub struct KeyedCache<V: Clone>(DashMap<String, V>);

impl<V: Clone> KeyedCache<V> {
    pub fn new() -> Self {
        Self(DashMap::new())
    }

    pub fn get_or_insert_with(&self, key: &str, make: impl FnOnce() -> V) -> V {
        if let Some(existing) = self.0.get(key) {
            return existing.clone();
        }
        let value = make();
        self.0.entry(key.to_string()).or_insert(value).clone()
    }

    pub fn reset_for_tests(&self) {
        self.0.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensured_set_fires_once_per_key() {
        let set = EnsuredSet::new();
        assert!(set.ensure("alice"));
        assert!(!set.ensure("alice"));
        assert!(set.ensure("bob"));
        set.reset_for_tests();
        assert!(set.ensure("alice"));
    }

    #[test]
    fn keyed_cache_memoizes() {
        let cache: KeyedCache<u32> = KeyedCache::new();
        let mut calls = 0;
        let a = cache.get_or_insert_with("k", || {
            calls += 1;
            42
        });
        let b = cache.get_or_insert_with("k", || {
            calls += 1;
            99
        });
        assert_eq!(a, 42);
        assert_eq!(b, 42);
        assert_eq!(calls, 1);
    }
}
