//! # Memo Cache
//!
//! A lazily-populated, never-expiring map from key to computed value.
//! Unlike an LRU there is no capacity and no eviction: entries live until the
//! owner clears the whole cache. Used by the aggregator for per-workout
//! derived metrics.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
pub struct MemoCache<K, V> {
    entries: HashMap<K, V>,
    hits: u64,
    misses: u64,
}

/// Hit/miss counters since the last clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> MemoCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Get a cloned value, counting the lookup as a hit or miss.
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some(v) => {
                self.hits += 1;
                Some(v.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Insert or overwrite a value.
    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    /// Return the cached value or compute, store and return a new one.
    ///
    /// `compute` runs under the caller's borrow, so it must not await.
    pub fn get_or_compute<F>(&mut self, key: K, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(v) = self.get(&key) {
            return v;
        }
        let value = compute();
        self.entries.insert(key, value.clone());
        value
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn stats(&self) -> MemoStats {
        MemoStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for MemoCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut cache: MemoCache<String, i32> = MemoCache::new();

        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);

        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"c".to_string()), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.stats(),
            MemoStats {
                entries: 2,
                hits: 1,
                misses: 1
            }
        );
    }

    #[test]
    fn test_no_eviction() {
        let mut cache: MemoCache<u32, u32> = MemoCache::new();
        for i in 0..10_000 {
            cache.insert(i, i * 2);
        }
        assert_eq!(cache.len(), 10_000);
        assert_eq!(cache.get(&0), Some(0));
    }

    #[test]
    fn test_get_or_compute_runs_once() {
        let mut cache: MemoCache<&str, u32> = MemoCache::new();
        let mut calls = 0;

        let first = cache.get_or_compute("k", || {
            calls += 1;
            7
        });
        let second = cache.get_or_compute("k", || {
            calls += 1;
            99
        });

        assert_eq!((first, second), (7, 7));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_clear() {
        let mut cache: MemoCache<&str, u32> = MemoCache::new();
        cache.insert("a", 1);
        cache.get(&"a");

        cache.clear();

        assert!(cache.is_empty());
        assert!(!cache.contains(&"a"));
        assert_eq!(cache.stats(), MemoStats::default());
    }
}
