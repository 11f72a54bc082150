//! Bounded memoization for classifier results.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use uuid::Uuid;

/// Namespace for cache keys, so identical inputs always hash identically.
const CACHE_NAMESPACE: Uuid = Uuid::from_bytes([
    0x66, 0x6f, 0x63, 0x75, // "focu"
    0x73, 0x66, 0x6c, 0x6f, // "sflo"
    0x77, 0x2d, 0x63, 0x61, // "w-ca"
    0x63, 0x68, 0x65, 0x73, // "ches"
]);

/// Separator between key parts; cannot appear in window titles in practice.
const PART_SEPARATOR: char = '\u{1f}';

/// Stable hash of an ordered tuple of strings.
///
/// The same parts always produce the same key, across runs and processes.
#[must_use]
pub fn stable_key(parts: &[&str]) -> Uuid {
    let mut joined = String::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            joined.push(PART_SEPARATOR);
        }
        joined.push_str(part);
    }
    Uuid::new_v5(&CACHE_NAMESPACE, joined.as_bytes())
}

/// A thread-safe LRU map from stable keys to cloned values.
///
/// The lock is never held across an await point; callers compute values
/// outside and insert afterwards, so two concurrent misses may both compute.
pub struct MemoCache<V> {
    inner: Mutex<LruCache<Uuid, V>>,
}

impl<V: Clone> MemoCache<V> {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns a clone of the cached value and marks it recently used.
    pub fn get(&self, key: &Uuid) -> Option<V> {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(key).cloned()
    }

    pub fn insert(&self, key: Uuid, value: V) {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(key, value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
