//! Shared TTL-LRU Cache
//!
//! Thread-safe front for [`CacheStore`]: one exclusive lock covers the key
//! index and the recency list together for the whole of every operation.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

use crate::cache::{CacheStats, CacheStore};
use crate::error::Result;

// == TTL-LRU Cache ==
/// Bounded TTL-LRU cache safe to share between threads (e.g. behind `Arc`).
///
/// Operations are mutually exclusive regardless of key and never block or
/// await while holding the lock.
#[derive(Debug)]
pub struct TtlLruCache<V> {
    inner: Mutex<CacheStore<V>>,
}

impl<V: Clone> TtlLruCache<V> {
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheStore::new(capacity)),
        }
    }

    /// Stores `value` under `key` for `ttl`. Never fails.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.inner.lock().set(key.into(), value, ttl);
    }

    /// Returns the live value under `key`, or a miss.
    pub fn get(&self, key: &str) -> Result<V> {
        self.inner.lock().get(key)
    }

    /// Removes `key`, or returns a miss if it is not held.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.inner.lock().delete(key)
    }

    /// Snapshot of every unexpired entry.
    pub fn get_all(&self) -> HashMap<String, V> {
        self.inner.lock().get_all()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    /// Held keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.inner.lock().keys_by_recency()
    }
}
