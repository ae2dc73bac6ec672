//! Cache Store Module
//!
//! Main cache engine combining a key index with a recency list and lazy TTL
//! expiration. The store itself is not synchronized; see
//! [`TtlLruCache`](crate::cache::TtlLruCache) for the shared form.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, NodeId, RecencyList};
use crate::error::{CacheError, Result};

// == Cache Store ==
/// Bounded key/value storage with LRU eviction and lazy TTL expiry.
///
/// Every key in `index` maps to exactly one live node in `order`, and every
/// node in `order` is indexed under its own key.
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Key index into the recency list
    index: HashMap<String, NodeId>,
    /// Entries ordered from most to least recently used
    order: RecencyList<CacheEntry<V>>,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    capacity: usize,
}

impl<V: Clone> CacheStore<V> {
    // == Constructor ==
    /// Creates a new CacheStore holding at most `capacity` entries.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");

        Self {
            index: HashMap::with_capacity(capacity),
            order: RecencyList::with_capacity(capacity),
            stats: CacheStats::new(),
            capacity,
        }
    }

    // == Set ==
    /// Stores a key-value pair expiring after `ttl`.
    ///
    /// An existing key has its value and TTL replaced and becomes most
    /// recently used. A new key arriving at capacity first evicts the least
    /// recently used entry, whether or not that entry has already expired.
    /// A zero TTL is accepted; the entry is simply expired for later reads.
    pub fn set(&mut self, key: String, value: V, ttl: Duration) {
        self.set_at(key, value, ttl, Instant::now());
    }

    /// [`set`](Self::set) evaluated at an explicit instant.
    pub fn set_at(&mut self, key: String, value: V, ttl: Duration, now: Instant) {
        if let Some(&id) = self.index.get(&key) {
            if let Some(entry) = self.order.get_mut(id) {
                entry.refresh(value, ttl, now);
            }
            self.order.move_to_front(id);
            return;
        }

        if self.index.len() >= self.capacity {
            self.evict();
        }

        let id = self.order.push_front(CacheEntry::new(key.clone(), value, ttl, now));
        self.index.insert(key, id);
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// A live entry becomes most recently used. An expired entry is removed
    /// on the spot and reported as a miss, same as an absent key.
    pub fn get(&mut self, key: &str) -> Result<V> {
        self.get_at(key, Instant::now())
    }

    /// [`get`](Self::get) evaluated at an explicit instant.
    pub fn get_at(&mut self, key: &str, now: Instant) -> Result<V> {
        let Some(&id) = self.index.get(key) else {
            self.stats.record_miss();
            return Err(CacheError::Miss(key.to_string()));
        };

        let value = match self.order.get(id) {
            Some(entry) if !entry.is_expired_at(now) => entry.value.clone(),
            _ => {
                self.index.remove(key);
                self.order.remove(id);
                self.stats.record_expiration();
                self.stats.record_miss();
                debug!(key, "purged expired entry on read");
                return Err(CacheError::Miss(key.to_string()));
            }
        };

        self.order.move_to_front(id);
        self.stats.record_hit();
        Ok(value)
    }

    // == Delete ==
    /// Removes an entry by key.
    ///
    /// Expired entries that have not been purged yet are still present from
    /// the point of view of this call and are removed successfully.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        match self.index.remove(key) {
            Some(id) => {
                self.order.remove(id);
                Ok(())
            }
            None => Err(CacheError::Miss(key.to_string())),
        }
    }

    // == Get All ==
    /// Returns a snapshot of every unexpired entry.
    ///
    /// Neither refreshes recency nor purges the expired entries it skips.
    pub fn get_all(&self) -> HashMap<String, V> {
        self.get_all_at(Instant::now())
    }

    /// [`get_all`](Self::get_all) evaluated at an explicit instant.
    pub fn get_all_at(&self, now: Instant) -> HashMap<String, V> {
        self.order
            .iter()
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect()
    }

    // == Evict ==
    /// Removes the least recently used entry and returns its key.
    fn evict(&mut self) -> Option<String> {
        let entry = self.order.pop_back()?;
        self.index.remove(&entry.key);
        self.stats.record_eviction();
        debug!(key = %entry.key, "evicted least recently used entry");
        Some(entry.key)
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.index.len());
        stats
    }

    // == Recency Order ==
    /// Returns held keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.order.iter().map(|entry| entry.key.clone()).collect()
    }

    // == Length ==
    /// Returns the number of held entries, expired-but-unpurged included.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Asserts that the key index and the recency list describe the same set.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        assert!(self.index.len() <= self.capacity, "capacity exceeded");
        assert_eq!(self.index.len(), self.order.len(), "index/order size mismatch");
        for (key, &id) in &self.index {
            let entry = self.order.get(id).expect("index points at a dead node");
            assert_eq!(&entry.key, key, "index points at the wrong node");
        }
        for entry in self.order.iter() {
            assert!(self.index.contains_key(&entry.key), "unindexed node {}", entry.key);
        }
    }
}
