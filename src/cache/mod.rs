//! Cache Module
//!
//! Provides bounded in-memory caching with lazy TTL expiration and LRU
//! eviction.

mod entry;
mod lru;
mod stats;
mod store;
mod ttl_lru;


// Re-export public types
pub use entry::CacheEntry;
pub use lru::{NodeId, RecencyList};
pub use stats::CacheStats;
pub use store::CacheStore;
pub use ttl_lru::TtlLruCache;
