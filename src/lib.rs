//! Unified Cache - bounded in-process TTL-LRU cache
//!
//! Provides a fixed-capacity key/value cache with least-recently-used
//! eviction and lazily enforced per-entry TTLs, plus interchangeable Redis and
//! Memcached backends behind the same capability contract.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;

pub use api::AppState;
pub use backend::{BackendKind, BackendSet, CacheBackend};
pub use cache::TtlLruCache;
pub use config::Config;
pub use error::CacheError;
