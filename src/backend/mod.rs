//! Backend Module
//!
//! One capability contract, [`CacheBackend`], implemented by the in-process
//! [`TtlLruCache`] and by pass-through adapters for Redis and Memcached.
//! Adapters own no eviction logic; they delegate to the remote store.

mod memcached;
mod memory;
mod redis_store;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::cache::TtlLruCache;
use crate::error::{CacheError, Result};

pub(crate) use memcached::validate_key;
pub use memcached::{MemcachedBackend, MAX_MEMCACHED_KEY_LENGTH};
pub use redis_store::RedisBackend;

// == Backend Kind ==
/// Identifies a backend variant. Serialized as `inMemory`, `redis`, `memcached`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendKind {
    InMemory,
    Redis,
    Memcached,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::InMemory => "inMemory",
            BackendKind::Redis => "redis",
            BackendKind::Memcached => "memcached",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inMemory" => Ok(BackendKind::InMemory),
            "redis" => Ok(BackendKind::Redis),
            "memcached" => Ok(BackendKind::Memcached),
            other => Err(CacheError::InvalidRequest(format!(
                "Unknown cache type '{}' (expected inMemory, redis or memcached)",
                other
            ))),
        }
    }
}

// == Capability Contract ==
/// Key/value capability shared by every backend.
///
/// `get` and `delete` report an absent key as [`CacheError::Miss`]. Remote
/// backends report transport and protocol failures as [`CacheError::Backend`].
#[async_trait]
pub trait CacheBackend<V: Send + 'static>: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn set(&self, key: &str, value: V, ttl: Duration) -> Result<()>;

    async fn get(&self, key: &str) -> Result<V>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Snapshot of every live entry the backend is able to enumerate.
    async fn get_all(&self) -> Result<HashMap<String, V>>;
}

// == Payload Codec ==
/// Encodes a value for a remote store as JSON text.
pub(crate) fn encode_payload<V: Serialize>(value: &V) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decodes a payload written by [`encode_payload`].
///
/// Text that is not JSON was written by another client and is read as a
/// JSON string.
pub(crate) fn decode_payload<V: DeserializeOwned>(raw: String) -> Result<V> {
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(_) => Ok(serde_json::from_value(Value::String(raw))?),
    }
}

// == Backend Set ==
/// The backends available to the HTTP layer, selected by [`BackendKind`].
///
/// The in-memory cache is always present; remote adapters are optional.
#[derive(Clone)]
pub struct BackendSet {
    memory: Arc<TtlLruCache<Value>>,
    redis: Option<Arc<dyn CacheBackend<Value>>>,
    memcached: Option<Arc<dyn CacheBackend<Value>>>,
}

impl BackendSet {
    pub fn new(memory: Arc<TtlLruCache<Value>>) -> Self {
        Self {
            memory,
            redis: None,
            memcached: None,
        }
    }

    pub fn with_redis(mut self, backend: Arc<dyn CacheBackend<Value>>) -> Self {
        self.redis = Some(backend);
        self
    }

    pub fn with_memcached(mut self, backend: Arc<dyn CacheBackend<Value>>) -> Self {
        self.memcached = Some(backend);
        self
    }

    /// The in-process cache.
    pub fn memory(&self) -> &Arc<TtlLruCache<Value>> {
        &self.memory
    }

    /// Returns the backend of the given kind, or a backend error if that kind
    /// is not configured.
    pub fn select(&self, kind: BackendKind) -> Result<Arc<dyn CacheBackend<Value>>> {
        let selected = match kind {
            BackendKind::InMemory => Some(self.memory.clone() as Arc<dyn CacheBackend<Value>>),
            BackendKind::Redis => self.redis.clone(),
            BackendKind::Memcached => self.memcached.clone(),
        };
        selected.ok_or_else(|| CacheError::backend(kind, "not configured"))
    }

    /// Every configured backend: in-memory first, then Redis, then Memcached.
    pub fn configured(&self) -> Vec<Arc<dyn CacheBackend<Value>>> {
        let mut backends = vec![self.memory.clone() as Arc<dyn CacheBackend<Value>>];
        backends.extend(self.redis.clone());
        backends.extend(self.memcached.clone());
        backends
    }
}
