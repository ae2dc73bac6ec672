//! Redis adapter
//!
//! Pass-through to a Redis server via a multiplexed, auto-reconnecting
//! connection manager. Expiry is delegated to Redis (`SET ... PX`).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use super::{decode_payload, encode_payload, BackendKind, CacheBackend};
use crate::error::{CacheError, Result};

fn unavailable(err: redis::RedisError) -> CacheError {
    CacheError::backend(BackendKind::Redis, err)
}

/// Largest `PX` accepted without overflowing Redis's absolute expiry, which
/// adds the current time in milliseconds to a signed 64-bit value.
const MAX_PX_MILLIS: u64 = i64::MAX as u64 / 2;

/// Rounds a TTL up to whole milliseconds so a sub-millisecond TTL is not
/// mistaken for zero. TTLs past [`MAX_PX_MILLIS`] are clamped to it.
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    let millis = u64::try_from(ttl.as_millis())
        .unwrap_or(u64::MAX)
        .min(MAX_PX_MILLIS);
    if millis == 0 && !ttl.is_zero() {
        1
    } else {
        millis
    }
}

// == Redis Backend ==
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connects to `url` (e.g. `redis://localhost:6379`) and verifies the
    /// server answers `PING`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let mut conn = ConnectionManager::new(client).await.map_err(unavailable)?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(unavailable)?;

        info!(url, "connected to redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl<V> CacheBackend<V> for RedisBackend
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();

        // Redis rejects a zero expiry; an entry that expires immediately is
        // observably the same as no entry.
        if ttl.is_zero() {
            redis::cmd("DEL")
                .arg(key)
                .query_async::<_, i64>(&mut conn)
                .await
                .map_err(unavailable)?;
            return Ok(());
        }

        let payload = encode_payload(&value)?;
        redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn get(&self, key: &str) -> Result<V> {
        let mut conn = self.conn.clone();
        let raw = redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(unavailable)?;

        match raw {
            Some(raw) => decode_payload(raw),
            None => Err(CacheError::Miss(key.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let removed = redis::cmd("DEL")
            .arg(key)
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(unavailable)?;

        if removed == 0 {
            return Err(CacheError::Miss(key.to_string()));
        }
        Ok(())
    }

    /// Enumerating a shared Redis keyspace is not supported; always empty.
    async fn get_all(&self) -> Result<HashMap<String, V>> {
        Ok(HashMap::new())
    }
}
