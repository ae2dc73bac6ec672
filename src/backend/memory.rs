//! In-process backend: the TTL-LRU cache behind the capability contract.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use super::{BackendKind, CacheBackend};
use crate::cache::TtlLruCache;
use crate::error::Result;

#[async_trait]
impl<V> CacheBackend<V> for TtlLruCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn kind(&self) -> BackendKind {
        BackendKind::InMemory
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) -> Result<()> {
        TtlLruCache::set(self, key, value, ttl);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<V> {
        TtlLruCache::get(self, key)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        TtlLruCache::delete(self, key)
    }

    async fn get_all(&self) -> Result<HashMap<String, V>> {
        Ok(TtlLruCache::get_all(self))
    }
}
