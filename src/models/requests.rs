//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;
use serde_json::Value;

use crate::backend::{self, BackendKind};
use crate::error::Result;

/// Request body for the SET operation (POST /cache/:key)
///
/// # Fields
/// - `value`: Any JSON value to store
/// - `ttl`: Optional TTL in seconds (uses default if not specified)
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The value to store
    pub value: Value,
    /// Optional TTL in seconds
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// Validates a key taken from the request path.
///
/// Keys must fit every backend, so the memcached key rules apply everywhere.
pub fn validate_key(key: &str) -> Result<()> {
    backend::validate_key(key)
}

/// Query string selecting a backend (`?cache=inMemory|redis|memcached`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheQuery {
    pub cache: Option<String>,
}

impl CacheQuery {
    /// The selected backend, if the query names one.
    pub fn backend(&self) -> Result<Option<BackendKind>> {
        self.cache.as_deref().map(str::parse).transpose()
    }

    /// The selected backend, defaulting to the in-memory cache.
    pub fn backend_or_default(&self) -> Result<BackendKind> {
        Ok(self.backend()?.unwrap_or(BackendKind::InMemory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MAX_MEMCACHED_KEY_LENGTH;
    use crate::error::CacheError;
    use serde_json::json;

    #[test]
    fn test_set_request_deserialize() {
        let req: SetRequest = serde_json::from_str(r#"{"value": "hello"}"#).unwrap();
        assert_eq!(req.value, json!("hello"));
        assert!(req.ttl.is_none());
    }

    #[test]
    fn test_set_request_with_ttl_and_structured_value() {
        let req: SetRequest =
            serde_json::from_str(r#"{"value": {"n": [1, 2]}, "ttl": 60}"#).unwrap();
        assert_eq!(req.ttl, Some(60));
        assert_eq!(req.value["n"][1], 2);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("valid_key").is_ok());
        assert!(validate_key(&"x".repeat(MAX_MEMCACHED_KEY_LENGTH)).is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key(&"x".repeat(MAX_MEMCACHED_KEY_LENGTH + 1)).is_err());
        assert!(matches!(
            validate_key("has space"),
            Err(CacheError::InvalidRequest(_))
        ));
        assert!(validate_key("line\nbreak").is_err());
    }

    #[test]
    fn test_cache_query() {
        let query = CacheQuery::default();
        assert_eq!(query.backend().unwrap(), None);
        assert_eq!(query.backend_or_default().unwrap(), BackendKind::InMemory);

        let query = CacheQuery {
            cache: Some("redis".to_string()),
        };
        assert_eq!(query.backend_or_default().unwrap(), BackendKind::Redis);

        let query = CacheQuery {
            cache: Some("bogus".to_string()),
        };
        assert!(query.backend().is_err());
    }
}
