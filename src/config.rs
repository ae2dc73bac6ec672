//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::time::Duration;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries the in-memory cache can hold
    pub capacity: usize,
    /// Default TTL in seconds for writes without explicit TTL
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Redis connection URL; the Redis backend is disabled when unset
    pub redis_url: Option<String>,
    /// Memcached address; the Memcached backend is disabled when unset
    pub memcached_addr: Option<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - In-memory cache capacity, must be positive (default: 5)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 60)
    /// - `SERVER_PORT` - HTTP server port (default: 8080)
    /// - `REDIS_URL` - e.g. `redis://localhost:6379` (optional)
    /// - `MEMCACHED_ADDR` - e.g. `localhost:11211` (optional)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            capacity: env::var("CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&capacity| capacity > 0)
                .unwrap_or(defaults.capacity),
            default_ttl: env::var("DEFAULT_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_ttl),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.server_port),
            redis_url: non_empty_var("REDIS_URL"),
            memcached_addr: non_empty_var("MEMCACHED_ADDR"),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 5,
            default_ttl: 60,
            server_port: 8080,
            redis_url: None,
            memcached_addr: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.capacity, 5);
        assert_eq!(config.default_ttl, 60);
        assert_eq!(config.default_ttl(), Duration::from_secs(60));
        assert_eq!(config.server_port, 8080);
        assert!(config.redis_url.is_none());
        assert!(config.memcached_addr.is_none());
    }

    // Env vars are process-global, so every env assertion lives in this one test.
    #[test]
    fn test_config_from_env() {
        env::remove_var("CACHE_CAPACITY");
        env::remove_var("DEFAULT_TTL");
        env::remove_var("SERVER_PORT");
        env::remove_var("REDIS_URL");
        env::remove_var("MEMCACHED_ADDR");

        let config = Config::from_env();
        assert_eq!(config.capacity, 5);
        assert_eq!(config.default_ttl, 60);
        assert_eq!(config.server_port, 8080);
        assert!(config.redis_url.is_none());

        env::set_var("CACHE_CAPACITY", "0");
        env::set_var("REDIS_URL", "redis://localhost:6379");
        env::set_var("MEMCACHED_ADDR", "  ");

        let config = Config::from_env();
        assert_eq!(config.capacity, 5, "zero capacity falls back to default");
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert!(config.memcached_addr.is_none());

        env::remove_var("CACHE_CAPACITY");
        env::remove_var("REDIS_URL");
        env::remove_var("MEMCACHED_ADDR");
    }
}
