//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint. The `cache` query
//! parameter picks the backend; the handlers only translate between HTTP and
//! the [`CacheBackend`](crate::backend::CacheBackend) contract.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;
use tracing::warn;

use crate::backend::BackendSet;
use crate::cache::TtlLruCache;
use crate::config::Config;
use crate::error::Result;
use crate::models::{
    validate_key, CacheQuery, DeleteResponse, GetResponse, HealthResponse, SetRequest,
    SetResponse, StatsResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Configured backends; the in-memory cache is always present
    pub backends: BackendSet,
    /// TTL applied to writes that do not carry one
    pub default_ttl: Duration,
}

impl AppState {
    /// Creates a new AppState over the given backends.
    pub fn new(backends: BackendSet, default_ttl: Duration) -> Self {
        Self {
            backends,
            default_ttl,
        }
    }

    /// Creates an AppState with only the in-memory cache, sized from config.
    pub fn from_config(config: &Config) -> Self {
        let memory = Arc::new(TtlLruCache::new(config.capacity));
        Self::new(BackendSet::new(memory), config.default_ttl())
    }
}

/// Handler for POST /cache/:key
///
/// Writes the value to every configured backend, or only to the one named by
/// `?cache=`. Backends are written in order and the first failure is
/// returned; backends written before it keep the value.
pub async fn set_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<CacheQuery>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    // Rejected before any backend is written
    validate_key(&key)?;

    let ttl = req.ttl.map(Duration::from_secs).unwrap_or(state.default_ttl);
    let targets = match query.backend()? {
        Some(kind) => vec![state.backends.select(kind)?],
        None => state.backends.configured(),
    };

    let mut written = Vec::with_capacity(targets.len());
    for backend in targets {
        if let Err(err) = backend.set(&key, req.value.clone(), ttl).await {
            warn!(
                cache = %backend.kind(),
                key = %key,
                written = ?written,
                error = %err,
                "write failed"
            );
            return Err(err);
        }
        written.push(backend.kind());
    }

    Ok(Json(SetResponse::new(key, written)))
}

/// Handler for GET /cache/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<CacheQuery>,
) -> Result<Json<GetResponse>> {
    let kind = query.backend_or_default()?;
    let value = state.backends.select(kind)?.get(&key).await?;

    Ok(Json(GetResponse::new(key, value, kind)))
}

/// Handler for DELETE /cache/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<CacheQuery>,
) -> Result<Json<DeleteResponse>> {
    let kind = query.backend_or_default()?;
    state.backends.select(kind)?.delete(&key).await?;

    Ok(Json(DeleteResponse::new(key, kind)))
}

/// Handler for GET /cache
///
/// Merges the snapshots of every configured backend (later backends win on
/// key collisions), or returns one backend's snapshot when `?cache=` is set.
pub async fn get_all_handler(
    State(state): State<AppState>,
    Query(query): Query<CacheQuery>,
) -> Result<Json<HashMap<String, Value>>> {
    let sources = match query.backend()? {
        Some(kind) => vec![state.backends.select(kind)?],
        None => state.backends.configured(),
    };

    let mut merged = HashMap::new();
    for backend in sources {
        merged.extend(backend.get_all().await?);
    }

    Ok(Json(merged))
}

/// Handler for GET /stats
///
/// Returns statistics of the in-memory cache.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let memory = state.backends.memory();
    Json(StatsResponse::new(&memory.stats(), memory.capacity()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
