//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `POST /cache/:key` - Store a value
//! - `GET /cache/:key?cache=<inMemory|redis|memcached>` - Retrieve a value
//! - `DELETE /cache/:key?cache=<inMemory|redis|memcached>` - Delete a key
//! - `GET /cache` - Snapshot of all live entries
//! - `GET /stats` - In-memory cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
