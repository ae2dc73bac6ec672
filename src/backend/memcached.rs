//! Memcached adapter
//!
//! Speaks the memcached text protocol over a single stream. Requests are
//! serialized by an async mutex around the connection.
//!
//! ```text
//! set <key> 0 <exptime> <bytes>\r\n<data>\r\n   -> STORED
//! get <key>\r\n                                 -> VALUE <key> <flags> <bytes>\r\n<data>\r\nEND | END
//! delete <key>\r\n                              -> DELETED | NOT_FOUND
//! version\r\n                                   -> VERSION <version>
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::info;

use super::{decode_payload, encode_payload, BackendKind, CacheBackend};
use crate::error::{CacheError, Result};

/// Longest key memcached accepts.
pub const MAX_MEMCACHED_KEY_LENGTH: usize = 250;

/// Relative expiry times above this are read by memcached as Unix timestamps.
const MAX_RELATIVE_EXPTIME: u64 = 60 * 60 * 24 * 30;

/// memcached parses exptime as a signed 32-bit integer.
const MAX_EXPTIME: u64 = i32::MAX as u64;

fn unavailable(err: impl std::fmt::Display) -> CacheError {
    CacheError::backend(BackendKind::Memcached, err)
}

/// Checks `key` against the memcached key rules: non-empty, at most
/// [`MAX_MEMCACHED_KEY_LENGTH`] bytes, no whitespace or control characters.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_MEMCACHED_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds memcached maximum length of {} bytes",
            MAX_MEMCACHED_KEY_LENGTH
        )));
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CacheError::InvalidRequest(
            "Key cannot contain whitespace or control characters".to_string(),
        ));
    }
    Ok(())
}

/// Converts a TTL to a memcached exptime, rounding up to whole seconds.
///
/// TTLs past the largest timestamp memcached accepts are clamped to it.
pub(crate) fn exptime(ttl: Duration) -> u64 {
    let secs = ttl
        .as_secs()
        .saturating_add(u64::from(ttl.subsec_nanos() > 0));
    if secs > MAX_RELATIVE_EXPTIME {
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        now.saturating_add(secs).min(MAX_EXPTIME)
    } else {
        secs
    }
}

// == Memcached Backend ==
type ConnectFuture<S> = Pin<Box<dyn Future<Output = std::io::Result<S>> + Send>>;
type Connector<S> = Box<dyn Fn() -> ConnectFuture<S> + Send + Sync>;

/// Memcached client over one stream.
///
/// The stream is checked out of `conn` for each exchange and only put back
/// once the reply has been read in full. An exchange that fails or is
/// cancelled midway leaves the slot empty, so stale replies are never read by
/// the next caller. An empty slot is refilled through `connector` when one is
/// available and reported as a backend error otherwise.
pub struct MemcachedBackend<S = TcpStream> {
    conn: Mutex<Option<BufReader<S>>>,
    connector: Option<Connector<S>>,
}

impl MemcachedBackend<TcpStream> {
    /// Connects to `addr` (e.g. `localhost:11211`) and verifies the server
    /// answers `version`.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(unavailable)?;

        let target = addr.to_string();
        let connector: Connector<TcpStream> =
            Box::new(move || -> ConnectFuture<TcpStream> {
                let target = target.clone();
                Box::pin(async move { TcpStream::connect(target).await })
            });
        let backend = Self {
            conn: Mutex::new(Some(BufReader::new(stream))),
            connector: Some(connector),
        };
        let version = backend.version().await?;

        info!(addr, %version, "connected to memcached");
        Ok(backend)
    }
}

impl<S> MemcachedBackend<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an already open stream. A broken exchange is not recovered.
    pub fn from_stream(stream: S) -> Self {
        Self {
            conn: Mutex::new(Some(BufReader::new(stream))),
            connector: None,
        }
    }

    /// Takes the stream out of `slot`, reconnecting if a previous exchange
    /// broke it.
    async fn checkout(&self, slot: &mut Option<BufReader<S>>) -> Result<BufReader<S>> {
        if let Some(conn) = slot.take() {
            return Ok(conn);
        }

        let connector = self
            .connector
            .as_ref()
            .ok_or_else(|| unavailable("connection lost after an incomplete exchange"))?;
        let stream = connector().await.map_err(unavailable)?;
        info!("reconnected to memcached");
        Ok(BufReader::new(stream))
    }

    /// Returns the server version string.
    pub async fn version(&self) -> Result<String> {
        let mut slot = self.conn.lock().await;
        let mut conn = self.checkout(&mut slot).await?;
        send(&mut conn, b"version\r\n").await?;

        let line = read_reply(&mut conn).await?;
        let version = line
            .strip_prefix("VERSION ")
            .map(str::to_string)
            .ok_or_else(|| unavailable(format!("unexpected reply: {}", line)))?;

        *slot = Some(conn);
        Ok(version)
    }

    async fn store(&self, key: &str, payload: &[u8], exptime: u64) -> Result<()> {
        let mut request = format!("set {} 0 {} {}\r\n", key, exptime, payload.len()).into_bytes();
        request.extend_from_slice(payload);
        request.extend_from_slice(b"\r\n");

        let mut slot = self.conn.lock().await;
        let mut conn = self.checkout(&mut slot).await?;
        send(&mut conn, &request).await?;

        match read_reply(&mut conn).await?.as_str() {
            "STORED" => {
                *slot = Some(conn);
                Ok(())
            }
            other => Err(unavailable(format!("unexpected reply: {}", other))),
        }
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut slot = self.conn.lock().await;
        let mut conn = self.checkout(&mut slot).await?;
        send(&mut conn, format!("get {}\r\n", key).as_bytes()).await?;

        let header = read_reply(&mut conn).await?;
        if header == "END" {
            *slot = Some(conn);
            return Ok(None);
        }

        // VALUE <key> <flags> <bytes>
        let fields: Vec<&str> = header
            .strip_prefix("VALUE ")
            .map(|rest| rest.split_whitespace().collect())
            .unwrap_or_default();
        if fields.first() != Some(&key) {
            return Err(unavailable(format!("reply does not match key {}: {}", key, header)));
        }
        let len = fields
            .get(2)
            .and_then(|bytes| bytes.parse::<usize>().ok())
            .ok_or_else(|| unavailable(format!("malformed reply: {}", header)))?;

        let mut data = vec![0u8; len + 2];
        conn.read_exact(&mut data).await.map_err(unavailable)?;
        if !data.ends_with(b"\r\n") {
            return Err(unavailable("data block not terminated by CRLF"));
        }
        data.truncate(len);

        match read_reply(&mut conn).await?.as_str() {
            "END" => {
                *slot = Some(conn);
                Ok(Some(data))
            }
            other => Err(unavailable(format!("unexpected reply: {}", other))),
        }
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let mut slot = self.conn.lock().await;
        let mut conn = self.checkout(&mut slot).await?;
        send(&mut conn, format!("delete {}\r\n", key).as_bytes()).await?;

        let removed = match read_reply(&mut conn).await?.as_str() {
            "DELETED" => true,
            "NOT_FOUND" => false,
            other => return Err(unavailable(format!("unexpected reply: {}", other))),
        };

        *slot = Some(conn);
        Ok(removed)
    }
}

async fn send<S>(conn: &mut BufReader<S>, request: &[u8]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    conn.write_all(request).await.map_err(unavailable)?;
    conn.flush().await.map_err(unavailable)
}

/// Reads one reply line without its CRLF, turning error replies into errors.
async fn read_reply<S>(conn: &mut BufReader<S>) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut line = String::new();
    let read = conn.read_line(&mut line).await.map_err(unavailable)?;
    if read == 0 {
        return Err(unavailable("connection closed"));
    }

    let line = line.trim_end_matches(['\r', '\n']).to_string();
    if line == "ERROR" || line.starts_with("CLIENT_ERROR") || line.starts_with("SERVER_ERROR") {
        return Err(unavailable(line));
    }
    Ok(line)
}

#[async_trait]
impl<V, S> CacheBackend<V> for MemcachedBackend<S>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn kind(&self) -> BackendKind {
        BackendKind::Memcached
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) -> Result<()> {
        validate_key(key)?;

        // exptime 0 means "never expires" to memcached
        if ttl.is_zero() {
            self.remove(key).await?;
            return Ok(());
        }

        let payload = encode_payload(&value)?;
        self.store(key, payload.as_bytes(), exptime(ttl)).await
    }

    async fn get(&self, key: &str) -> Result<V> {
        validate_key(key)?;

        let data = self
            .fetch(key)
            .await?
            .ok_or_else(|| CacheError::Miss(key.to_string()))?;
        let raw = String::from_utf8(data).map_err(|e| CacheError::Internal(e.to_string()))?;
        decode_payload(raw)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        if self.remove(key).await? {
            Ok(())
        } else {
            Err(CacheError::Miss(key.to_string()))
        }
    }

    /// Memcached cannot enumerate its keys; always empty.
    async fn get_all(&self) -> Result<HashMap<String, V>> {
        Ok(HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::io::{duplex, DuplexStream};
    use tokio::net::TcpListener;

    /// Backend whose server side has already queued `replies`.
    async fn scripted(replies: &str) -> (MemcachedBackend<DuplexStream>, DuplexStream) {
        let (client, mut server) = duplex(64 * 1024);
        server.write_all(replies.as_bytes()).await.unwrap();
        (MemcachedBackend::from_stream(client), server)
    }

    /// Everything the client wrote, once the backend is dropped.
    async fn requests(backend: MemcachedBackend<DuplexStream>, mut server: DuplexStream) -> String {
        drop(backend);
        let mut sent = String::new();
        server.read_to_string(&mut sent).await.unwrap();
        sent
    }

    #[test]
    fn test_exptime() {
        assert_eq!(exptime(Duration::from_millis(10)), 1);
        assert_eq!(exptime(Duration::from_secs(60)), 60);
        assert_eq!(exptime(Duration::from_millis(1500)), 2);

        let far = exptime(Duration::from_secs(MAX_RELATIVE_EXPTIME + 1));
        assert!(far > MAX_RELATIVE_EXPTIME * 10, "expected absolute timestamp, got {}", far);
    }

    #[test]
    fn test_exptime_clamps_huge_ttl() {
        assert_eq!(exptime(Duration::from_secs(u64::MAX)), MAX_EXPTIME);
        assert_eq!(exptime(Duration::MAX), MAX_EXPTIME);
    }

    #[tokio::test]
    async fn test_huge_ttl_is_stored_with_max_exptime() {
        let (backend, server) = scripted("STORED\r\n").await;

        CacheBackend::<Value>::set(&backend, "k1", json!(1), Duration::from_secs(u64::MAX))
            .await
            .unwrap();

        assert_eq!(
            requests(backend, server).await,
            format!("set k1 0 {} 1\r\n1\r\n", MAX_EXPTIME)
        );
    }

    #[tokio::test]
    async fn test_cancelled_get_does_not_leak_reply() {
        let (client, mut server) = duplex(1024);
        let backend = MemcachedBackend::from_stream(client);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            CacheBackend::<Value>::get(&backend, "k1"),
        )
        .await;
        assert!(cancelled.is_err());

        // The reply to the abandoned request arrives late; the write fails if
        // the client side is already gone
        let _ = server
            .write_all(b"VALUE k1 0 4\r\n\"v1\"\r\nEND\r\nEND\r\n")
            .await;

        let result: Result<Value> = backend.get("k2").await;
        assert!(matches!(
            result,
            Err(CacheError::Backend { backend: BackendKind::Memcached, .. })
        ));
    }

    #[tokio::test]
    async fn test_reply_for_other_key_is_rejected() {
        let (backend, _server) = scripted("VALUE k1 0 4\r\n\"v1\"\r\nEND\r\n").await;

        let result: Result<Value> = backend.get("k2").await;
        assert!(matches!(result, Err(CacheError::Backend { .. })));

        // The connection is not reused after the broken exchange
        let result: Result<Value> = backend.get("k1").await;
        assert!(matches!(result, Err(CacheError::Backend { .. })));
    }

    #[tokio::test]
    async fn test_reconnects_after_broken_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let mut buf = [0u8; 256];

            let (mut first, _) = listener.accept().await.unwrap();
            first.read(&mut buf).await.unwrap();
            first.write_all(b"VERSION 1.6.21\r\n").await.unwrap();
            first.read(&mut buf).await.unwrap();
            first.write_all(b"BOGUS\r\n").await.unwrap();

            let (mut second, _) = listener.accept().await.unwrap();
            let read = second.read(&mut buf).await.unwrap();
            second.write_all(b"END\r\n").await.unwrap();
            String::from_utf8_lossy(&buf[..read]).into_owned()
        });

        let backend = MemcachedBackend::connect(&addr).await.unwrap();

        let broken: Result<Value> = backend.get("k1").await;
        assert!(matches!(broken, Err(CacheError::Backend { .. })));

        let retried: Result<Value> = backend.get("k1").await;
        assert!(matches!(retried, Err(CacheError::Miss(_))));
        assert_eq!(server.await.unwrap(), "get k1\r\n");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("user:42").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("has space").is_err());
        assert!(validate_key("tab\tkey").is_err());
        assert!(validate_key(&"x".repeat(MAX_MEMCACHED_KEY_LENGTH + 1)).is_err());
    }

    #[tokio::test]
    async fn test_set_sends_set_command() {
        let (backend, server) = scripted("STORED\r\n").await;

        CacheBackend::<Value>::set(&backend, "k1", json!("v1"), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(requests(backend, server).await, "set k1 0 60 4\r\n\"v1\"\r\n");
    }

    #[tokio::test]
    async fn test_get_hit() {
        let (backend, server) = scripted("VALUE k1 0 4\r\n\"v1\"\r\nEND\r\n").await;

        let value: Value = backend.get("k1").await.unwrap();

        assert_eq!(value, json!("v1"));
        assert_eq!(requests(backend, server).await, "get k1\r\n");
    }

    #[tokio::test]
    async fn test_get_foreign_plain_value() {
        let (backend, _server) = scripted("VALUE k1 0 5\r\nhello\r\nEND\r\n").await;

        let value: String = backend.get("k1").await.unwrap();
        assert_eq!(value, "hello");
    }

    #[tokio::test]
    async fn test_get_miss() {
        let (backend, _server) = scripted("END\r\n").await;

        let result: Result<Value> = backend.get("absent").await;
        assert!(matches!(result, Err(CacheError::Miss(_))));
    }

    #[tokio::test]
    async fn test_delete_found_and_missing() {
        let (backend, server) = scripted("DELETED\r\nNOT_FOUND\r\n").await;

        CacheBackend::<Value>::delete(&backend, "k1").await.unwrap();
        let second = CacheBackend::<Value>::delete(&backend, "k1").await;

        assert!(matches!(second, Err(CacheError::Miss(_))));
        assert_eq!(requests(backend, server).await, "delete k1\r\ndelete k1\r\n");
    }

    #[tokio::test]
    async fn test_zero_ttl_deletes() {
        let (backend, server) = scripted("NOT_FOUND\r\n").await;

        CacheBackend::<Value>::set(&backend, "k1", json!(1), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(requests(backend, server).await, "delete k1\r\n");
    }

    #[tokio::test]
    async fn test_server_error_is_backend_error() {
        let (backend, _server) = scripted("SERVER_ERROR out of memory\r\n").await;

        let result = CacheBackend::<Value>::set(&backend, "k1", json!(1), Duration::from_secs(1)).await;
        assert!(matches!(
            result,
            Err(CacheError::Backend { backend: BackendKind::Memcached, .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_connection_is_backend_error() {
        let (client, server) = duplex(1024);
        drop(server);
        let backend = MemcachedBackend::from_stream(client);

        let result: Result<Value> = backend.get("k1").await;
        assert!(matches!(result, Err(CacheError::Backend { .. })));
    }

    #[tokio::test]
    async fn test_version() {
        let (backend, _server) = scripted("VERSION 1.6.21\r\n").await;
        assert_eq!(backend.version().await.unwrap(), "1.6.21");
    }

    #[tokio::test]
    async fn test_invalid_key_never_reaches_server() {
        let (backend, server) = scripted("").await;

        let result: Result<Value> = backend.get("bad key").await;

        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
        assert_eq!(requests(backend, server).await, "");
    }
}
