//! Short-lived key/value cache with per-entry TTL.
//!
//! The same cache backs credential lookups and quota counters. Values are raw
//! bytes; [`get_json`]/[`set_json`] and [`get_counter`]/[`set_counter`] layer
//! typed access on top.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::GatewayError;

/// Error types for cache operations
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Backend could not be reached
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// Value could not be encoded
    #[error("Cache serialization error: {0}")]
    Serialization(String),

    /// No room for a new key without dropping a live entry
    #[error("Cache full ({capacity} live entries)")]
    Full {
        /// Configured capacity
        capacity: usize,
    },
}

impl From<CacheError> for GatewayError {
    fn from(err: CacheError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// TTL cache contract
#[async_trait]
pub trait TtlCache: Send + Sync {
    /// Get a value, `None` if absent or expired
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Set a value that expires after `ttl`
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// Remove a value
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Read a JSON value. Undecodable entries are dropped and read as absent.
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn TtlCache,
    key: &str,
) -> CacheResult<Option<T>> {
    let Some(bytes) = cache.get(key).await? else {
        return Ok(None);
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(key = %key, error = %e, "Dropping undecodable cache entry");
            cache.delete(key).await?;
            Ok(None)
        }
    }
}

/// Write a JSON value
pub async fn set_json<T: Serialize + Sync>(
    cache: &dyn TtlCache,
    key: &str,
    value: &T,
    ttl: Duration,
) -> CacheResult<()> {
    let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
    cache.set(key, bytes, ttl).await
}

/// Read an integer counter; absent or garbled counters read as zero
pub async fn get_counter(cache: &dyn TtlCache, key: &str) -> CacheResult<u64> {
    Ok(cache
        .get(key)
        .await?
        .and_then(|bytes| std::str::from_utf8(&bytes).ok()?.trim().parse().ok())
        .unwrap_or(0))
}

/// Write an integer counter
pub async fn set_counter(
    cache: &dyn TtlCache,
    key: &str,
    value: u64,
    ttl: Duration,
) -> CacheResult<()> {
    cache.set(key, value.to_string().into_bytes(), ttl).await
}

#[derive(Debug)]
struct Entry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, Entry>,
    /// Earliest expiry seen by the last purge; no purge can free space before it
    next_purge: Option<Instant>,
}

impl Entries {
    /// Make space for one more key by dropping expired entries only
    fn make_room(&mut self, capacity: usize, now: Instant) -> bool {
        if self.map.len() < capacity {
            return true;
        }
        if self.next_purge.is_some_and(|at| now < at) {
            return false;
        }
        self.map.retain(|_, entry| !entry.is_expired(now));
        self.next_purge = self.map.values().map(|e| e.expires_at).min();
        self.map.len() < capacity
    }
}

/// In-memory TTL cache for single-instance deployments and tests.
///
/// Live entries are never evicted. Once `max_entries` live keys are held,
/// writes of new keys fail with [`CacheError::Full`] until something expires.
#[derive(Clone)]
pub struct MemoryTtlCache {
    entries: Arc<RwLock<Entries>>,
    max_entries: usize,
}

impl Default for MemoryTtlCache {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl MemoryTtlCache {
    /// Create a cache holding at most `max_entries` live entries
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Entries::default())),
            max_entries: max_entries.max(1),
        }
    }

    /// Number of stored entries, including ones not yet purged
    pub async fn len(&self) -> usize {
        self.entries.read().await.map.len()
    }

    /// Whether the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.map.is_empty()
    }
}

#[async_trait]
impl TtlCache for MemoryTtlCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.map.get(key) {
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.data.clone())),
                None => return Ok(None),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries.map.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.map.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if !entries.map.contains_key(key) && !entries.make_room(self.max_entries, now) {
            return Err(CacheError::Full {
                capacity: self.max_entries,
            });
        }
        entries.map.insert(
            key.to_string(),
            Entry {
                data: value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.write().await.map.remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
