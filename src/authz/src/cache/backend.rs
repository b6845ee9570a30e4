//! Cache store backends
//!
//! The permission cache talks to an external key-value service through
//! [`CacheStore`]. Values are opaque bytes with a per-entry TTL.

use crate::error::Result;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Key-value cache client
///
/// Must be safe for concurrent use by many simultaneous requests. Any `Err`
/// is treated by callers as "cache unavailable".
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a value; `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value with a time-to-live
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Remove a value; `true` if something was removed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every value whose key starts with `prefix`
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

#[derive(Clone)]
struct StoredEntry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Process-local LRU cache store
///
/// Bounded by entry count; expired entries are dropped lazily on read.
pub struct InMemoryCacheStore {
    cache: Arc<Mutex<LruCache<String, StoredEntry>>>,
}

impl InMemoryCacheStore {
    /// Create a store holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.lock().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut cache = self.cache.lock().await;

        match cache.get(key) {
            Some(entry) if entry.is_expired() => {
                cache.pop(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.data.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let entry = StoredEntry {
            data: value,
            expires_at: Instant::now() + ttl,
        };
        self.cache.lock().await.put(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.cache.lock().await.pop(key).is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut cache = self.cache.lock().await;

        let keys: Vec<String> = cache
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &keys {
            cache.pop(key);
        }

        Ok(keys.len() as u64)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
