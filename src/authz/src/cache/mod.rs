//! Permission bundle cache
//!
//! Typed wrapper over an external key-value [`CacheStore`]. Stores resolved
//! [`PermissionBundle`]s per principal and the active endpoint catalog.
//!
//! The backend is never load-bearing: a failing or unreachable store makes
//! every operation behave as a miss, so callers fall back to live
//! computation and only latency suffers.
//!
//! # Invalidation epoch
//!
//! Every invalidation bumps a process-wide epoch before deleting anything.
//! Writers capture the epoch before reading the graph store and hand it to
//! [`PermissionCache::put_if_current`]; a write whose epoch is stale is
//! skipped, or deleted again if the invalidation landed mid-write. A
//! computation that raced an invalidation therefore never outlives it.

pub mod backend;

#[cfg(feature = "redis")]
pub mod redis_store;

pub use backend::{CacheStore, InMemoryCacheStore};

#[cfg(feature = "redis")]
pub use redis_store::RedisCacheStore;

use crate::config::{CacheBackendKind, CacheConfig};
use crate::error::{AuthzError, Result};
use crate::resolver::PermissionBundle;
use crate::types::{ApiEndpoint, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Key under which the active endpoint catalog is cached
pub const CATALOG_KEY: &str = "catalog:endpoints";

/// Prefix shared by every bundle key
pub const BUNDLE_PREFIX: &str = "bundle:";

/// Cache slot for a resolved bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleKey {
    /// Role-derived bundle of one principal
    Principal(UserId),
    /// Bundle shared by every active superuser
    Superuser,
}

impl BundleKey {
    /// Storage key in the cache backend
    pub fn cache_key(&self) -> String {
        match self {
            BundleKey::Principal(id) => format!("{}user:{}", BUNDLE_PREFIX, id),
            BundleKey::Superuser => format!("{}superuser", BUNDLE_PREFIX),
        }
    }
}

impl From<UserId> for BundleKey {
    fn from(id: UserId) -> Self {
        BundleKey::Principal(id)
    }
}

impl fmt::Display for BundleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Backend failures and undecodable entries
    pub errors: u64,
    pub puts: u64,
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    puts: AtomicU64,
    invalidations: AtomicU64,
}

/// Last decoded catalog, keyed by the digest of its encoded form
struct CatalogMemo {
    digest: blake3::Hash,
    endpoints: Arc<Vec<ApiEndpoint>>,
}

/// Consistency-aware cache of permission bundles
pub struct PermissionCache {
    backend: Arc<dyn CacheStore>,
    ttl: Duration,
    counters: Counters,
    /// Bumped by every invalidation
    epoch: AtomicU64,
    catalog_memo: RwLock<Option<CatalogMemo>>,
}

impl PermissionCache {
    /// Wrap a backend with a default entry TTL
    pub fn new(backend: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            counters: Counters::default(),
            epoch: AtomicU64::new(0),
            catalog_memo: RwLock::new(None),
        }
    }

    /// Process-local cache with `capacity` entries
    pub fn in_memory(capacity: usize, ttl: Duration) -> Self {
        Self::new(Arc::new(InMemoryCacheStore::new(capacity)), ttl)
    }

    /// Build the configured backend
    ///
    /// An unreachable Redis server at startup is logged and tolerated; the
    /// cache then misses until the server comes back.
    pub async fn from_config(config: &CacheConfig) -> Result<Self> {
        let ttl = Duration::from_secs(config.ttl_secs);

        match config.backend {
            CacheBackendKind::Memory => Ok(Self::in_memory(config.capacity, ttl)),
            #[cfg(feature = "redis")]
            CacheBackendKind::Redis => {
                let url = config.redis_url.as_deref().ok_or_else(|| {
                    AuthzError::Config("cache.redis_url is required for the redis backend".into())
                })?;

                let store = match RedisCacheStore::connect(url, config.key_prefix.clone()).await {
                    Ok(store) => store,
                    Err(e) => {
                        warn!(error = %e, "Redis unreachable at startup, continuing with misses");
                        RedisCacheStore::lazy(url, config.key_prefix.clone())?
                    }
                };

                Ok(Self::new(Arc::new(store), ttl))
            }
            #[cfg(not(feature = "redis"))]
            CacheBackendKind::Redis => Err(AuthzError::Config(
                "redis cache backend requires the `redis` feature".into(),
            )),
        }
    }

    /// Default entry TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Backend name, for logs and health output
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Cached bundle, or `None` on miss or backend failure
    pub async fn get(&self, key: impl Into<BundleKey>) -> Option<PermissionBundle> {
        let key = key.into();
        self.get_json(&key.cache_key()).await
    }

    /// Store a bundle; `ttl` of `None` uses the default
    pub async fn put(
        &self,
        key: impl Into<BundleKey>,
        bundle: &PermissionBundle,
        ttl: Option<Duration>,
    ) {
        let key = key.into();
        self.put_json(&key.cache_key(), bundle, ttl).await;
    }

    /// Current invalidation epoch
    ///
    /// Capture it before reading the graph store and pass it to
    /// [`put_if_current`](Self::put_if_current).
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Store a bundle computed at `epoch`, unless an invalidation has
    /// happened since
    ///
    /// Returns whether the entry is in place afterwards.
    pub async fn put_if_current(
        &self,
        key: impl Into<BundleKey>,
        bundle: &PermissionBundle,
        epoch: u64,
    ) -> bool {
        let key = key.into();
        let cache_key = key.cache_key();

        match serde_json::to_vec(bundle) {
            Ok(bytes) => self.store_if_current(&cache_key, bytes, epoch).await,
            Err(e) => {
                self.record_error("encode", &cache_key, &AuthzError::from(e));
                false
            }
        }
    }

    /// Drop the cached bundle of one principal
    ///
    /// The endpoint catalog and the superuser bundle go with it: the hook
    /// fires for endpoint edits too, and both are derived from rows any
    /// edit may have touched.
    pub async fn invalidate(&self, principal_id: UserId) {
        self.bump_epoch();

        self.delete_key(&BundleKey::Principal(principal_id).cache_key())
            .await;
        self.delete_shared().await;
    }

    /// Drop several principals' bundles plus the shared entries
    pub async fn invalidate_many(&self, principal_ids: &[UserId]) {
        self.bump_epoch();

        for id in principal_ids {
            self.delete_key(&BundleKey::Principal(*id).cache_key()).await;
        }
        self.delete_shared().await;
    }

    /// Drop every bundle and the endpoint catalog
    pub async fn invalidate_all(&self) {
        self.bump_epoch();
        self.clear_catalog_memo().await;

        for prefix in [BUNDLE_PREFIX, CATALOG_KEY] {
            match self.backend.delete_prefix(prefix).await {
                Ok(removed) => debug!(prefix, removed, "Invalidated cache prefix"),
                Err(e) => self.record_error("delete_prefix", prefix, &e),
            }
        }
    }

    /// Cached endpoint catalog
    ///
    /// Decoding is skipped while the stored bytes are unchanged, so repeat
    /// calls hand back the same `Arc`.
    pub async fn get_catalog(&self) -> Option<Arc<Vec<ApiEndpoint>>> {
        let bytes = self.get_bytes(CATALOG_KEY).await?;
        let digest = blake3::hash(&bytes);

        if let Some(memo) = self.catalog_memo.read().await.as_ref() {
            if memo.digest == digest {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(Arc::clone(&memo.endpoints));
            }
        }

        let endpoints: Vec<ApiEndpoint> = self.decode(CATALOG_KEY, &bytes)?;
        let endpoints = Arc::new(endpoints);

        *self.catalog_memo.write().await = Some(CatalogMemo {
            digest,
            endpoints: Arc::clone(&endpoints),
        });
        Some(endpoints)
    }

    /// Store an endpoint catalog read at `epoch`, with the default TTL
    pub async fn put_catalog(&self, endpoints: &Arc<Vec<ApiEndpoint>>, epoch: u64) -> bool {
        let bytes = match serde_json::to_vec(endpoints.as_ref()) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.record_error("encode", CATALOG_KEY, &AuthzError::from(e));
                return false;
            }
        };
        let digest = blake3::hash(&bytes);

        if !self.store_if_current(CATALOG_KEY, bytes, epoch).await {
            return false;
        }

        *self.catalog_memo.write().await = Some(CatalogMemo {
            digest,
            endpoints: Arc::clone(endpoints),
        });
        true
    }

    /// Drop the endpoint catalog and the superuser bundle derived from it
    pub async fn invalidate_catalog(&self) {
        self.bump_epoch();
        self.delete_shared().await;
    }

    /// Statistics snapshot
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            puts: self.counters.puts.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get_bytes(key).await?;
        self.decode(key, &bytes)
    }

    /// Raw entry; backend failures and absent keys count as misses
    async fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        match self.backend.get(key).await {
            Ok(Some(bytes)) => Some(bytes),
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.record_error("get", key, &e);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> Option<T> {
        match serde_json::from_slice(bytes) {
            Ok(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(e) => {
                // Undecodable entries (e.g. written by an older build) are misses
                self.record_error("decode", key, &AuthzError::from(e));
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.record_error("encode", key, &AuthzError::from(e));
                return;
            }
        };

        match self.backend.set(key, bytes, ttl.unwrap_or(self.ttl)).await {
            Ok(()) => {
                self.counters.puts.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.record_error("set", key, &e),
        }
    }

    /// Write `bytes` unless the epoch moved past `epoch`
    ///
    /// Invalidations bump the epoch before deleting, so a write that lands
    /// after their delete is caught by the second check and removed.
    async fn store_if_current(&self, key: &str, bytes: Vec<u8>, epoch: u64) -> bool {
        if self.epoch() != epoch {
            debug!(key, epoch, "Skipping cache write, invalidated during computation");
            return false;
        }

        if let Err(e) = self.backend.set(key, bytes, self.ttl).await {
            self.record_error("set", key, &e);
            return false;
        }

        if self.epoch() != epoch {
            debug!(key, epoch, "Invalidated during cache write, dropping entry");
            self.delete_key(key).await;
            return false;
        }

        self.counters.puts.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    async fn delete_key(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            self.record_error("delete", key, &e);
        } else {
            debug!(key, "Invalidated cache entry");
        }
    }

    /// Catalog and superuser bundle
    async fn delete_shared(&self) {
        self.clear_catalog_memo().await;
        self.delete_key(CATALOG_KEY).await;
        self.delete_key(&BundleKey::Superuser.cache_key()).await;
    }

    async fn clear_catalog_memo(&self) {
        *self.catalog_memo.write().await = None;
    }

    fn record_error(&self, op: &str, key: &str, error: &AuthzError) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        warn!(
            backend = self.backend.name(),
            op,
            key,
            error = %error,
            "Cache operation failed, treating as miss"
        );
    }
}
