//! Redis cache store

use super::backend::CacheStore;
use crate::error::{AuthzError, Result};
use ::redis::aio::ConnectionManager;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Default per-command timeout
const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Cache store backed by a shared Redis instance
///
/// All keys are namespaced under `key_prefix`. Every command is bounded by a
/// timeout so an unreachable server degrades to a miss instead of stalling
/// the authorization path.
///
/// Commands share one multiplexed [`ConnectionManager`], opened on first use
/// and reconnected by the manager after a drop. A failed first connect is
/// not remembered; the next command tries again.
pub struct RedisCacheStore {
    client: ::redis::Client,
    conn: OnceCell<ConnectionManager>,
    key_prefix: String,
    command_timeout: Duration,
}

impl RedisCacheStore {
    /// Open a client and verify connectivity with `PING`
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let store = Self::lazy(url, key_prefix)?;

        let mut conn = store.get_conn().await?;
        let _: String = store
            .bounded(::redis::cmd("PING").query_async(&mut conn))
            .await?;

        info!("Redis cache store connected to {}", url);
        Ok(store)
    }

    /// Open a client without connecting; failures surface on first use
    pub fn lazy(url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = ::redis::Client::open(url)
            .map_err(|e| AuthzError::Config(format!("invalid redis url: {}", e)))?;

        Ok(Self {
            client,
            conn: OnceCell::new(),
            key_prefix: key_prefix.into(),
            command_timeout: COMMAND_TIMEOUT,
        })
    }

    /// Override the per-command timeout
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Whether the shared connection has been established
    pub fn is_connected(&self) -> bool {
        self.conn.initialized()
    }

    /// Handle to the shared connection; clones are cheap
    async fn get_conn(&self) -> Result<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let conn = self
                    .bounded(ConnectionManager::new(self.client.clone()))
                    .await?;
                debug!("Opened shared redis connection");
                Ok::<_, AuthzError>(conn)
            })
            .await?;

        Ok(conn.clone())
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = ::redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => result.map_err(|e| AuthzError::CacheUnavailable(e.to_string())),
            Err(_) => Err(AuthzError::CacheUnavailable(format!(
                "redis command timed out after {:?}",
                self.command_timeout
            ))),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.get_conn().await?;
        let full_key = self.full_key(key);

        self.bounded(conn.get::<_, Option<Vec<u8>>>(&full_key)).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let full_key = self.full_key(key);

        // Redis expiry has one-second granularity
        let ttl_secs = ttl.as_secs().max(1);

        self.bounded(conn.set_ex::<_, _, ()>(&full_key, value, ttl_secs))
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let full_key = self.full_key(key);

        let deleted: i64 = self.bounded(conn.del(&full_key)).await?;
        Ok(deleted > 0)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut conn = self.get_conn().await?;

        let pattern = format!("{}{}*", self.key_prefix, prefix);
        let mut cursor: u64 = 0;
        let mut total_deleted = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = self
                .bounded(
                    ::redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(100)
                        .query_async(&mut conn),
                )
                .await?;

            if !keys.is_empty() {
                let deleted: i64 = self.bounded(conn.del(&keys)).await?;
                total_deleted += deleted as u64;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(total_deleted)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_rejected() {
        let result = RedisCacheStore::lazy("not a url", "authz:");
        assert!(matches!(result, Err(AuthzError::Config(_))));
    }

    #[test]
    fn test_keys_are_prefixed() {
        let store = RedisCacheStore::lazy("redis://127.0.0.1:6379", "authz:").unwrap();
        assert_eq!(store.full_key("bundle:user:1"), "authz:bundle:user:1");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_cache_unavailable() {
        // Port 1 is reserved and never serves redis
        let store = RedisCacheStore::lazy("redis://127.0.0.1:1", "authz:")
            .unwrap()
            .with_command_timeout(Duration::from_millis(500));

        let result = store.get("bundle:user:1").await;
        assert!(matches!(result, Err(AuthzError::CacheUnavailable(_))));
    }

    #[tokio::test]
    async fn test_failed_connect_is_retried() {
        let store = RedisCacheStore::lazy("redis://127.0.0.1:1", "authz:")
            .unwrap()
            .with_command_timeout(Duration::from_millis(300));

        for _ in 0..2 {
            let result = store.delete("bundle:user:1").await;
            assert!(matches!(result, Err(AuthzError::CacheUnavailable(_))));
            assert!(!store.is_connected());
        }
    }

    #[tokio::test]
    #[ignore = "needs a redis server on 127.0.0.1:6379"]
    async fn test_commands_share_one_connection() {
        let store = RedisCacheStore::connect("redis://127.0.0.1:6379", "authz-test:")
            .await
            .unwrap();
        assert!(store.is_connected());

        store
            .set("bundle:user:1", b"{}".to_vec(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(store.get("bundle:user:1").await.unwrap(), Some(b"{}".to_vec()));
        assert!(store.delete("bundle:user:1").await.unwrap());

        // Every command above ran on the connection opened by connect()
        let id_before: i64 = ::redis::cmd("CLIENT")
            .arg("ID")
            .query_async(&mut store.get_conn().await.unwrap())
            .await
            .unwrap();
        let id_after: i64 = ::redis::cmd("CLIENT")
            .arg("ID")
            .query_async(&mut store.get_conn().await.unwrap())
            .await
            .unwrap();
        assert_eq!(id_before, id_after);
    }
}
