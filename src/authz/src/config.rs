//! Engine configuration
//!
//! Loaded from TOML, then overridden from the environment:
//!
//! | Variable               | Field                |
//! |------------------------|----------------------|
//! | `AUTHZ_CACHE_TTL_SECS` | `cache.ttl_secs`     |
//! | `AUTHZ_CACHE_BACKEND`  | `cache.backend`      |
//! | `AUTHZ_BUTTON_POLICY`  | `ui.button_policy`   |
//! | `DATABASE_URL`         | `store.database_url` |
//! | `REDIS_URL`            | `cache.redis_url`    |

use crate::engine::PublicRoute;
use crate::error::{AuthzError, Result};
use crate::presentation::ButtonPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthzConfig {
    /// Routes allowed for everyone: `"METHOD /path"` or `"/path"`
    #[serde(default)]
    pub public_endpoints: Vec<String>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub ui: UiConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Permission cache backend kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Redis,
}

impl FromStr for CacheBackendKind {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheBackendKind::Memory),
            "redis" => Ok(CacheBackendKind::Redis),
            other => Err(AuthzError::Config(format!(
                "cache.backend must be 'memory' or 'redis', got '{}'",
                other
            ))),
        }
    }
}

/// `[cache]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackendKind,

    /// Bundle time-to-live; the safety net for missed invalidations
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Entry bound for the in-memory backend
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Coalesce concurrent misses for the same principal
    #[serde(default = "default_true")]
    pub coalesce_misses: bool,
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_capacity() -> usize {
    10_000
}

fn default_key_prefix() -> String {
    "authz:".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            ttl_secs: default_ttl_secs(),
            capacity: default_capacity(),
            redis_url: None,
            key_prefix: default_key_prefix(),
            coalesce_misses: true,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// `[store]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Postgres connection string; takes precedence over `snapshot_path`
    #[serde(default)]
    pub database_url: Option<String>,

    /// JSON-encoded graph snapshot
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            snapshot_path: None,
            max_connections: default_max_connections(),
        }
    }
}

/// `[ui]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default)]
    pub button_policy: ButtonPolicy,
}

/// `[server]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl AuthzConfig {
    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AuthzError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;

        debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&contents)
    }

    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| AuthzError::Config(e.to_string()))
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ttl) = lookup("AUTHZ_CACHE_TTL_SECS") {
            self.cache.ttl_secs = ttl.trim().parse().map_err(|_| {
                AuthzError::Config(format!("AUTHZ_CACHE_TTL_SECS is not a number: '{}'", ttl))
            })?;
        }

        if let Some(backend) = lookup("AUTHZ_CACHE_BACKEND") {
            self.cache.backend = backend.parse()?;
        }

        if let Some(policy) = lookup("AUTHZ_BUTTON_POLICY") {
            self.ui.button_policy = policy.parse()?;
        }

        if let Some(url) = lookup("DATABASE_URL") {
            self.store.database_url = Some(url);
        }

        if let Some(url) = lookup("REDIS_URL") {
            self.cache.redis_url = Some(url);
        }

        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl_secs == 0 {
            return Err(AuthzError::Config("cache.ttl_secs must be positive".into()));
        }

        if self.cache.capacity == 0 {
            return Err(AuthzError::Config("cache.capacity must be positive".into()));
        }

        if self.cache.backend == CacheBackendKind::Redis
            && self.cache.redis_url.as_deref().map_or(true, str::is_empty)
        {
            return Err(AuthzError::Config(
                "cache.redis_url is required for the redis backend".into(),
            ));
        }

        if self.store.max_connections == 0 {
            return Err(AuthzError::Config("store.max_connections must be positive".into()));
        }

        for entry in &self.public_endpoints {
            PublicRoute::parse(entry).map_err(|e| AuthzError::Config(e.to_string()))?;
        }

        Ok(())
    }
}
