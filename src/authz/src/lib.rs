//! # Console Authorization Engine
//!
//! Role-based authorization for the administrative console: decides which
//! navigation menus, UI buttons and backend operations a principal may use,
//! and keeps that decision fast while role assignments change under live
//! traffic.
//!
//! ## Features
//!
//! - **Explicit graph store**: set-valued queries, no lazy loading
//! - **Arena menu tree** with cycle and orphan detection
//! - **Cache-first resolution** with targeted invalidation and TTL fallback
//! - **Fail closed**: every internal error is a deny
//! - **Pluggable backends**: Postgres graph store, Redis cache
//!
//! ## Example
//!
//! ```rust
//! use console_authz::{Authorizer, Decision, PermissionCache, PermissionResolver, Principal};
//! use console_authz::store::{GraphSnapshot, InMemoryGraphStore};
//! use console_authz::types::{ApiEndpoint, Role};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let graph = GraphSnapshot::new()
//!         .with_role(Role::new(1, "editor"))
//!         .with_api(
//!             ApiEndpoint::new(10, "DELETE", "/widgets/{id}")
//!                 .with_permission_code("widget:delete"),
//!         )
//!         .assign_role(42, 1)
//!         .grant_api(1, 10);
//!
//!     let resolver = PermissionResolver::new(
//!         Arc::new(InMemoryGraphStore::from_snapshot(graph)),
//!         Arc::new(PermissionCache::in_memory(10_000, Duration::from_secs(300))),
//!     );
//!     let authorizer = Authorizer::new(Arc::new(resolver));
//!
//!     let decision = authorizer
//!         .authorize(&Principal::new(42), "DELETE", "/widgets/7")
//!         .await;
//!     assert_eq!(decision, Decision::Allow);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod presentation;
pub mod resolver;
pub mod store;
pub mod tree;
pub mod types;

// Re-export commonly used types
pub use cache::{BundleKey, CacheStats, CacheStore, InMemoryCacheStore, PermissionCache};
pub use config::AuthzConfig;
pub use engine::{AccessDecision, Authorizer, Decision, DecisionReason};
pub use error::{AuthzError, Result};
pub use presentation::{ButtonPolicy, ButtonState};
pub use resolver::{PermissionBundle, PermissionResolver};
pub use store::{GraphSnapshot, InMemoryGraphStore, PermissionGraphStore};
pub use tree::{MenuTree, TreeBuilder};
pub use types::{ApiEndpoint, Menu, MenuType, Principal, Role};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
