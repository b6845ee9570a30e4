//! Permission resolver
//!
//! Computes a principal's [`PermissionBundle`] from the permission graph,
//! cache-first. This is the single place where the superuser bypass and
//! the inactive-principal override are decided.
//!
//! # Rules
//!
//! 1. Inactive principals get the empty bundle, superuser or not
//! 2. Active superusers get every grantable menu and every active API code,
//!    without any role lookup
//! 3. Everyone else gets the set union over their roles, filtered to
//!    visible/enabled menus and active endpoints
//!
//! # Example
//!
//! ```rust,no_run
//! use console_authz::cache::PermissionCache;
//! use console_authz::resolver::PermissionResolver;
//! use console_authz::store::{GraphSnapshot, InMemoryGraphStore};
//! use console_authz::types::{ApiEndpoint, Principal, Role};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> console_authz::Result<()> {
//! let snapshot = GraphSnapshot::new()
//!     .with_role(Role::new(1, "editor"))
//!     .with_api(ApiEndpoint::new(10, "DELETE", "/widgets/{id}").with_permission_code("widget:delete"))
//!     .assign_role(42, 1)
//!     .grant_api(1, 10);
//!
//! let resolver = PermissionResolver::new(
//!     Arc::new(InMemoryGraphStore::from_snapshot(snapshot)),
//!     Arc::new(PermissionCache::in_memory(1_000, Duration::from_secs(300))),
//! );
//!
//! let bundle = resolver.resolve(&Principal::new(42)).await?;
//! assert!(bundle.has_api("widget:delete"));
//! # Ok(())
//! # }
//! ```

pub mod bundle;

pub use bundle::PermissionBundle;

use crate::cache::{BundleKey, PermissionCache};
use crate::error::Result;
use crate::store::PermissionGraphStore;
use crate::types::{ApiEndpoint, Menu, MenuId, Principal, RoleId, UserId};
use dashmap::DashMap;
use futures::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Cache-first permission resolver
pub struct PermissionResolver {
    store: Arc<dyn PermissionGraphStore>,
    cache: Arc<PermissionCache>,
    coalesce_misses: bool,
    /// Per-key locks for miss coalescing
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl PermissionResolver {
    /// Create a resolver with miss coalescing enabled
    pub fn new(store: Arc<dyn PermissionGraphStore>, cache: Arc<PermissionCache>) -> Self {
        Self {
            store,
            cache,
            coalesce_misses: true,
            inflight: DashMap::new(),
        }
    }

    /// Enable or disable miss coalescing
    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalesce_misses = enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn PermissionGraphStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    /// Resolve a principal's bundle, cache-first
    ///
    /// Returns `Err(StoreUnavailable)` when the graph store fails; callers
    /// must treat that as deny. Failed resolutions are never cached.
    pub async fn resolve(&self, principal: &Principal) -> Result<PermissionBundle> {
        if !principal.is_active {
            debug!(principal_id = principal.id, "Inactive principal, empty bundle");
            return Ok(PermissionBundle::empty());
        }

        let key = Self::bundle_key(principal);

        if let Some(bundle) = self.cache.get(key).await {
            return Ok(bundle);
        }

        if !self.coalesce_misses {
            return self.compute_and_store(principal, key).await;
        }

        let slot = key.cache_key();
        let lock = self
            .inflight
            .entry(slot.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;

            // Another request may have filled the slot while we waited
            match self.cache.get(key).await {
                Some(bundle) => Ok(bundle),
                None => self.compute_and_store(principal, key).await,
            }
        };

        // Only the map's own handle left means nobody else is waiting
        drop(lock);
        self.inflight
            .remove_if(&slot, |_, l| Arc::strong_count(l) <= 1);

        result
    }

    /// Resolve straight from the store, bypassing the cache entirely
    pub async fn resolve_uncached(&self, principal: &Principal) -> Result<PermissionBundle> {
        if !principal.is_active {
            return Ok(PermissionBundle::empty());
        }

        if principal.is_superuser {
            return self.resolve_superuser().await;
        }

        self.resolve_from_roles(principal.id).await
    }

    /// Active endpoint catalog, cache-first
    ///
    /// Repeat calls against an unchanged cache entry return the same `Arc`.
    pub async fn endpoint_catalog(&self) -> Result<Arc<Vec<ApiEndpoint>>> {
        if let Some(catalog) = self.cache.get_catalog().await {
            return Ok(catalog);
        }

        let epoch = self.cache.epoch();
        let catalog = Arc::new(self.store.all_active_apis().await?);
        self.cache.put_catalog(&catalog, epoch).await;

        debug!(endpoints = catalog.len(), "Loaded endpoint catalog");
        Ok(catalog)
    }

    // ========================================================================
    // Invalidation hooks
    // ========================================================================

    /// Drop one principal's cached bundle, the endpoint catalog and the
    /// superuser bundle
    pub async fn invalidate(&self, principal_id: UserId) {
        self.cache.invalidate(principal_id).await;
    }

    /// Drop every cached bundle and the endpoint catalog
    pub async fn invalidate_all(&self) {
        info!("Invalidating all cached permissions");
        self.cache.invalidate_all().await;
    }

    /// Drop the bundles of every principal holding `role_id`, plus the
    /// endpoint catalog and the superuser bundle
    ///
    /// Falls back to [`invalidate_all`](Self::invalidate_all) if the holders
    /// cannot be listed. Returns the number of principals invalidated, or
    /// `None` after a fallback.
    pub async fn invalidate_role(&self, role_id: RoleId) -> Option<usize> {
        match self.store.users_with_role(role_id).await {
            Ok(users) => {
                self.cache.invalidate_many(&users).await;
                debug!(role_id, principals = users.len(), "Invalidated role holders");
                Some(users.len())
            }
            Err(e) => {
                warn!(role_id, error = %e, "Cannot list role holders, invalidating everything");
                self.invalidate_all().await;
                None
            }
        }
    }

    /// Drop the endpoint catalog and the shared superuser bundle
    ///
    /// For edits to menu or endpoint rows. Role holders are not covered;
    /// pair with [`invalidate_role`](Self::invalidate_role) or
    /// [`invalidate_all`](Self::invalidate_all).
    pub async fn invalidate_catalog(&self) {
        self.cache.invalidate_catalog().await;
    }

    // ========================================================================
    // Computation
    // ========================================================================

    fn bundle_key(principal: &Principal) -> BundleKey {
        if principal.is_superuser {
            BundleKey::Superuser
        } else {
            BundleKey::Principal(principal.id)
        }
    }

    async fn compute_and_store(
        &self,
        principal: &Principal,
        key: BundleKey,
    ) -> Result<PermissionBundle> {
        // Captured before any store read
        let epoch = self.cache.epoch();

        let bundle = self.resolve_uncached(principal).await?;
        self.cache.put_if_current(key, &bundle, epoch).await;
        Ok(bundle)
    }

    async fn resolve_superuser(&self) -> Result<PermissionBundle> {
        let (menus, apis) = futures::try_join!(
            self.store.all_active_menus(),
            self.store.all_active_apis()
        )?;

        let bundle = assemble(menus, apis);
        debug!(
            menus = bundle.menu_tree.len(),
            apis = bundle.api_codes.len(),
            "Resolved superuser bundle"
        );
        Ok(bundle)
    }

    async fn resolve_from_roles(&self, principal_id: UserId) -> Result<PermissionBundle> {
        let roles = self.store.roles_of(principal_id).await?;
        if roles.is_empty() {
            debug!(principal_id, "Principal holds no roles");
            return Ok(PermissionBundle::empty());
        }

        let role_ids: BTreeSet<RoleId> = roles.iter().map(|r| r.id).collect();

        let menus = try_join_all(role_ids.iter().map(|id| self.store.menus_of(*id)));
        let apis = try_join_all(role_ids.iter().map(|id| self.store.apis_of(*id)));
        let (menus, apis) = futures::try_join!(menus, apis)?;

        let bundle = assemble(
            menus.into_iter().flatten(),
            apis.into_iter().flatten(),
        );

        debug!(
            principal_id,
            roles = role_ids.len(),
            menus = bundle.menu_tree.len(),
            buttons = bundle.button_codes.len(),
            apis = bundle.api_codes.len(),
            "Resolved bundle"
        );
        Ok(bundle)
    }
}

/// Union, filter and build; duplicates across roles collapse by id
fn assemble<M, A>(menus: M, apis: A) -> PermissionBundle
where
    M: IntoIterator<Item = Menu>,
    A: IntoIterator<Item = ApiEndpoint>,
{
    let menus: BTreeMap<MenuId, Menu> = menus
        .into_iter()
        .filter(Menu::is_grantable)
        .map(|m| (m.id, m))
        .collect();

    let api_codes: BTreeSet<String> = apis
        .into_iter()
        .filter(ApiEndpoint::is_active)
        .filter_map(|a| a.permission_code)
        .filter(|code| !code.is_empty())
        .collect();

    PermissionBundle::from_parts(menus.into_values(), api_codes)
}
