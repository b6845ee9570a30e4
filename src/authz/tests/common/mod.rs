//! Shared fixtures and test doubles

#![allow(dead_code)]

use async_trait::async_trait;
use console_authz::store::{GraphSnapshot, InMemoryGraphStore, PermissionGraphStore};
use console_authz::types::{ApiEndpoint, ApiStatus, Menu, Role, RoleId, UserId};
use console_authz::{
    AuthzError, Authorizer, CacheStore, PermissionCache, PermissionResolver, Result,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

pub const EDITOR: RoleId = 1;
pub const AUDITOR: RoleId = 2;
pub const NOBODY: RoleId = 3;

pub const ALICE: UserId = 100;
pub const BOB: UserId = 101;
pub const CAROL: UserId = 102;

/// A small console: widgets section, system section, a few endpoints
///
/// - Alice: editor + auditor
/// - Bob: auditor
/// - Carol: a role with no grants
pub fn console_graph() -> GraphSnapshot {
    GraphSnapshot::new()
        .with_role(Role::new(EDITOR, "editor"))
        .with_role(Role::new(AUDITOR, "auditor"))
        .with_role(Role::new(NOBODY, "nobody"))
        // Menus
        .with_menu(Menu::catalog(1, "Widgets").with_order(1))
        .with_menu(Menu::page(2, "Widget list").with_parent(1).with_path("/widgets"))
        .with_menu(Menu::button(3, "Delete widget", "widget:delete").with_parent(2))
        .with_menu(Menu::button(4, "Export widgets", "widget:export").with_parent(2))
        .with_menu(Menu::catalog(5, "System").with_order(2))
        .with_menu(Menu::page(6, "Audit log").with_parent(5).with_path("/audit"))
        .with_menu(Menu::page(7, "Retired").with_parent(5).with_status(false))
        // Endpoints
        .with_api(ApiEndpoint::new(10, "GET", "/widgets").with_permission_code("widget:list"))
        .with_api(
            ApiEndpoint::new(11, "DELETE", "/widgets/{id}").with_permission_code("widget:delete"),
        )
        .with_api(ApiEndpoint::new(12, "GET", "/audit").with_permission_code("audit:list"))
        .with_api(
            ApiEndpoint::new(13, "POST", "/widgets/import")
                .with_permission_code("widget:import")
                .with_status(ApiStatus::Deprecated),
        )
        .with_api(ApiEndpoint::new(14, "POST", "/auth/login").public())
        // Assignments
        .assign_role(ALICE, EDITOR)
        .assign_role(ALICE, AUDITOR)
        .assign_role(BOB, AUDITOR)
        .assign_role(CAROL, NOBODY)
        // Editor grants
        .grant_menu(EDITOR, 1)
        .grant_menu(EDITOR, 2)
        .grant_menu(EDITOR, 3)
        .grant_api(EDITOR, 10)
        .grant_api(EDITOR, 11)
        .grant_api(EDITOR, 13)
        // Auditor grants
        .grant_menu(AUDITOR, 5)
        .grant_menu(AUDITOR, 6)
        .grant_menu(AUDITOR, 7)
        .grant_api(AUDITOR, 10)
        .grant_api(AUDITOR, 12)
}

pub fn memory_cache() -> Arc<PermissionCache> {
    Arc::new(PermissionCache::in_memory(1_000, Duration::from_secs(300)))
}

pub fn resolver_over(store: Arc<dyn PermissionGraphStore>) -> PermissionResolver {
    PermissionResolver::new(store, memory_cache())
}

/// Authorizer over an in-memory graph; the store is returned for mutation
pub fn authorizer(snapshot: GraphSnapshot) -> (Authorizer, Arc<InMemoryGraphStore>) {
    let store = Arc::new(InMemoryGraphStore::from_snapshot(snapshot));
    let resolver = resolver_over(store.clone());
    (Authorizer::new(Arc::new(resolver)), store)
}

/// Store whose every read fails
pub struct UnavailableStore;

fn down<T>() -> Result<T> {
    Err(AuthzError::StoreUnavailable("connection refused".into()))
}

#[async_trait]
impl PermissionGraphStore for UnavailableStore {
    async fn roles_of(&self, _user_id: UserId) -> Result<Vec<Role>> {
        down()
    }

    async fn menus_of(&self, _role_id: RoleId) -> Result<Vec<Menu>> {
        down()
    }

    async fn apis_of(&self, _role_id: RoleId) -> Result<Vec<ApiEndpoint>> {
        down()
    }

    async fn all_active_menus(&self) -> Result<Vec<Menu>> {
        down()
    }

    async fn all_active_apis(&self) -> Result<Vec<ApiEndpoint>> {
        down()
    }

    async fn users_with_role(&self, _role_id: RoleId) -> Result<Vec<UserId>> {
        down()
    }
}

/// Wraps a store, counts `roles_of` calls and can be switched off
pub struct ObservedStore {
    inner: InMemoryGraphStore,
    pub role_lookups: AtomicUsize,
    pub available: AtomicBool,
    delay: Duration,
}

impl ObservedStore {
    pub fn new(snapshot: GraphSnapshot) -> Self {
        Self {
            inner: InMemoryGraphStore::from_snapshot(snapshot),
            role_lookups: AtomicUsize::new(0),
            available: AtomicBool::new(true),
            delay: Duration::ZERO,
        }
    }

    /// Slow every role lookup down, to widen race windows
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn lookups(&self) -> usize {
        self.role_lookups.load(Ordering::SeqCst)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn replace(&self, snapshot: GraphSnapshot) {
        self.inner.replace(snapshot).await;
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            down()
        }
    }
}

#[async_trait]
impl PermissionGraphStore for ObservedStore {
    async fn roles_of(&self, user_id: UserId) -> Result<Vec<Role>> {
        self.role_lookups.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.check()?;
        self.inner.roles_of(user_id).await
    }

    async fn menus_of(&self, role_id: RoleId) -> Result<Vec<Menu>> {
        self.check()?;
        self.inner.menus_of(role_id).await
    }

    async fn apis_of(&self, role_id: RoleId) -> Result<Vec<ApiEndpoint>> {
        self.check()?;
        self.inner.apis_of(role_id).await
    }

    async fn all_active_menus(&self) -> Result<Vec<Menu>> {
        self.check()?;
        self.inner.all_active_menus().await
    }

    async fn all_active_apis(&self) -> Result<Vec<ApiEndpoint>> {
        self.check()?;
        self.inner.all_active_apis().await
    }

    async fn users_with_role(&self, role_id: RoleId) -> Result<Vec<UserId>> {
        self.check()?;
        self.inner.users_with_role(role_id).await
    }
}

/// Store that can hold one `apis_of` call after it has read the graph
///
/// Lets a test mutate the graph and fire invalidation hooks while a
/// resolution is holding data read before the change.
pub struct GatedStore {
    inner: InMemoryGraphStore,
    armed: AtomicBool,
    paused: Notify,
    gate: Semaphore,
}

impl GatedStore {
    pub fn new(snapshot: GraphSnapshot) -> Self {
        Self {
            inner: InMemoryGraphStore::from_snapshot(snapshot),
            armed: AtomicBool::new(false),
            paused: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    pub fn graph(&self) -> &InMemoryGraphStore {
        &self.inner
    }

    /// Hold the next `apis_of` call
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Wait until the armed call has read the graph and is held
    pub async fn paused(&self) {
        self.paused.notified().await;
    }

    /// Let the held call return
    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl PermissionGraphStore for GatedStore {
    async fn roles_of(&self, user_id: UserId) -> Result<Vec<Role>> {
        self.inner.roles_of(user_id).await
    }

    async fn menus_of(&self, role_id: RoleId) -> Result<Vec<Menu>> {
        self.inner.menus_of(role_id).await
    }

    async fn apis_of(&self, role_id: RoleId) -> Result<Vec<ApiEndpoint>> {
        let apis = self.inner.apis_of(role_id).await;

        if self.armed.swap(false, Ordering::SeqCst) {
            self.paused.notify_one();
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }

        apis
    }

    async fn all_active_menus(&self) -> Result<Vec<Menu>> {
        self.inner.all_active_menus().await
    }

    async fn all_active_apis(&self) -> Result<Vec<ApiEndpoint>> {
        self.inner.all_active_apis().await
    }

    async fn users_with_role(&self, role_id: RoleId) -> Result<Vec<UserId>> {
        self.inner.users_with_role(role_id).await
    }
}

/// Cache backend that is never reachable
pub struct UnreachableCache;

#[async_trait]
impl CacheStore for UnreachableCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Err(AuthzError::CacheUnavailable("timed out".into()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<()> {
        Err(AuthzError::CacheUnavailable("timed out".into()))
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(AuthzError::CacheUnavailable("timed out".into()))
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<u64> {
        Err(AuthzError::CacheUnavailable("timed out".into()))
    }

    fn name(&self) -> &'static str {
        "unreachable"
    }
}
