//! Permission graph storage
//!
//! Read-only access to users' roles, menus, API endpoints and the three
//! association tables. Mutation happens elsewhere (administrative CRUD);
//! whoever writes must call the resolver's invalidation hooks afterwards.

use crate::error::Result;
use crate::types::{
    ApiEndpoint, ApiId, Menu, MenuId, Role, RoleApi, RoleId, RoleMenu, UserId, UserRole,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresGraphStore;

/// Permission graph store trait
///
/// Every call returns an owned snapshot; there is no lazy loading behind
/// the returned values. Result order is unspecified and callers must not
/// rely on it. An `Err` means the store could not be reached and the caller
/// must fail closed.
#[async_trait]
pub trait PermissionGraphStore: Send + Sync {
    /// Roles assigned to a user
    async fn roles_of(&self, user_id: UserId) -> Result<Vec<Role>>;

    /// Menus granted to a role (any status)
    async fn menus_of(&self, role_id: RoleId) -> Result<Vec<Menu>>;

    /// API endpoints granted to a role (any status)
    async fn apis_of(&self, role_id: RoleId) -> Result<Vec<ApiEndpoint>>;

    /// Every enabled menu
    async fn all_active_menus(&self) -> Result<Vec<Menu>>;

    /// Every active API endpoint
    async fn all_active_apis(&self) -> Result<Vec<ApiEndpoint>>;

    /// Users holding a role, for targeted invalidation
    async fn users_with_role(&self, role_id: RoleId) -> Result<Vec<UserId>>;
}

/// Serializable copy of the whole permission graph
///
/// Used to seed [`InMemoryGraphStore`] from a JSON file, and by tests to
/// build fixtures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub roles: Vec<Role>,

    #[serde(default)]
    pub menus: Vec<Menu>,

    #[serde(default)]
    pub apis: Vec<ApiEndpoint>,

    #[serde(default)]
    pub user_roles: BTreeSet<UserRole>,

    #[serde(default)]
    pub role_menus: BTreeSet<RoleMenu>,

    #[serde(default)]
    pub role_apis: BTreeSet<RoleApi>,
}

impl GraphSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a role row
    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.retain(|r| r.id != role.id);
        self.roles.push(role);
        self
    }

    /// Add or replace a menu row
    pub fn with_menu(mut self, menu: Menu) -> Self {
        self.upsert_menu(menu);
        self
    }

    /// Add or replace an API endpoint row
    pub fn with_api(mut self, api: ApiEndpoint) -> Self {
        self.upsert_api(api);
        self
    }

    pub fn assign_role(mut self, user_id: UserId, role_id: RoleId) -> Self {
        self.user_roles.insert(UserRole { user_id, role_id });
        self
    }

    pub fn grant_menu(mut self, role_id: RoleId, menu_id: MenuId) -> Self {
        self.role_menus.insert(RoleMenu { role_id, menu_id });
        self
    }

    pub fn grant_api(mut self, role_id: RoleId, api_id: ApiId) -> Self {
        self.role_apis.insert(RoleApi { role_id, api_id });
        self
    }

    pub fn upsert_menu(&mut self, menu: Menu) {
        self.menus.retain(|m| m.id != menu.id);
        self.menus.push(menu);
    }

    pub fn upsert_api(&mut self, api: ApiEndpoint) {
        self.apis.retain(|a| a.id != api.id);
        self.apis.push(api);
    }

    pub fn unassign_role(&mut self, user_id: UserId, role_id: RoleId) -> bool {
        self.user_roles.remove(&UserRole { user_id, role_id })
    }

    pub fn revoke_menu(&mut self, role_id: RoleId, menu_id: MenuId) -> bool {
        self.role_menus.remove(&RoleMenu { role_id, menu_id })
    }

    pub fn revoke_api(&mut self, role_id: RoleId, api_id: ApiId) -> bool {
        self.role_apis.remove(&RoleApi { role_id, api_id })
    }

    pub fn menu_mut(&mut self, id: MenuId) -> Option<&mut Menu> {
        self.menus.iter_mut().find(|m| m.id == id)
    }

    pub fn api_mut(&mut self, id: ApiId) -> Option<&mut ApiEndpoint> {
        self.apis.iter_mut().find(|a| a.id == id)
    }

    fn roles_of(&self, user_id: UserId) -> Vec<Role> {
        let role_ids: BTreeSet<RoleId> = self
            .user_roles
            .iter()
            .filter(|ur| ur.user_id == user_id)
            .map(|ur| ur.role_id)
            .collect();

        self.roles
            .iter()
            .filter(|r| role_ids.contains(&r.id))
            .cloned()
            .collect()
    }

    fn menus_of(&self, role_id: RoleId) -> Vec<Menu> {
        let menu_ids: BTreeSet<MenuId> = self
            .role_menus
            .iter()
            .filter(|rm| rm.role_id == role_id)
            .map(|rm| rm.menu_id)
            .collect();

        self.menus
            .iter()
            .filter(|m| menu_ids.contains(&m.id))
            .cloned()
            .collect()
    }

    fn apis_of(&self, role_id: RoleId) -> Vec<ApiEndpoint> {
        let api_ids: BTreeSet<ApiId> = self
            .role_apis
            .iter()
            .filter(|ra| ra.role_id == role_id)
            .map(|ra| ra.api_id)
            .collect();

        self.apis
            .iter()
            .filter(|a| api_ids.contains(&a.id))
            .cloned()
            .collect()
    }

    fn users_with_role(&self, role_id: RoleId) -> Vec<UserId> {
        self.user_roles
            .iter()
            .filter(|ur| ur.role_id == role_id)
            .map(|ur| ur.user_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// In-memory permission graph store
pub struct InMemoryGraphStore {
    snapshot: Arc<RwLock<GraphSnapshot>>,
}

impl InMemoryGraphStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::from_snapshot(GraphSnapshot::default())
    }

    /// Create a store serving the given snapshot
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(snapshot)),
        }
    }

    /// Load a JSON-encoded [`GraphSnapshot`]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let snapshot: GraphSnapshot = serde_json::from_str(&contents)?;

        info!(
            "Loaded permission graph snapshot: {} roles, {} menus, {} apis",
            snapshot.roles.len(),
            snapshot.menus.len(),
            snapshot.apis.len()
        );

        Ok(Self::from_snapshot(snapshot))
    }

    /// Swap in a new snapshot
    pub async fn replace(&self, snapshot: GraphSnapshot) {
        *self.snapshot.write().await = snapshot;
    }

    /// Mutate the snapshot in place
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut GraphSnapshot),
    {
        let mut snapshot = self.snapshot.write().await;
        f(&mut snapshot);
    }

    /// Copy of the current snapshot
    pub async fn snapshot(&self) -> GraphSnapshot {
        self.snapshot.read().await.clone()
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PermissionGraphStore for InMemoryGraphStore {
    async fn roles_of(&self, user_id: UserId) -> Result<Vec<Role>> {
        Ok(self.snapshot.read().await.roles_of(user_id))
    }

    async fn menus_of(&self, role_id: RoleId) -> Result<Vec<Menu>> {
        Ok(self.snapshot.read().await.menus_of(role_id))
    }

    async fn apis_of(&self, role_id: RoleId) -> Result<Vec<ApiEndpoint>> {
        Ok(self.snapshot.read().await.apis_of(role_id))
    }

    async fn all_active_menus(&self) -> Result<Vec<Menu>> {
        let snapshot = self.snapshot.read().await;
        Ok(snapshot.menus.iter().filter(|m| m.status).cloned().collect())
    }

    async fn all_active_apis(&self) -> Result<Vec<ApiEndpoint>> {
        let snapshot = self.snapshot.read().await;
        Ok(snapshot.apis.iter().filter(|a| a.is_active()).cloned().collect())
    }

    async fn users_with_role(&self, role_id: RoleId) -> Result<Vec<UserId>> {
        Ok(self.snapshot.read().await.users_with_role(role_id))
    }
}
