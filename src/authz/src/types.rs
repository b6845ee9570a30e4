//! Core permission-graph types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique user (principal) identifier
pub type UserId = i64;

/// Unique role identifier
pub type RoleId = i64;

/// Unique menu identifier
pub type MenuId = i64;

/// Unique API endpoint identifier
pub type ApiId = i64;

/// An authenticated actor whose permissions are being resolved.
///
/// The flags come from the authentication layer; they are never looked up
/// by the authorization engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Principal identifier
    pub id: UserId,

    /// Superusers are granted every active permission without role lookup
    #[serde(default)]
    pub is_superuser: bool,

    /// Inactive principals resolve to an empty bundle, always
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Principal {
    /// Create an active, non-superuser principal
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            is_superuser: false,
            is_active: true,
        }
    }

    /// Create an active superuser principal
    pub fn superuser(id: UserId) -> Self {
        Self {
            id,
            is_superuser: true,
            is_active: true,
        }
    }

    /// Set the active flag
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// Set the superuser flag
    pub fn with_superuser(mut self, is_superuser: bool) -> Self {
        self.is_superuser = is_superuser;
        self
    }
}

/// Role: an indirection layer between principals and menus/endpoints
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
}

impl Role {
    pub fn new(id: RoleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Menu node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuType {
    /// Grouping node in the navigation tree
    Catalog,
    /// Navigable page
    Menu,
    /// UI control carrying a permission code
    Button,
}

impl fmt::Display for MenuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MenuType::Catalog => "catalog",
            MenuType::Menu => "menu",
            MenuType::Button => "button",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for MenuType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "catalog" => Ok(MenuType::Catalog),
            "menu" => Ok(MenuType::Menu),
            "button" => Ok(MenuType::Button),
            other => Err(format!("unknown menu type '{}'", other)),
        }
    }
}

/// Menu row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Menu {
    pub id: MenuId,

    #[serde(default)]
    pub parent_id: Option<MenuId>,

    pub name: String,

    #[serde(rename = "type")]
    pub menu_type: MenuType,

    /// Only meaningful for buttons
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_code: Option<String>,

    #[serde(default)]
    pub order_num: i32,

    #[serde(default = "default_true")]
    pub visible: bool,

    /// Enabled (`true`) or disabled
    #[serde(default = "default_true")]
    pub status: bool,

    /// Front-end route for catalog/menu nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Menu {
    /// Create an enabled, visible menu node
    pub fn new(id: MenuId, name: impl Into<String>, menu_type: MenuType) -> Self {
        Self {
            id,
            parent_id: None,
            name: name.into(),
            menu_type,
            permission_code: None,
            order_num: 0,
            visible: true,
            status: true,
            path: None,
            icon: None,
        }
    }

    /// Shorthand for a catalog node
    pub fn catalog(id: MenuId, name: impl Into<String>) -> Self {
        Self::new(id, name, MenuType::Catalog)
    }

    /// Shorthand for a page node
    pub fn page(id: MenuId, name: impl Into<String>) -> Self {
        Self::new(id, name, MenuType::Menu)
    }

    /// Shorthand for a button node with its permission code
    pub fn button(id: MenuId, name: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(id, name, MenuType::Button).with_permission_code(code)
    }

    pub fn with_parent(mut self, parent_id: MenuId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_order(mut self, order_num: i32) -> Self {
        self.order_num = order_num;
        self
    }

    pub fn with_permission_code(mut self, code: impl Into<String>) -> Self {
        self.permission_code = Some(code.into());
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_status(mut self, status: bool) -> Self {
        self.status = status;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Whether this node can be granted to anyone (visible and enabled)
    pub fn is_grantable(&self) -> bool {
        self.visible && self.status
    }

    pub fn is_button(&self) -> bool {
        self.menu_type == MenuType::Button
    }
}

/// API endpoint lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Active,
    Deprecated,
}

/// API endpoint row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub id: ApiId,

    /// HTTP method (`GET`, `POST`, ...)
    pub method: String,

    /// Path template, e.g. `/widgets/{id}`
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_code: Option<String>,

    pub status: ApiStatus,

    /// Public endpoints are allowed without consulting any bundle
    #[serde(default)]
    pub is_public: bool,
}

impl ApiEndpoint {
    /// Create an active, non-public endpoint
    pub fn new(id: ApiId, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id,
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            permission_code: None,
            status: ApiStatus::Active,
            is_public: false,
        }
    }

    pub fn with_permission_code(mut self, code: impl Into<String>) -> Self {
        self.permission_code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: ApiStatus) -> Self {
        self.status = status;
        self
    }

    pub fn public(mut self) -> Self {
        self.is_public = true;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == ApiStatus::Active
    }
}

/// `UserRole(userId, roleId)` association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserRole {
    pub user_id: UserId,
    pub role_id: RoleId,
}

/// `RoleMenu(roleId, menuId)` association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleMenu {
    pub role_id: RoleId,
    pub menu_id: MenuId,
}

/// `RoleApi(roleId, apiId)` association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleApi {
    pub role_id: RoleId,
    pub api_id: ApiId,
}
