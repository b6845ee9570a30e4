//! Menu tree type definitions

use crate::error::{AuthzError, Result};
use crate::types::{Menu, MenuId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Structural problem found while attaching a menu to its parent
///
/// Every issue leaves the offending node in the tree, promoted to a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuralIssue {
    /// Node declares itself as its parent
    SelfParent { menu_id: MenuId },

    /// Attaching the node would close a loop; `path` starts and ends with it
    Cycle { menu_id: MenuId, path: Vec<MenuId> },

    /// Declared parent is not part of the input set (e.g. disabled or not granted)
    MissingParent { menu_id: MenuId, parent_id: MenuId },

    /// Declared parent is a button; buttons are always leaves
    ButtonParent { menu_id: MenuId, parent_id: MenuId },
}

impl StructuralIssue {
    /// Node the issue was reported for
    pub fn menu_id(&self) -> MenuId {
        match self {
            StructuralIssue::SelfParent { menu_id }
            | StructuralIssue::Cycle { menu_id, .. }
            | StructuralIssue::MissingParent { menu_id, .. }
            | StructuralIssue::ButtonParent { menu_id, .. } => *menu_id,
        }
    }

    /// Whether the issue breaks the forest invariant of the stored data.
    ///
    /// A missing parent is not one: partial grants routinely omit ancestors.
    pub fn is_inconsistency(&self) -> bool {
        !matches!(self, StructuralIssue::MissingParent { .. })
    }
}

impl fmt::Display for StructuralIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralIssue::SelfParent { menu_id } => {
                write!(f, "menu {} is its own parent", menu_id)
            }
            StructuralIssue::Cycle { path, .. } => {
                let path: Vec<String> = path.iter().map(|id| id.to_string()).collect();
                write!(f, "menu cycle {}", path.join(" -> "))
            }
            StructuralIssue::MissingParent { menu_id, parent_id } => {
                write!(f, "menu {} has absent parent {}", menu_id, parent_id)
            }
            StructuralIssue::ButtonParent { menu_id, parent_id } => {
                write!(f, "menu {} is attached under button {}", menu_id, parent_id)
            }
        }
    }
}

/// Arena slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TreeNode {
    pub(crate) menu: Menu,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
}

/// Menu forest stored as an arena indexed by menu id
///
/// Siblings (and roots) are ordered by `order_num`, then `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuTree {
    pub(crate) nodes: Vec<TreeNode>,
    pub(crate) index: BTreeMap<MenuId, usize>,
    pub(crate) roots: Vec<usize>,
    pub(crate) issues: Vec<StructuralIssue>,
}

/// Nested, serializable view of a subtree for UI rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuView {
    #[serde(flatten)]
    pub menu: Menu,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MenuView>,
}

impl MenuTree {
    /// Empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root menus in display order
    pub fn roots(&self) -> impl Iterator<Item = &Menu> + '_ {
        self.roots.iter().map(move |&idx| &self.nodes[idx].menu)
    }

    /// Look up a node
    pub fn get(&self, id: MenuId) -> Option<&Menu> {
        self.index.get(&id).map(|&idx| &self.nodes[idx].menu)
    }

    pub fn contains(&self, id: MenuId) -> bool {
        self.index.contains_key(&id)
    }

    /// Attached parent (not necessarily the declared one)
    pub fn parent_of(&self, id: MenuId) -> Option<&Menu> {
        let idx = *self.index.get(&id)?;
        self.nodes[idx].parent.map(|p| &self.nodes[p].menu)
    }

    /// Children in display order
    pub fn children(&self, id: MenuId) -> Vec<&Menu> {
        match self.index.get(&id) {
            Some(&idx) => self.nodes[idx]
                .children
                .iter()
                .map(|&c| &self.nodes[c].menu)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Ancestor ids, nearest first
    pub fn ancestors(&self, id: MenuId) -> Vec<MenuId> {
        let mut out = Vec::new();
        let Some(&start) = self.index.get(&id) else {
            return out;
        };

        let mut current = self.nodes[start].parent;
        while let Some(idx) = current {
            out.push(self.nodes[idx].menu.id);
            current = self.nodes[idx].parent;
        }
        out
    }

    /// All menu ids in the tree
    pub fn menu_ids(&self) -> BTreeSet<MenuId> {
        self.index.keys().copied().collect()
    }

    /// All menus, in build order
    pub fn menus(&self) -> impl Iterator<Item = &Menu> + '_ {
        self.nodes.iter().map(|n| &n.menu)
    }

    /// Issues recorded while building
    pub fn issues(&self) -> &[StructuralIssue] {
        &self.issues
    }

    /// Fails with `StructuralInconsistency` if a cycle or invalid parent was found
    pub fn check(&self) -> Result<()> {
        let problems: Vec<String> = self
            .issues
            .iter()
            .filter(|i| i.is_inconsistency())
            .map(|i| i.to_string())
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AuthzError::StructuralInconsistency(problems.join("; ")))
        }
    }

    /// Full nested view, buttons included as leaves
    pub fn to_nested(&self) -> Vec<MenuView> {
        self.roots.iter().map(|&idx| self.view(idx, true)).collect()
    }

    /// Navigation view: catalog and menu nodes only
    pub fn navigation(&self) -> Vec<MenuView> {
        self.roots
            .iter()
            .filter(|&&idx| !self.nodes[idx].menu.is_button())
            .map(|&idx| self.view(idx, false))
            .collect()
    }

    fn view(&self, idx: usize, with_buttons: bool) -> MenuView {
        let node = &self.nodes[idx];
        let children = node
            .children
            .iter()
            .filter(|&&c| with_buttons || !self.nodes[c].menu.is_button())
            .map(|&c| self.view(c, with_buttons))
            .collect();

        MenuView {
            menu: node.menu.clone(),
            children,
        }
    }
}
