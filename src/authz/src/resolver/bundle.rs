//! Resolved permission bundle

use crate::tree::{MenuTree, TreeBuilder};
use crate::types::Menu;
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Everything a principal may see and call
///
/// A computed value: never persisted, owned by the cache and rebuilt after
/// invalidation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionBundle {
    /// Navigation tree; button nodes remain as leaves
    pub menu_tree: MenuTree,

    /// Permission codes of granted buttons
    pub button_codes: BTreeSet<String>,

    /// Permission codes of granted API endpoints
    pub api_codes: BTreeSet<String>,
}

impl PermissionBundle {
    /// The "no access" bundle
    pub fn empty() -> Self {
        Self::default()
    }

    /// Assemble a bundle from already-filtered menus and API codes
    pub fn from_parts<I>(menus: I, api_codes: BTreeSet<String>) -> Self
    where
        I: IntoIterator<Item = Menu>,
    {
        let menus: Vec<Menu> = menus.into_iter().collect();

        let button_codes = menus
            .iter()
            .filter(|m| m.is_button())
            .filter_map(|m| m.permission_code.clone())
            .filter(|code| !code.is_empty())
            .collect();

        Self {
            menu_tree: TreeBuilder::new().build(menus),
            button_codes,
            api_codes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.menu_tree.is_empty() && self.button_codes.is_empty() && self.api_codes.is_empty()
    }

    pub fn has_button(&self, code: &str) -> bool {
        self.button_codes.contains(code)
    }

    pub fn has_api(&self, code: &str) -> bool {
        self.api_codes.contains(code)
    }

    /// BLAKE3 hex digest over menu ids and both code sets
    ///
    /// Equal grants give equal fingerprints, so UI clients can skip
    /// re-rendering when nothing changed.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Hasher::new();

        hasher.update(b"menus");
        for id in self.menu_tree.menu_ids() {
            hasher.update(&id.to_le_bytes());
        }

        hasher.update(b"buttons");
        for code in &self.button_codes {
            hasher.update(code.as_bytes());
            hasher.update(&[0]);
        }

        hasher.update(b"apis");
        for code in &self.api_codes {
            hasher.update(code.as_bytes());
            hasher.update(&[0]);
        }

        hasher.finalize().to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_bundle() {
        let bundle = PermissionBundle::empty();
        assert!(bundle.is_empty());
        assert!(!bundle.has_api("widget:delete"));
    }

    #[test]
    fn test_from_parts_collects_button_codes() {
        let bundle = PermissionBundle::from_parts(
            vec![
                Menu::page(1, "Widgets"),
                Menu::button(2, "Delete", "widget:delete").with_parent(1),
                Menu::button(3, "No code", "").with_parent(1),
                Menu::page(4, "Stray code").with_permission_code("ignored"),
            ],
            codes(&["widget:list"]),
        );

        assert_eq!(bundle.button_codes, codes(&["widget:delete"]));
        assert!(bundle.has_api("widget:list"));
        assert_eq!(bundle.menu_tree.len(), 4);
    }

    #[test]
    fn test_fingerprint_tracks_grants() {
        let a = PermissionBundle::from_parts(vec![Menu::page(1, "A")], codes(&["x"]));
        let b = PermissionBundle::from_parts(vec![Menu::page(1, "A")], codes(&["x"]));
        let c = PermissionBundle::from_parts(vec![Menu::page(1, "A")], codes(&["x", "y"]));

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_code_boundaries_in_fingerprint() {
        let a = PermissionBundle::from_parts(Vec::new(), codes(&["ab", "c"]));
        let b = PermissionBundle::from_parts(Vec::new(), codes(&["a", "bc"]));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
