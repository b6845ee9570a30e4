//! Tree builder test suite
//!
//! Covers ordering, orphan promotion, cycle handling and the nested views.

use super::builder::TreeBuilder;
use super::types::StructuralIssue;
use crate::error::AuthzError;
use crate::types::{Menu, MenuId};

fn ids<'a>(menus: impl IntoIterator<Item = &'a Menu>) -> Vec<MenuId> {
    menus.into_iter().map(|m| m.id).collect()
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_children_sorted_by_order_then_id() {
    let tree = TreeBuilder::new().build(vec![
        Menu::catalog(1, "Root"),
        Menu::page(5, "C").with_parent(1).with_order(2),
        Menu::page(4, "B").with_parent(1).with_order(1),
        Menu::page(3, "A2").with_parent(1).with_order(1),
        Menu::page(2, "First").with_parent(1).with_order(0),
    ]);

    assert_eq!(ids(tree.children(1)), vec![2, 3, 4, 5]);
    assert!(tree.issues().is_empty());
}

#[test]
fn test_roots_sorted() {
    let tree = TreeBuilder::new().build(vec![
        Menu::catalog(30, "Reports").with_order(3),
        Menu::catalog(10, "Dashboard").with_order(1),
        Menu::catalog(20, "System").with_order(1),
    ]);

    assert_eq!(ids(tree.roots()), vec![10, 20, 30]);
}

#[test]
fn test_build_independent_of_input_order() {
    let menus = vec![
        Menu::catalog(1, "System"),
        Menu::page(2, "Users").with_parent(1).with_order(2),
        Menu::page(3, "Roles").with_parent(1).with_order(1),
        Menu::button(4, "Add", "user:add").with_parent(2),
    ];
    let mut reversed = menus.clone();
    reversed.reverse();

    let a = TreeBuilder::new().build(menus);
    let b = TreeBuilder::new().build(reversed);

    assert_eq!(a, b);
}

#[test]
fn test_duplicate_ids_collapsed() {
    let tree = TreeBuilder::new().build(vec![
        Menu::catalog(1, "System"),
        Menu::catalog(1, "System"),
        Menu::page(2, "Users").with_parent(1),
    ]);

    assert_eq!(tree.len(), 2);
    assert_eq!(ids(tree.children(1)), vec![2]);
}

#[test]
fn test_empty_input() {
    let tree = TreeBuilder::new().build(Vec::new());
    assert!(tree.is_empty());
    assert!(tree.to_nested().is_empty());
    assert!(tree.check().is_ok());
}

// ============================================================================
// Orphans and invalid parents
// ============================================================================

#[test]
fn test_missing_parent_promoted_to_root() {
    // Parent 1 is disabled upstream and never reaches the builder
    let tree = TreeBuilder::new().build(vec![
        Menu::page(2, "Users").with_parent(1),
        Menu::button(3, "Delete", "user:delete").with_parent(2),
    ]);

    assert_eq!(ids(tree.roots()), vec![2]);
    assert_eq!(ids(tree.children(2)), vec![3]);
    assert_eq!(
        tree.issues(),
        &[StructuralIssue::MissingParent { menu_id: 2, parent_id: 1 }]
    );
    // Orphans are routine, not an inconsistency
    assert!(tree.check().is_ok());
}

#[test]
fn test_self_parent_rooted() {
    let tree = TreeBuilder::new().build(vec![Menu::page(7, "Loop").with_parent(7)]);

    assert_eq!(ids(tree.roots()), vec![7]);
    assert_eq!(tree.issues(), &[StructuralIssue::SelfParent { menu_id: 7 }]);
    assert!(matches!(
        tree.check(),
        Err(AuthzError::StructuralInconsistency(_))
    ));
}

#[test]
fn test_button_under_button_rooted() {
    let tree = TreeBuilder::new().build(vec![
        Menu::page(1, "Users"),
        Menu::button(2, "Edit", "user:edit").with_parent(1),
        Menu::button(3, "Edit role", "user:edit-role").with_parent(2),
    ]);

    assert_eq!(ids(tree.roots()), vec![1, 3]);
    assert_eq!(
        tree.issues(),
        &[StructuralIssue::ButtonParent { menu_id: 3, parent_id: 2 }]
    );
    assert!(tree.check().is_err());
}

// ============================================================================
// Cycles
// ============================================================================

#[test]
fn test_two_node_cycle_terminates_and_reports() {
    let tree = TreeBuilder::new().build(vec![
        Menu::page(1, "A").with_parent(2),
        Menu::page(2, "B").with_parent(1),
    ]);

    // Both nodes survive; exactly one edge is broken
    assert_eq!(tree.len(), 2);
    assert_eq!(tree.issues().len(), 1);
    match &tree.issues()[0] {
        StructuralIssue::Cycle { menu_id, path } => {
            assert_eq!(*menu_id, 2);
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&1));
        }
        other => panic!("expected cycle, got {:?}", other),
    }

    assert_eq!(ids(tree.roots()), vec![2]);
    assert_eq!(ids(tree.children(2)), vec![1]);
    assert!(tree.check().is_err());
}

#[test]
fn test_long_cycle_with_tail() {
    // 1 -> 2 -> 3 -> 4 -> 1, plus 5 hanging under 3
    let tree = TreeBuilder::new().build(vec![
        Menu::page(1, "A").with_parent(4),
        Menu::page(2, "B").with_parent(1),
        Menu::page(3, "C").with_parent(2),
        Menu::page(4, "D").with_parent(3),
        Menu::page(5, "Tail").with_parent(3),
    ]);

    assert_eq!(tree.len(), 5);
    let cycles: Vec<_> = tree
        .issues()
        .iter()
        .filter(|i| matches!(i, StructuralIssue::Cycle { .. }))
        .collect();
    assert_eq!(cycles.len(), 1);

    // Every node is reachable from a root
    let reachable: usize = tree
        .roots()
        .map(|r| 1 + count_descendants(&tree, r.id))
        .sum();
    assert_eq!(reachable, 5);
}

fn count_descendants(tree: &super::MenuTree, id: MenuId) -> usize {
    tree.children(id)
        .iter()
        .map(|c| 1 + count_descendants(tree, c.id))
        .sum()
}

#[test]
fn test_ancestor_chain_after_cycle_break() {
    let tree = TreeBuilder::new().build(vec![
        Menu::page(1, "A").with_parent(3),
        Menu::page(2, "B").with_parent(1),
        Menu::page(3, "C").with_parent(2),
    ]);

    for id in [1, 2, 3] {
        let ancestors = tree.ancestors(id);
        assert!(!ancestors.contains(&id), "node {} is its own ancestor", id);
    }
}

// ============================================================================
// Views
// ============================================================================

#[test]
fn test_nested_view_keeps_buttons() {
    let tree = TreeBuilder::new().build(vec![
        Menu::catalog(1, "Widgets"),
        Menu::page(2, "List").with_parent(1).with_path("/widgets"),
        Menu::button(3, "Delete", "widget:delete").with_parent(2),
    ]);

    let nested = tree.to_nested();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].children[0].children[0].menu.id, 3);

    let json = serde_json::to_value(&nested).unwrap();
    assert_eq!(json[0]["children"][0]["path"], "/widgets");
    assert_eq!(
        json[0]["children"][0]["children"][0]["permission_code"],
        "widget:delete"
    );
}

#[test]
fn test_navigation_view_drops_buttons() {
    let tree = TreeBuilder::new().build(vec![
        Menu::catalog(1, "Widgets"),
        Menu::page(2, "List").with_parent(1),
        Menu::button(3, "Delete", "widget:delete").with_parent(2),
        Menu::button(4, "Orphan button", "widget:export").with_parent(99),
    ]);

    let nav = tree.navigation();
    assert_eq!(nav.len(), 1);
    assert!(nav[0].children[0].children.is_empty());
}

#[test]
fn test_tree_serde_roundtrip_preserves_structure() {
    let tree = TreeBuilder::new().build(vec![
        Menu::catalog(1, "Widgets"),
        Menu::page(2, "List").with_parent(1),
        Menu::page(3, "Loop").with_parent(3),
    ]);

    let json = serde_json::to_string(&tree).unwrap();
    let back: super::MenuTree = serde_json::from_str(&json).unwrap();

    assert_eq!(back, tree);
    assert_eq!(back.parent_of(2).map(|m| m.id), Some(1));
}
