//! Flat menu rows to ordered forest
//!
//! Two passes over the input:
//! 1. Index every node by id, in display order (`order_num`, then `id`)
//! 2. Attach each node under its declared parent, checking the ancestor
//!    chain of the candidate parent first
//!
//! Attached links always form a forest, so the ancestor walk terminates
//! even when the declared `parent_id` links loop.

use super::types::{MenuTree, StructuralIssue, TreeNode};
use crate::types::{Menu, MenuId};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Builds [`MenuTree`]s from flat menu sets
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeBuilder;

impl TreeBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a tree from an unordered set of menus
    ///
    /// Duplicate ids are collapsed. Nodes with a self-parent, a cyclic
    /// parent, an absent parent or a button parent are promoted to roots
    /// and recorded in [`MenuTree::issues`]; nothing is dropped.
    pub fn build<I>(&self, menus: I) -> MenuTree
    where
        I: IntoIterator<Item = Menu>,
    {
        let unique: BTreeMap<_, Menu> = menus.into_iter().map(|m| (m.id, m)).collect();

        let mut ordered: Vec<Menu> = unique.into_values().collect();
        ordered.sort_by_key(|m| (m.order_num, m.id));

        let mut tree = MenuTree {
            nodes: Vec::with_capacity(ordered.len()),
            ..MenuTree::default()
        };

        for menu in ordered {
            tree.index.insert(menu.id, tree.nodes.len());
            tree.nodes.push(TreeNode {
                menu,
                parent: None,
                children: Vec::new(),
            });
        }

        for idx in 0..tree.nodes.len() {
            match Self::attach(&mut tree, idx) {
                Ok(()) => {}
                Err(issue) => {
                    if issue.is_inconsistency() {
                        warn!(menu_id = issue.menu_id(), "Structural inconsistency: {}", issue);
                    } else {
                        debug!(menu_id = issue.menu_id(), "Promoting orphan to root: {}", issue);
                    }
                    tree.roots.push(idx);
                    tree.issues.push(issue);
                }
            }
        }

        tree
    }

    /// Attach one node; on `Err` the caller roots it
    fn attach(tree: &mut MenuTree, idx: usize) -> Result<(), StructuralIssue> {
        let menu = &tree.nodes[idx].menu;
        let menu_id = menu.id;

        let Some(parent_id) = menu.parent_id else {
            tree.roots.push(idx);
            return Ok(());
        };

        if parent_id == menu_id {
            return Err(StructuralIssue::SelfParent { menu_id });
        }

        let Some(&parent_idx) = tree.index.get(&parent_id) else {
            return Err(StructuralIssue::MissingParent { menu_id, parent_id });
        };

        if tree.nodes[parent_idx].menu.is_button() {
            return Err(StructuralIssue::ButtonParent { menu_id, parent_id });
        }

        if let Some(path) = Self::cycle_path(tree, idx, parent_idx) {
            return Err(StructuralIssue::Cycle { menu_id, path });
        }

        tree.nodes[idx].parent = Some(parent_idx);
        tree.nodes[parent_idx].children.push(idx);
        Ok(())
    }

    /// Walk attached ancestors of `parent_idx`; `Some(path)` if `idx` is among them
    fn cycle_path(tree: &MenuTree, idx: usize, parent_idx: usize) -> Option<Vec<MenuId>> {
        let mut path = vec![tree.nodes[idx].menu.id];
        let mut current = Some(parent_idx);
        let mut steps = 0;

        while let Some(c) = current {
            path.push(tree.nodes[c].menu.id);
            if c == idx {
                return Some(path);
            }

            steps += 1;
            if steps > tree.nodes.len() {
                // unreachable while attached links stay acyclic
                return Some(path);
            }
            current = tree.nodes[c].parent;
        }

        None
    }
}
