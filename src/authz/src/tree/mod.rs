//! Menu tree module
//!
//! Converts flat menu rows into a validated, ordered forest.
//!
//! # Features
//!
//! - **Arena storage**: nodes indexed by id, parent/children as indices
//! - **Deterministic order**: siblings sorted by `order_num`, then `id`
//! - **Cycle detection**: ancestor walk before every attach
//! - **No silent drops**: structurally broken nodes become roots and are
//!   reported in [`MenuTree::issues`]
//!
//! # Example
//!
//! ```rust
//! use console_authz::tree::TreeBuilder;
//! use console_authz::types::Menu;
//!
//! let tree = TreeBuilder::new().build(vec![
//!     Menu::catalog(1, "System"),
//!     Menu::page(2, "Users").with_parent(1),
//!     Menu::button(3, "Delete user", "user:delete").with_parent(2),
//! ]);
//!
//! assert_eq!(tree.roots().count(), 1);
//! assert_eq!(tree.ancestors(3), vec![2, 1]);
//! assert!(tree.issues().is_empty());
//! ```

pub mod builder;
pub mod types;

#[cfg(test)]
mod tests;

pub use builder::TreeBuilder;
pub use types::{MenuTree, MenuView, StructuralIssue};
