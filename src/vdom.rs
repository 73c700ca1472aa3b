//! Virtual UI tree, diffing and commit
//!
//! Components produce a [`Node`] tree. [`diff`] turns two trees into ordered
//! patches and a [`RootTree`] applies them atomically, reporting which nodes
//! were newly mounted.

mod commit;
mod diff;
mod node;

#[cfg(test)]
mod proptests;

pub use commit::{CommitError, CommitSummary, RootTree};
pub use diff::{diff, NodePath, Patch};
pub use node::{Node, FRAGMENT_KIND, TEXT_KIND};
