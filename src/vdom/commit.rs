//! Applying patches to a session's root tree

use super::diff::{diff, NodePath, Patch};
use super::node::Node;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitError {
    #[error("No node at path {0:?}")]
    MissingNode(NodePath),
    #[error("Cannot insert at {path:?}: parent has {len} children")]
    InsertOutOfBounds { path: NodePath, len: usize },
    #[error("Cannot insert a root: the tree already has one")]
    RootOccupied,
}

/// What a commit changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    /// Paths of inserted subtrees, in patch order
    pub mounted: Vec<NodePath>,
}

impl CommitSummary {
    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.removed == 0
    }
}

/// The committed tree of one session. Commits are all-or-nothing: a failing
/// patch leaves the previous tree in place.
#[derive(Debug, Clone, Default)]
pub struct RootTree {
    current: Option<Node>,
    commits: u64,
}

impl RootTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Node> {
        self.current.as_ref()
    }

    /// Successful commits so far, empty ones included
    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Replace the tree without diffing (used to roll back).
    pub fn reset(&mut self, tree: Option<Node>) {
        self.current = tree;
    }

    /// Diff against `next` and commit the result.
    pub fn reconcile(
        &mut self,
        next: Node,
        on_mount: impl FnMut(&[usize], &Node),
    ) -> Result<CommitSummary, CommitError> {
        let patches = diff(self.current.as_ref(), Some(&next));
        self.commit(&patches, on_mount)
    }

    /// Apply `patches` in order, then call `on_mount` for every inserted
    /// subtree.
    pub fn commit(
        &mut self,
        patches: &[Patch],
        mut on_mount: impl FnMut(&[usize], &Node),
    ) -> Result<CommitSummary, CommitError> {
        let mut next = self.current.clone();
        let mut summary = CommitSummary::default();
        for patch in patches {
            apply(&mut next, patch)?;
            match patch {
                Patch::Insert { path, .. } => {
                    summary.inserted += 1;
                    summary.mounted.push(path.clone());
                }
                Patch::Update { .. } => summary.updated += 1,
                Patch::Remove { .. } => summary.removed += 1,
            }
        }
        self.current = next;
        self.commits += 1;

        if let Some(root) = &self.current {
            for path in &summary.mounted {
                if let Some(node) = root.get(path) {
                    on_mount(path, node);
                }
            }
        }
        Ok(summary)
    }
}

fn apply(tree: &mut Option<Node>, patch: &Patch) -> Result<(), CommitError> {
    match patch {
        Patch::Insert { path, node } => match path.split_last() {
            None => {
                if tree.is_some() {
                    return Err(CommitError::RootOccupied);
                }
                *tree = Some(node.clone());
                Ok(())
            }
            Some((&index, parent)) => {
                let parent = node_mut(tree, parent, path)?;
                if index > parent.children.len() {
                    return Err(CommitError::InsertOutOfBounds {
                        path: path.clone(),
                        len: parent.children.len(),
                    });
                }
                parent.children.insert(index, node.clone());
                Ok(())
            }
        },
        Patch::Update { path, set, unset } => {
            let node = node_mut(tree, path, path)?;
            for name in unset {
                node.props.remove(name);
            }
            for (name, value) in set {
                node.props.insert(name.clone(), value.clone());
            }
            Ok(())
        }
        Patch::Remove { path } => match path.split_last() {
            None => tree
                .take()
                .map(|_| ())
                .ok_or_else(|| CommitError::MissingNode(path.clone())),
            Some((&index, parent)) => {
                let parent = node_mut(tree, parent, path)?;
                if index >= parent.children.len() {
                    return Err(CommitError::MissingNode(path.clone()));
                }
                parent.children.remove(index);
                Ok(())
            }
        },
    }
}

fn node_mut<'a>(
    tree: &'a mut Option<Node>,
    at: &[usize],
    reported: &NodePath,
) -> Result<&'a mut Node, CommitError> {
    tree.as_mut()
        .and_then(|root| root.get_mut(at))
        .ok_or_else(|| CommitError::MissingNode(reported.clone()))
}
