//! Tree diff producing ordered patches

use super::node::Node;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Child indices from the root. The empty path is the root itself.
pub type NodePath = Vec<usize>;

/// One tree edit. Applying a diff's patches in order to the old tree
/// yields the new tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Patch {
    Insert {
        path: NodePath,
        node: Node,
    },
    Update {
        path: NodePath,
        set: BTreeMap<String, Value>,
        unset: Vec<String>,
    },
    Remove {
        path: NodePath,
    },
}

impl Patch {
    pub fn path(&self) -> &[usize] {
        match self {
            Self::Insert { path, .. } | Self::Update { path, .. } | Self::Remove { path } => path,
        }
    }
}

/// Diff two optional trees.
///
/// Children are compared by position. A child whose kind or key changed is
/// removed and the new one inserted in its place. Surplus old children are
/// removed from the back, surplus new children appended in order.
pub fn diff(old: Option<&Node>, new: Option<&Node>) -> Vec<Patch> {
    let mut patches = Vec::new();
    let mut path = Vec::new();
    diff_node(old, new, &mut path, &mut patches);
    patches
}

fn diff_node(old: Option<&Node>, new: Option<&Node>, path: &mut NodePath, out: &mut Vec<Patch>) {
    match (old, new) {
        (None, None) => {}
        (None, Some(new)) => out.push(Patch::Insert {
            path: path.clone(),
            node: new.clone(),
        }),
        (Some(_), None) => out.push(Patch::Remove { path: path.clone() }),
        (Some(old), Some(new)) if !old.same_identity(new) => {
            out.push(Patch::Remove { path: path.clone() });
            out.push(Patch::Insert {
                path: path.clone(),
                node: new.clone(),
            });
        }
        (Some(old), Some(new)) => {
            diff_props(old, new, path, out);
            diff_children(old, new, path, out);
        }
    }
}

fn diff_props(old: &Node, new: &Node, path: &NodePath, out: &mut Vec<Patch>) {
    let set: BTreeMap<String, Value> = new
        .props
        .iter()
        .filter(|(name, value)| old.props.get(*name) != Some(*value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    let unset: Vec<String> = old
        .props
        .keys()
        .filter(|name| !new.props.contains_key(*name))
        .cloned()
        .collect();
    if !set.is_empty() || !unset.is_empty() {
        out.push(Patch::Update {
            path: path.clone(),
            set,
            unset,
        });
    }
}

fn diff_children(old: &Node, new: &Node, path: &mut NodePath, out: &mut Vec<Patch>) {
    let common = old.children.len().min(new.children.len());
    for i in 0..common {
        path.push(i);
        diff_node(Some(&old.children[i]), Some(&new.children[i]), path, out);
        path.pop();
    }
    for i in (common..old.children.len()).rev() {
        path.push(i);
        out.push(Patch::Remove { path: path.clone() });
        path.pop();
    }
    for (i, child) in new.children.iter().enumerate().skip(common) {
        path.push(i);
        out.push(Patch::Insert {
            path: path.clone(),
            node: child.clone(),
        });
        path.pop();
    }
}
