//! Property-based tests for diff and commit

use super::*;
use proptest::prelude::*;
use serde_json::Value;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_leaf() -> impl Strategy<Value = Node> {
    prop_oneof![
        "[a-z ]{0,8}".prop_map(Node::text),
        ("[a-c]", proptest::option::of("[xy]"), proptest::collection::btree_map("[pq]", 0i64..3, 0..3))
            .prop_map(|(kind, key, props)| {
                let mut node = Node::element(kind);
                node.key = key;
                node.props = props.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
                node
            }),
    ]
}

fn arb_tree() -> impl Strategy<Value = Node> {
    arb_leaf().prop_recursive(4, 32, 4, |inner| {
        (arb_leaf(), proptest::collection::vec(inner, 0..4)).prop_map(|(mut node, children)| {
            if !node.is_text() {
                node.children = children;
            }
            node
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Applying diff(old, new) to old always yields new
    #[test]
    fn prop_commit_reaches_target(old in arb_tree(), new in arb_tree()) {
        let mut root = RootTree::new();
        root.reconcile(old, |_, _| {}).unwrap();
        root.reconcile(new.clone(), |_, _| {}).unwrap();
        prop_assert_eq!(root.current(), Some(&new));
    }

    // Diffing a tree with itself is a no-op
    #[test]
    fn prop_self_diff_is_empty(tree in arb_tree()) {
        prop_assert!(diff(Some(&tree), Some(&tree)).is_empty());
    }

    // Every mounted path points at a node in the committed tree
    #[test]
    fn prop_mounted_paths_exist(old in arb_tree(), new in arb_tree()) {
        let mut root = RootTree::new();
        root.reconcile(old, |_, _| {}).unwrap();
        let mut seen = 0usize;
        let summary = root.reconcile(new, |_, _| seen += 1).unwrap();
        prop_assert_eq!(seen, summary.mounted.len());
        prop_assert_eq!(summary.inserted, summary.mounted.len());
        for path in &summary.mounted {
            prop_assert!(root.current().and_then(|t| t.get(path)).is_some());
        }
    }

    // Teardown then rebuild goes through the empty tree
    #[test]
    fn prop_remove_then_insert(a in arb_tree(), b in arb_tree()) {
        let mut root = RootTree::new();
        root.reconcile(a, |_, _| {}).unwrap();
        root.commit(&diff(root.current(), None), |_, _| {}).unwrap();
        prop_assert!(root.current().is_none());
        root.reconcile(b.clone(), |_, _| {}).unwrap();
        prop_assert_eq!(root.current(), Some(&b));
    }
}
