//! Fixture helpers for unit tests.
//!
//! Trees are written in a bracket notation: `((A:0.1,B)C,D:2)R;` where
//! names are optional on internal nodes and `:length` is optional
//! everywhere (missing lengths keep the node default).

use super::{Node, NodeId, Tree};

/// Builds a tree from bracket notation, panicking on malformed input
pub(crate) fn build_tree(text: &str) -> Tree {
    let mut tree = Tree::new();
    let mut open: Vec<NodeId> = vec![];
    // Node that a following label or length applies to
    let mut current: Option<NodeId> = None;

    let chars: Vec<char> = text.trim().trim_end_matches(';').chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '(' => {
                let id = match open.last() {
                    Some(parent) => tree.add_child(Node::new(), *parent).unwrap(),
                    None => tree.add(Node::new()),
                };
                open.push(id);
                current = None;
                i += 1;
            }
            ',' => {
                current = None;
                i += 1;
            }
            ')' => {
                current = open.pop();
                i += 1;
            }
            ':' => {
                let start = i + 1;
                i = start;
                while i < chars.len() && !"(),:".contains(chars[i]) {
                    i += 1;
                }
                let length: String = chars[start..i].iter().collect();
                let target = current.expect("length without a node");
                tree.get_mut(&target)
                    .unwrap()
                    .set_dist(length.trim().parse().unwrap())
                    .unwrap();
            }
            _ => {
                let start = i;
                while i < chars.len() && !"(),:".contains(chars[i]) {
                    i += 1;
                }
                let label: String = chars[start..i].iter().collect();
                let target = match current {
                    Some(id) => id,
                    None => match open.last() {
                        Some(parent) => tree.add_child(Node::new(), *parent).unwrap(),
                        None => tree.add(Node::new()),
                    },
                };
                tree.get_mut(&target).unwrap().set_name(label.trim().to_owned());
                current = Some(target);
            }
        }
    }

    tree
}

/// Id of the first node with a given name
pub(crate) fn id(tree: &Tree, name: &str) -> NodeId {
    tree.get_by_name(name)
        .unwrap_or_else(|| panic!("no node named {name}"))
        .id()
}

/// Names of a list of nodes
pub(crate) fn names(tree: &Tree, ids: &[NodeId]) -> Vec<String> {
    ids.iter()
        .map(|id| tree.get(id).unwrap().name.clone())
        .collect()
}

/// Compact bracket rendering of a subtree, names only
pub(crate) fn topology(tree: &Tree, root: &NodeId) -> String {
    let mut repr = String::new();
    for (is_post, id) in tree.prepostorder(root).unwrap() {
        let node = tree.get(&id).unwrap();
        if node.is_leaf() {
            if !is_post {
                if !repr.is_empty() && !repr.ends_with('(') {
                    repr.push(',');
                }
                repr += &node.name;
            }
        } else if is_post {
            repr.push(')');
            repr += &node.name;
        } else {
            if !repr.is_empty() && !repr.ends_with('(') {
                repr.push(',');
            }
            repr.push('(');
        }
    }

    repr
}

/// Checks the parent/child links of every live node
pub(crate) fn assert_consistent(tree: &Tree) {
    for node in tree.iter() {
        for child in node.children() {
            assert_eq!(
                tree.get(child).unwrap().parent(),
                Some(node.id()),
                "child {child} of {} points elsewhere",
                node.id()
            );
        }
        if let Some(parent) = node.parent() {
            let count = tree
                .get(&parent)
                .unwrap()
                .children()
                .iter()
                .filter(|id| **id == node.id())
                .count();
            assert_eq!(count, 1, "node {} listed {count} times", node.id());
        }
    }
}

#[test]
fn bracket_notation() {
    let tree = build_tree("((A:0.1,B)C,D:2)R;");
    let root = tree.get_root().unwrap();
    assert_eq!(topology(&tree, &root), "((A,B)C,D)R");
    assert_eq!(tree.get(&id(&tree, "A")).unwrap().dist(), 0.1);
    assert_eq!(tree.get(&id(&tree, "B")).unwrap().dist(), 1.0);
    assert_eq!(tree.get(&id(&tree, "D")).unwrap().dist(), 2.0);
    assert_consistent(&tree);
}
