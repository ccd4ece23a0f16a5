use std::collections::{HashMap, HashSet};
use std::fmt::Display;

use fixedbitset::FixedBitSet;
use itertools::Itertools;

use super::feature::Feature;
use super::node::Node;
use super::tree_impl::{Tree, TreeError};
use super::NodeId;

type LeafSets = HashMap<NodeId, HashSet<NodeId>>;

fn side_labels<'a>(labels: &'a [String], side: &FixedBitSet) -> Vec<&'a str> {
    side.ones().map(|i| labels[i].as_str()).sorted().collect()
}

/// Split of the leaves of a tree induced by the edge above `node`.
///
/// Bit `i` of each side refers to the `i`-th leaf returned by
/// [`Tree::get_leaves`] for the root the bipartitions were computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bipartition {
    /// Node below the edge
    pub node: NodeId,
    /// Leaves in the subtree of `node`
    pub below: FixedBitSet,
    /// All the other leaves
    pub above: FixedBitSet,
}

/// Shape of the smallest clade holding a group of leaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonophylyKind {
    /// The clade holds the group and nothing else
    Monophyletic,
    /// The clade also holds other leaves that form a single nested group
    Paraphyletic,
    /// The group is scattered among other leaves
    Polyphyletic,
}

impl Display for MonophylyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let repr = match self {
            MonophylyKind::Monophyletic => "monophyletic",
            MonophylyKind::Paraphyletic => "paraphyletic",
            MonophylyKind::Polyphyletic => "polyphyletic",
        };
        write!(f, "{repr}")
    }
}

/// Result of [`Tree::check_monophyly`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monophyly {
    /// Whether the group forms a clade by itself
    pub is_monophyletic: bool,
    /// Shape of the group
    pub kind: MonophylyKind,
    /// Leaves outside of the group found in its smallest clade, sorted
    pub foreign: Vec<NodeId>,
}

/// Methods that aggregate leaf content over clades, and the queries built
/// on top of them.
///
/// The maps returned here are snapshots: they are not updated when the
/// topology changes afterwards.
///
/// ----
/// ----
impl Tree {
    // ##################
    // # CACHED CONTENT #
    // ##################

    /// Computes, in a single postorder pass, a container for every node of
    /// the subtree of `root`. Leaves get the container returned by `store`,
    /// internal nodes the concatenation of their children's containers.
    /// ```
    /// use std::collections::BTreeSet;
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let inner = tree.add_child(Node::new(), root).unwrap();
    /// tree.add_child(Node::new_named("C"), root).unwrap();
    /// tree.add_child(Node::new_named("A"), inner).unwrap();
    /// tree.add_child(Node::new_named("B"), inner).unwrap();
    ///
    /// let names = tree
    ///     .get_cached_content(&root, |node| BTreeSet::from([node.name.clone()]))
    ///     .unwrap();
    ///
    /// assert_eq!(names[&inner], BTreeSet::from(["A".to_owned(), "B".to_owned()]));
    /// assert_eq!(names[&root].len(), 3);
    /// ```
    pub fn get_cached_content<C, T, F>(&self, root: &NodeId, store: F) -> Result<HashMap<NodeId, C>, TreeError>
    where
        C: Default + Clone + Extend<T> + IntoIterator<Item = T>,
        F: Fn(&Node) -> C,
    {
        let mut cache: HashMap<NodeId, C> = HashMap::new();
        for id in self.postorder(root)? {
            let node = &self.nodes[id];
            let content = if node.is_leaf() {
                store(node)
            } else {
                let mut content = C::default();
                for child in node.children.iter() {
                    if let Some(below) = cache.get(child) {
                        content.extend(below.clone());
                    }
                }
                content
            };
            cache.insert(id, content);
        }

        Ok(cache)
    }

    /// Set of leaves below every node of the subtree
    pub fn get_cached_leaves(&self, root: &NodeId) -> Result<LeafSets, TreeError> {
        self.get_cached_content(root, |node| HashSet::from([node.id]))
    }

    /// Values of an attribute (see [`Tree::get_attribute`]) over the leaves
    /// below every node of the subtree. Leaves without the attribute
    /// contribute nothing.
    pub fn get_cached_attribute(
        &self,
        root: &NodeId,
        key: &str,
    ) -> Result<HashMap<NodeId, Vec<Feature>>, TreeError> {
        self.get_cached_content(root, |node| {
            self.get_attribute(&node.id, key)
                .ok()
                .into_iter()
                .collect::<Vec<_>>()
        })
    }

    // ##################
    // # BIPARTITIONS   #
    // ##################

    /// Returns the bipartition induced by each edge of the subtree, in
    /// preorder. A previously computed leaf cache can be reused.
    pub fn get_edges(&self, root: &NodeId, cache: Option<&LeafSets>) -> Result<Vec<Bipartition>, TreeError> {
        let computed;
        let cache = match cache {
            Some(cache) => cache,
            None => {
                computed = self.get_cached_leaves(root)?;
                &computed
            }
        };

        let leaves = self.get_leaves(root)?;
        let index: HashMap<NodeId, usize> = leaves.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut edges = vec![];
        for node in self.preorder(root)?.filter(|id| id != root) {
            let mut below = FixedBitSet::with_capacity(leaves.len());
            for leaf in cache.get(&node).ok_or(TreeError::NodeNotFound(node))? {
                let i = index.get(leaf).ok_or(TreeError::NodeNotFound(*leaf))?;
                below.insert(*i);
            }
            let mut above = FixedBitSet::with_capacity(leaves.len());
            above.insert_range(..);
            above.difference_with(&below);
            edges.push(Bipartition { node, below, above });
        }

        Ok(edges)
    }

    /// Returns an identifier of the unrooted topology of the subtree, built
    /// from its non-trivial and leaf bipartitions labelled with an
    /// attribute of the leaves (usually `name`). Child order and root
    /// position do not change the id unless `include_root` is set, in which
    /// case the leaf sets of a rooted tree's root children are hashed too
    /// and differently rooted versions of a topology get different ids.
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut first = Tree::new();
    /// let root = first.add(Node::new());
    /// let ab = first.add_child(Node::new(), root).unwrap();
    /// first.add_child(Node::new_named("C"), root).unwrap();
    /// first.add_child(Node::new_named("A"), ab).unwrap();
    /// first.add_child(Node::new_named("B"), ab).unwrap();
    ///
    /// let mut second = first.clone();
    /// second.swap_children(&ab).unwrap();
    ///
    /// assert_eq!(
    ///     first.get_topology_id(&root, "name", true).unwrap(),
    ///     second.get_topology_id(&root, "name", true).unwrap(),
    /// );
    /// ```
    pub fn get_topology_id(
        &self,
        root: &NodeId,
        key: &str,
        include_root: bool,
    ) -> Result<String, TreeError> {
        let leaves = self.get_leaves(root)?;
        let mut labels = Vec::with_capacity(leaves.len());
        for leaf in leaves.iter() {
            labels.push(self.get_attribute(leaf, key)?.to_string());
        }

        let mut keys: Vec<(Vec<&str>, Vec<&str>)> = self
            .get_edges(root, None)?
            .iter()
            .filter(|edge| edge.above.count_ones(..) > 0)
            .map(|edge| {
                let below = side_labels(&labels, &edge.below);
                let above = side_labels(&labels, &edge.above);
                if below <= above {
                    (below, above)
                } else {
                    (above, below)
                }
            })
            .collect();
        keys.sort();
        keys.dedup();

        let mut hasher = blake3::Hasher::new();
        for (first, second) in keys.iter() {
            for side in [first, second] {
                for label in side.iter() {
                    hasher.update(label.as_bytes());
                    hasher.update(&[0x1f]);
                }
                hasher.update(&[0x1e]);
            }
            hasher.update(&[0x1d]);
        }

        if include_root && self.get(root)?.children.len() <= 2 {
            let mut sides = Vec::new();
            for child in self.get_children(root)? {
                let mut side = Vec::new();
                for leaf in self.get_leaves(&child)? {
                    side.push(self.get_attribute(&leaf, key)?.to_string());
                }
                side.sort();
                sides.push(side);
            }
            sides.sort();

            hasher.update(&[0x1c]);
            for side in sides.iter() {
                for label in side.iter() {
                    hasher.update(label.as_bytes());
                    hasher.update(&[0x1f]);
                }
                hasher.update(&[0x1e]);
            }
        }

        Ok(hasher.finalize().to_hex().to_string())
    }

    // ##################
    // # MONOPHYLY      #
    // ##################

    /// Checks whether the leaves of the subtree holding one of `values` for
    /// the attribute `key` form a clade.
    ///
    /// Values that no leaf holds are an error unless `ignore_missing` is
    /// set. With `unrooted`, any side of any edge counts as a clade, so a
    /// group split by the current root can still be monophyletic.
    pub fn check_monophyly(
        &self,
        root: &NodeId,
        values: &[Feature],
        key: &str,
        ignore_missing: bool,
        unrooted: bool,
    ) -> Result<Monophyly, TreeError> {
        let leaf_values: HashMap<NodeId, Feature> = self
            .get_leaves(root)?
            .into_iter()
            .filter_map(|leaf| self.get_attribute(&leaf, key).ok().map(|v| (leaf, v)))
            .collect();

        let mut wanted: HashSet<Feature> = values.iter().cloned().collect();
        let found: HashSet<&Feature> = leaf_values.values().collect();
        let missing: Vec<String> = wanted
            .iter()
            .filter(|value| !found.contains(value))
            .map(|value| value.to_string())
            .sorted()
            .collect();
        if !missing.is_empty() {
            if !ignore_missing {
                return Err(TreeError::MissingValues(missing));
            }
            wanted.retain(|value| found.contains(value));
        }

        let targets: HashSet<NodeId> = leaf_values
            .iter()
            .filter(|(_, value)| wanted.contains(*value))
            .map(|(leaf, _)| *leaf)
            .collect();
        if targets.is_empty() {
            return Err(TreeError::EmptyQuery);
        }

        let cache = self.get_cached_leaves(root)?;
        let foreign: Vec<NodeId> = if unrooted {
            let all = &cache[root];
            let mut smallest: Option<HashSet<NodeId>> = None;
            for node in self.preorder(root)? {
                let below = &cache[&node];
                let above: HashSet<NodeId> = all.difference(below).copied().collect();
                for side in [below.clone(), above] {
                    let smaller = smallest.as_ref().map_or(true, |s| side.len() < s.len());
                    if smaller && targets.is_subset(&side) {
                        smallest = Some(side);
                    }
                }
                if smallest.as_ref().map(HashSet::len) == Some(targets.len()) {
                    break;
                }
            }
            smallest
                .unwrap_or_default()
                .difference(&targets)
                .copied()
                .sorted()
                .collect()
        } else {
            let seeds: Vec<NodeId> = targets.iter().copied().collect();
            let common = self.get_common_ancestor(&seeds)?;
            cache[&common]
                .iter()
                .filter(|leaf| !targets.contains(*leaf))
                .copied()
                .sorted()
                .collect()
        };

        if foreign.is_empty() {
            return Ok(Monophyly {
                is_monophyletic: true,
                kind: MonophylyKind::Monophyletic,
                foreign,
            });
        }

        // Foreign leaves nested in a clade free of targets make a paraphyly
        let foreign_common = self.get_common_ancestor(&foreign)?;
        let kind = if cache[&foreign_common].iter().any(|leaf| targets.contains(leaf)) {
            MonophylyKind::Polyphyletic
        } else {
            MonophylyKind::Paraphyletic
        };

        Ok(Monophyly {
            is_monophyletic: false,
            kind,
            foreign,
        })
    }

    /// Returns the topmost nodes of the subtree whose leaves hold exactly
    /// the given set of values for the attribute `key`.
    pub fn get_monophyletic(&self, root: &NodeId, values: &[Feature], key: &str) -> Result<Vec<NodeId>, TreeError> {
        let wanted: HashSet<Feature> = values.iter().cloned().collect();
        let content: HashMap<NodeId, HashSet<Feature>> = self.get_cached_content(root, |node| {
            self.get_attribute(&node.id, key)
                .ok()
                .into_iter()
                .collect::<HashSet<_>>()
        })?;

        let matches = |node: &Node| content.get(&node.id) == Some(&wanted);
        Ok(self
            .preorder_with(root, matches)?
            .filter(|id| matches(&self.nodes[*id]))
            .collect())
    }

    /// Checks whether the given nodes are exactly the leaves of their most
    /// recent common ancestor. The subtree must be rooted.
    pub fn is_monophyletic(&self, root: &NodeId, nodes: &[NodeId]) -> Result<bool, TreeError> {
        if self.get(root)?.children.len() > 2 {
            return Err(TreeError::IsNotRooted);
        }
        for node in nodes {
            if !self.is_in_subtree(node, root)? {
                return Err(TreeError::NotDescendant {
                    node: *node,
                    ancestor: *root,
                });
            }
        }

        let common = self.get_common_ancestor(nodes)?;
        let group: HashSet<&NodeId> = nodes.iter().collect();

        Ok(self
            .get_leaves(&common)?
            .iter()
            .all(|leaf| group.contains(leaf)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::tree::test_utils::{build_tree, id, names};

    fn text(values: &[&str]) -> Vec<Feature> {
        values.iter().map(|v| Feature::from(*v)).collect()
    }

    #[test]
    fn cached_leaves() {
        let tree = build_tree("((A,B)C,(D,E)F)R;");
        let r = id(&tree, "R");
        let cache = tree.get_cached_leaves(&r).unwrap();

        assert_eq!(cache.len(), 7);
        let c_leaves: BTreeSet<_> = cache[&id(&tree, "C")].iter().copied().collect();
        assert_eq!(c_leaves, BTreeSet::from([id(&tree, "A"), id(&tree, "B")]));
        assert_eq!(cache[&r].len(), 4);
        assert_eq!(cache[&id(&tree, "D")], HashSet::from([id(&tree, "D")]));
    }

    #[test]
    fn cached_attribute_skips_missing() {
        let mut tree = build_tree("((A,B)C,D)R;");
        let r = id(&tree, "R");
        tree.set_feature(&id(&tree, "A"), "group", 1_i64).unwrap();
        tree.set_feature(&id(&tree, "D"), "group", 2_i64).unwrap();

        let mut content = tree.get_cached_attribute(&r, "group").unwrap();
        content.values_mut().for_each(|values| values.sort());
        assert_eq!(content[&id(&tree, "C")], vec![Feature::Int(1)]);
        assert_eq!(content[&r], vec![Feature::Int(1), Feature::Int(2)]);
        assert!(content[&id(&tree, "B")].is_empty());
    }

    #[test]
    fn bipartitions() {
        let tree = build_tree("((A,B)C,(D,E)F)R;");
        let r = id(&tree, "R");
        let edges = tree.get_edges(&r, None).unwrap();

        assert_eq!(edges.len(), 6);
        let c_edge = edges
            .iter()
            .find(|edge| edge.node == id(&tree, "C"))
            .unwrap();
        assert_eq!(c_edge.below.ones().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(c_edge.above.ones().collect::<Vec<_>>(), vec![2, 3]);

        let cache = tree.get_cached_leaves(&r).unwrap();
        assert_eq!(tree.get_edges(&r, Some(&cache)).unwrap(), edges);
    }

    #[test]
    fn topology_id_ignores_rotation_and_rooting() {
        let rooted = build_tree("((A,B),(C,D));");
        let rotated = build_tree("((D,C),(B,A));");
        let unrooted = build_tree("(A,B,(C,D));");
        let other = build_tree("((A,C),(B,D));");

        let tid = |tree: &Tree| {
            tree.get_topology_id(&tree.get_root().unwrap(), "name", false)
                .unwrap()
        };

        assert_eq!(tid(&rooted), tid(&rotated));
        assert_eq!(tid(&rooted), tid(&unrooted));
        assert_ne!(tid(&rooted), tid(&other));
        assert_eq!(tid(&rooted).len(), 64);
    }

    #[test]
    fn topology_id_with_root_tells_rootings_apart() {
        let rooted = build_tree("((A,B),(C,D));");
        let rotated = build_tree("((D,C),(B,A));");
        let unrooted = build_tree("(A,B,(C,D));");
        // Same unrooted topology, rooted on the edge above A
        let rerooted = build_tree("(A,(B,(C,D)));");

        let tid = |tree: &Tree| {
            tree.get_topology_id(&tree.get_root().unwrap(), "name", true)
                .unwrap()
        };

        assert_eq!(tid(&rooted), tid(&rotated));
        assert_ne!(tid(&rooted), tid(&unrooted));
        assert_ne!(tid(&rooted), tid(&rerooted));

        let root = rooted.get_root().unwrap();
        assert_eq!(
            rooted.get_topology_id(&root, "name", false).unwrap(),
            rerooted
                .get_topology_id(&rerooted.get_root().unwrap(), "name", false)
                .unwrap(),
        );
    }

    #[test]
    fn monophyly_kinds() {
        let tree = build_tree("(((A,B)X,C)Y,(D,E)Z)R;");
        let r = id(&tree, "R");

        let mono = tree
            .check_monophyly(&r, &text(&["A", "B"]), "name", false, false)
            .unwrap();
        assert!(mono.is_monophyletic);
        assert_eq!(mono.kind, MonophylyKind::Monophyletic);

        // C breaks the clade but sits in a clade of its own
        let para = tree
            .check_monophyly(&r, &text(&["A", "B", "D", "E"]), "name", false, false)
            .unwrap();
        assert!(!para.is_monophyletic);
        assert_eq!(para.kind, MonophylyKind::Paraphyletic);
        assert_eq!(names(&tree, &para.foreign), vec!["C"]);

        let poly = tree
            .check_monophyly(&r, &text(&["A", "D"]), "name", false, false)
            .unwrap();
        assert_eq!(poly.kind, MonophylyKind::Polyphyletic);
        assert_eq!(poly.foreign.len(), 3);
        assert_eq!(poly.kind.to_string(), "polyphyletic");
    }

    #[test]
    fn monophyly_missing_values() {
        let tree = build_tree("((A,B)X,C)R;");
        let r = id(&tree, "R");

        assert!(matches!(
            tree.check_monophyly(&r, &text(&["A", "Q"]), "name", false, false),
            Err(TreeError::MissingValues(missing)) if missing == vec!["Q".to_owned()]
        ));
        let result = tree
            .check_monophyly(&r, &text(&["A", "Q"]), "name", true, false)
            .unwrap();
        assert!(result.is_monophyletic);
    }

    #[test]
    fn unrooted_monophyly() {
        // C and D sit on different sides of every edge holding them
        let tree = build_tree("((A,C)X,(B,D)Y)R;");
        let r = id(&tree, "R");
        let values = text(&["C", "D", "A", "B"]);
        assert!(tree
            .check_monophyly(&r, &values[..2], "name", false, false)
            .map(|m| !m.is_monophyletic)
            .unwrap());

        let tree = build_tree("((A,B)X,(C,D)Y,E)R;");
        let r = id(&tree, "R");
        let result = tree
            .check_monophyly(&r, &text(&["A", "B", "E"]), "name", false, true)
            .unwrap();
        assert!(result.is_monophyletic);
        let rooted = tree
            .check_monophyly(&r, &text(&["A", "B", "E"]), "name", false, false)
            .unwrap();
        assert!(!rooted.is_monophyletic);
    }

    #[test]
    fn monophyletic_clades() {
        let mut tree = build_tree("(((A,B)X,C)Y,((D,E)Z,F)W)R;");
        let r = id(&tree, "R");
        for (name, color) in [("A", "red"), ("B", "red"), ("C", "blue"), ("D", "red"), ("E", "red"), ("F", "red")] {
            tree.set_feature(&id(&tree, name), "color", color).unwrap();
        }

        let reds = tree
            .get_monophyletic(&r, &text(&["red"]), "color")
            .unwrap();
        assert_eq!(names(&tree, &reds), vec!["X", "W"]);
    }

    #[test]
    fn monophyly_of_nodes() {
        let tree = build_tree("(((A,B)X,C)Y,(D,E)Z)R;");
        let r = id(&tree, "R");
        let ids = |names: &[&str]| tree.translate_names(&r, names).unwrap();

        assert!(tree.is_monophyletic(&r, &ids(&["A", "B"])).unwrap());
        assert!(tree.is_monophyletic(&r, &ids(&["A", "B", "C"])).unwrap());
        assert!(!tree.is_monophyletic(&r, &ids(&["A", "C"])).unwrap());

        let star = build_tree("(A,B,C)R;");
        let r = id(&star, "R");
        assert!(matches!(
            star.is_monophyletic(&r, &[id(&star, "A")]),
            Err(TreeError::IsNotRooted)
        ));
    }
}
