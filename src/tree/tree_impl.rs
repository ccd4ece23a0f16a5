use accurate::sum::Sum2;
use accurate::traits::*;
use ptree::{print_tree, write_tree, TreeBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use thiserror::Error;

use super::feature::Feature;
use super::node::{Node, NodeError};
use super::{EdgeLength, NodeId};

use crate::distance::MatrixError;

/// Errors that can occur when querying and manipulating [`Tree`] structs.
#[derive(Error, Debug)]
pub enum TreeError {
    /// The tree is empty and we are trying to do something that require at least one node
    #[error("This tree is empty.")]
    IsEmpty,
    /// The tree is not rooted and we are trying to do something
    /// only possible on rooted trees
    #[error("This tree is not rooted.")]
    IsNotRooted,
    /// The requested node with index [`NodeId`] does not exist in the tree
    #[error("There is no node with index: {0}")]
    NodeNotFound(NodeId),
    /// No node carries the requested name
    #[error("There is no node named {0:?}")]
    NameNotFound(String),
    /// Several nodes carry a name that was used as a unique query
    #[error("Several nodes are named {0:?}, use node ids to disambiguate")]
    AmbiguousName(String),
    /// The node has no value for the requested feature
    #[error("Node {node} has no feature {key:?}")]
    FeatureNotFound {
        /// Id of the queried node
        node: NodeId,
        /// Name of the missing feature
        key: String,
    },
    /// Some of the queried values are not held by any leaf
    #[error("No leaf holds the values: {0:?}")]
    MissingValues(Vec<String>),
    /// We are trying to query several nodes but none were given
    #[error("At least one node is needed for this query")]
    EmptyQuery,
    /// The operation needs the node to have a parent
    #[error("Node {0} has no parent")]
    NoParent(NodeId),
    /// The root of a tree cannot be spliced out
    #[error("Cannot delete node {0}, it is the root of its tree")]
    CannotDeleteRoot(NodeId),
    /// Unrooting needs at least one internal child below the root
    #[error("Cannot unroot a tree with only two leaves")]
    CannotUnrootTwoLeaves,
    /// The operation needs a node with exactly two children
    #[error("Node {0} does not have exactly two children")]
    NotBifurcating(NodeId),
    /// The operation needs a node with more children
    #[error("Node {0} does not have enough children")]
    TooFewChildren(NodeId),
    /// A node cannot be used as the outgroup of itself
    #[error("Node {0} cannot be its own outgroup")]
    OutgroupIsSelf(NodeId),
    /// A node was expected in the subtree of another one
    #[error("Node {node} is not a descendant of node {ancestor}")]
    NotDescendant {
        /// Id of the misplaced node
        node: NodeId,
        /// Id of the expected ancestor
        ancestor: NodeId,
    },
    /// The nodes belong to different components of the arena
    #[error("Nodes are not connected")]
    DisconnectedNodes,
    /// Attaching would make a node its own ancestor
    #[error("Cannot attach node {child} below node {parent}: this would create a cycle")]
    WouldCreateCycle {
        /// Id of the receiving node
        parent: NodeId,
        /// Id of the attached node
        child: NodeId,
    },
    /// There was a [`std::io::Error`] when printing the tree
    #[error("Error writing tree")]
    IoError(#[from] std::io::Error),
    /// There was a [`NodeError`] when operating on a node
    #[error("Could not operate on Node")]
    NodeError(#[from] NodeError),
    /// There was a [`MatrixError`] when querying a distance matrix
    #[error("Could not query distance matrix")]
    MatrixError(#[from] MatrixError),
}

/// A Phylogenetic tree
///
/// Nodes live in an arena and refer to each other by [`NodeId`]. Ids stay
/// valid until the node they point to is deleted. Detached subtrees stay in
/// the arena as separate components and can be attached again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: Option<NodeId>,
    features: HashMap<String, HashMap<NodeId, Feature>>,
}

/// Base methods to add and get [`Node`] objects to and from the [`Tree`].
///
/// ----
/// ----
impl Tree {
    /// Create a new empty Tree object
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            features: HashMap::new(),
        }
    }

    // ############################
    // # ADDING AND GETTING NODES #
    // ############################

    /// Add a new unattached node to the tree. The first node added to the
    /// tree becomes its root.
    pub fn add(&mut self, node: Node) -> NodeId {
        let idx = self.nodes.len();
        let mut node = node;
        node.id = idx;
        node.parent = None;
        node.children.clear();
        node.deleted = false;
        self.nodes.push(node);

        if self.root.is_none() {
            self.root = Some(idx);
        }

        idx
    }

    /// Add a child to one of the tree's nodes, after its existing children.
    ///
    /// # Example
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// // Create the tree and add a root node
    /// let mut tree = Tree::new();
    /// let root_id = tree.add(Node::new());
    ///
    /// // Add children to the root
    /// let left = tree.add_child(Node::new(), root_id).unwrap();
    /// let right = tree.add_child(Node::new().with_dist(0.1).unwrap(), root_id).unwrap();
    ///
    /// assert_eq!(tree.get(&root_id).unwrap().children(), &[left, right]);
    /// assert_eq!(tree.get(&right).unwrap().parent(), Some(root_id));
    ///
    /// // Nodes get a unit edge length by default
    /// assert_eq!(tree.get(&left).unwrap().dist(), 1.0);
    /// assert_eq!(tree.get(&right).unwrap().dist(), 0.1);
    /// ```
    pub fn add_child(&mut self, node: Node, parent: NodeId) -> Result<NodeId, TreeError> {
        self.get(&parent)?;

        let id = self.add(node);
        self.nodes[id].parent = Some(parent);
        self.nodes[parent].children.push(id);

        Ok(id)
    }

    /// Get a reference to a specific Node of the tree
    pub fn get(&self, id: &NodeId) -> Result<&Node, TreeError> {
        if *id >= self.nodes.len() {
            return Err(TreeError::NodeNotFound(*id));
        }
        let node = &self.nodes[*id];
        if node.deleted {
            return Err(TreeError::NodeNotFound(*id));
        }

        Ok(node)
    }

    /// Get a mutable reference to a specific Node of the tree
    pub fn get_mut(&mut self, id: &NodeId) -> Result<&mut Node, TreeError> {
        if *id >= self.nodes.len() {
            return Err(TreeError::NodeNotFound(*id));
        }
        let node = &mut self.nodes[*id];
        if node.deleted {
            return Err(TreeError::NodeNotFound(*id));
        }

        Ok(node)
    }

    /// Get the root of the tree, i.e. the root of the component holding the
    /// first node that was added.
    pub fn get_root(&self) -> Result<NodeId, TreeError> {
        self.root.ok_or(TreeError::IsEmpty)
    }

    /// Iterate over every live node of the arena, detached components included
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| !node.deleted)
    }

    /// Get a reference to a node in the tree by name.
    /// Note that this does not check for name unicity, if several nodes
    /// match a name this function will return the first match in the arena.
    /// If you need a unique match use [`Tree::translate_names`].
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root_idx = tree.add(Node::new_named("root"));
    /// let child_idx = tree.add_child(Node::new_named("child"), root_idx).unwrap();
    ///
    /// assert_eq!(tree.get_by_name("child"), Some(tree.get(&child_idx).unwrap()));
    /// ```
    pub fn get_by_name(&self, name: &str) -> Option<&Node> {
        self.iter().find(|node| node.name == name)
    }

    /// Returns the ids of all live nodes that satisfy a condition
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let a = tree.add_child(Node::new_named("A").with_dist(0.5).unwrap(), root).unwrap();
    /// tree.add_child(Node::new_named("B"), root).unwrap();
    ///
    /// assert_eq!(tree.search_nodes(|node| node.dist() < 1.0), vec![a]);
    /// ```
    pub fn search_nodes(&self, cond: impl Fn(&Node) -> bool) -> Vec<NodeId> {
        self.iter()
            .filter(|node| cond(node))
            .map(|node| node.id)
            .collect()
    }

    /// Returns the leaves below `root` that carry a given name
    pub fn get_leaves_by_name(&self, root: &NodeId, name: &str) -> Result<Vec<NodeId>, TreeError> {
        Ok(self
            .get_leaves(root)?
            .into_iter()
            .filter(|id| self.nodes[*id].name == name)
            .collect())
    }

    /// Resolves node names to node ids within the subtree of `root`.
    /// Every name must match exactly one node.
    /// ```
    /// use phylonode::tree::{Tree, Node, TreeError};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let a = tree.add_child(Node::new_named("A"), root).unwrap();
    /// tree.add_child(Node::new_named("B"), root).unwrap();
    /// tree.add_child(Node::new_named("B"), root).unwrap();
    ///
    /// assert_eq!(tree.translate_names(&root, &["A"]).unwrap(), vec![a]);
    /// assert!(matches!(
    ///     tree.translate_names(&root, &["B"]),
    ///     Err(TreeError::AmbiguousName(_))
    /// ));
    /// assert!(matches!(
    ///     tree.translate_names(&root, &["Z"]),
    ///     Err(TreeError::NameNotFound(_))
    /// ));
    /// ```
    pub fn translate_names(&self, root: &NodeId, names: &[&str]) -> Result<Vec<NodeId>, TreeError> {
        let mut lookup: HashMap<&str, Vec<NodeId>> = HashMap::new();
        for id in self.preorder(root)? {
            lookup.entry(self.nodes[id].name.as_str()).or_default().push(id);
        }

        names
            .iter()
            .map(|name| match lookup.get(name).map(Vec::as_slice) {
                Some([id]) => Ok(*id),
                Some([_, _, ..]) => Err(TreeError::AmbiguousName(name.to_string())),
                _ => Err(TreeError::NameNotFound(name.to_string())),
            })
            .collect()
    }
}

/// Methods to read and write typed [`Feature`] values on [`Node`] objects.
///
/// ----
/// ----
impl Tree {
    // ############
    // # FEATURES #
    // ############

    /// Sets a feature on a node. The `name`, `dist` and `support` keys write
    /// the built-in node fields and fail if the value cannot be converted.
    /// ```
    /// use phylonode::tree::{Tree, Node, Feature};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let a = tree.add_child(Node::new_named("A"), root).unwrap();
    ///
    /// tree.set_feature(&a, "habitat", "marine").unwrap();
    /// tree.set_feature(&a, "dist", "0.25").unwrap();
    ///
    /// assert_eq!(tree.get(&a).unwrap().dist(), 0.25);
    /// assert_eq!(tree.get_attribute(&a, "habitat").unwrap(), Feature::from("marine"));
    /// assert!(tree.set_feature(&a, "support", true).is_err());
    /// ```
    pub fn set_feature(
        &mut self,
        node: &NodeId,
        key: &str,
        value: impl Into<Feature>,
    ) -> Result<(), TreeError> {
        let value = value.into();
        let target = self.get_mut(node)?;
        match key {
            "name" => target.set_name(value.to_string()),
            "dist" => target.set_dist(value.to_float(key)?)?,
            "support" => target.set_support(value.to_float(key)?)?,
            _ => {
                self.features
                    .entry(key.to_owned())
                    .or_default()
                    .insert(*node, value);
            }
        }

        Ok(())
    }

    /// Gets a user-defined feature of a node, if it was set
    pub fn get_feature(&self, node: &NodeId, key: &str) -> Option<&Feature> {
        self.features.get(key).and_then(|values| values.get(node))
    }

    /// Removes a user-defined feature from a node, returning its value
    pub fn remove_feature(&mut self, node: &NodeId, key: &str) -> Option<Feature> {
        let values = self.features.get_mut(key)?;
        let removed = values.remove(node);
        if values.is_empty() {
            self.features.remove(key);
        }
        removed
    }

    /// Names of the user-defined features set on at least one node, sorted
    pub fn feature_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.features.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Reads a built-in field (`name`, `dist`, `support`) or a user-defined
    /// feature of a node.
    pub fn get_attribute(&self, node: &NodeId, key: &str) -> Result<Feature, TreeError> {
        let target = self.get(node)?;
        match key {
            "name" => Ok(Feature::Text(target.name.clone())),
            "dist" => Ok(Feature::Float(target.dist)),
            "support" => Ok(Feature::Float(target.support)),
            _ => self
                .get_feature(node, key)
                .cloned()
                .ok_or_else(|| TreeError::FeatureNotFound {
                    node: *node,
                    key: key.to_owned(),
                }),
        }
    }

    /// Forget every feature of a node that is being removed from the arena
    pub(crate) fn drop_features(&mut self, node: &NodeId) {
        self.features.retain(|_, values| {
            values.remove(node);
            !values.is_empty()
        });
    }
}

/// Methods that compute characteristics and measures to describe the [`Tree`]
///
/// ----
/// ----
impl Tree {
    // #######################################
    // # GETTING CHARACTERISTICS OF THE TREE #
    // #######################################

    /// Checks if the tree is rooted, i.e. the root has at most two children
    pub fn is_rooted(&self) -> Result<bool, TreeError> {
        let root = self.get_root()?;

        Ok(self.nodes[root].children.len() <= 2)
    }

    /// Checks that no node has more than two children. Unary nodes are
    /// accepted. When `include_root` is false the root is not checked at all.
    pub fn is_bifurcating(&self, include_root: bool) -> Result<bool, TreeError> {
        let root = self.get_root()?;
        for id in self.preorder(&root)? {
            if id == root && !include_root {
                continue;
            }
            if self.nodes[id].children.len() > 2 {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Returns the number of nodes in the tree
    pub fn size(&self) -> Result<usize, TreeError> {
        Ok(self.preorder(&self.get_root()?)?.count())
    }

    /// Returns the number of leaves in the tree
    pub fn n_leaves(&self) -> Result<usize, TreeError> {
        Ok(self.get_leaves(&self.get_root()?)?.len())
    }

    /// Returns the height of the tree
    /// (i.e. the largest distance from the root to a leaf)
    pub fn height(&self) -> Result<EdgeLength, TreeError> {
        let root = self.get_root()?;

        Ok(self
            .distances_to_descendants(&root, false)?
            .into_iter()
            .filter(|(id, _)| self.nodes[*id].is_leaf())
            .map(|(_, d)| d)
            .fold(0.0, f64::max))
    }

    /// Returns the total length of the tree
    /// (i.e. the sum of all edge lengths below the root)
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// tree.add_child(Node::new().with_dist(0.1).unwrap(), root).unwrap();
    /// tree.add_child(Node::new().with_dist(0.2).unwrap(), root).unwrap();
    ///
    /// assert!((tree.length().unwrap() - 0.3).abs() < 1e-12);
    /// ```
    pub fn length(&self) -> Result<EdgeLength, TreeError> {
        let root = self.get_root()?;

        Ok(self
            .preorder(&root)?
            .filter(|id| *id != root)
            .map(|id| self.nodes[id].dist)
            .sum_with_accumulator::<Sum2<_>>())
    }
}

/// Methods to render a [`Tree`] as text.
///
/// ----
/// ----
impl Tree {
    // ###################
    // # PRINT THE TREE  #
    // ###################

    fn build_printable(&self, root: &NodeId, debug: bool) -> Result<ptree::item::StringItem, TreeError> {
        let label = |node: &Node| {
            if debug {
                format!("{node:?}")
            } else {
                format!("{node}")
            }
        };

        let mut builder = TreeBuilder::new(label(self.get(root)?));
        for (is_post, id) in self.prepostorder(root)? {
            if id == *root {
                continue;
            }
            let node = &self.nodes[id];
            match (node.is_leaf(), is_post) {
                (true, false) => {
                    builder.add_empty_child(label(node));
                }
                (false, false) => {
                    builder.begin_child(label(node));
                }
                (false, true) => {
                    builder.end_child();
                }
                (true, true) => {}
            }
        }

        Ok(builder.build())
    }

    /// Renders the subtree of `root` as an indented text tree
    pub fn to_ascii(&self, root: &NodeId) -> Result<String, TreeError> {
        let printable = self.build_printable(root, false)?;
        let mut buffer = Vec::new();
        write_tree(&printable, &mut buffer)?;

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Print a debug view of the subtree of `root` to the console
    pub fn print_debug(&self, root: &NodeId) -> Result<(), TreeError> {
        let printable = self.build_printable(root, true)?;
        print_tree(&printable)?;
        Ok(())
    }

    /// Print the subtree of `root` to the console
    pub fn print(&self, root: &NodeId) -> Result<(), TreeError> {
        let printable = self.build_printable(root, false)?;
        print_tree(&printable)?;
        Ok(())
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::test_utils::{build_tree, id, names};

    /// Generates example tree from the tree traversal wikipedia page
    /// https://en.wikipedia.org/wiki/Tree_traversal#Depth-first_search
    /// The difference is that I is the left child of G since this tree structure
    /// cannot represent a right child only.
    fn build_simple_tree() -> Result<Tree, TreeError> {
        let mut tree = Tree::new();
        tree.add(Node::new_named("F")); // 0
        tree.add_child(Node::new_named("B"), 0)?; // 1
        tree.add_child(Node::new_named("G"), 0)?; // 2
        tree.add_child(Node::new_named("A"), 1)?; // 3
        tree.add_child(Node::new_named("D"), 1)?; // 4
        tree.add_child(Node::new_named("I"), 2)?; // 5
        tree.add_child(Node::new_named("C"), 4)?; // 6
        tree.add_child(Node::new_named("E"), 4)?; // 7
        tree.add_child(Node::new_named("H"), 5)?; // 8

        Ok(tree)
    }

    #[test]
    fn first_node_is_root() {
        let mut tree = Tree::new();
        assert!(matches!(tree.get_root(), Err(TreeError::IsEmpty)));

        let root = tree.add(Node::new_named("root"));
        let other = tree.add(Node::new_named("floating"));
        assert_eq!(tree.get_root().unwrap(), root);
        assert!(tree.get(&other).unwrap().is_root());
    }

    #[test]
    fn add_child_to_missing_parent() {
        let mut tree = build_simple_tree().unwrap();
        assert!(matches!(
            tree.add_child(Node::new(), 42),
            Err(TreeError::NodeNotFound(42))
        ));
        // The failed call did not leave a node behind
        assert_eq!(tree.iter().count(), 9);
    }

    #[test]
    fn links_are_symmetric() {
        let tree = build_simple_tree().unwrap();
        for node in tree.iter() {
            for child in node.children() {
                assert_eq!(tree.get(child).unwrap().parent(), Some(node.id()));
            }
            if let Some(parent) = node.parent() {
                assert!(tree.get(&parent).unwrap().children().contains(&node.id()));
            }
        }
    }

    #[test]
    fn characteristics() {
        let tree = build_simple_tree().unwrap();
        assert_eq!(tree.size().unwrap(), 9);
        assert_eq!(tree.n_leaves().unwrap(), 4);
        assert!(tree.is_rooted().unwrap());
        // G and I are unary
        assert!(tree.is_bifurcating(true).unwrap());
        assert_eq!(tree.height().unwrap(), 3.0);
        assert_eq!(tree.length().unwrap(), 8.0);

        let binary = build_tree("((A,B),(C,D));");
        assert!(binary.is_bifurcating(true).unwrap());

        let unrooted = build_tree("(A,B,(C,D));");
        assert!(!unrooted.is_rooted().unwrap());
        assert!(!unrooted.is_bifurcating(true).unwrap());
        assert!(unrooted.is_bifurcating(false).unwrap());
    }

    #[test]
    fn bifurcating_ignores_root_and_unary_nodes() {
        let star = build_tree("(A,B,C,D)R;");
        assert!(!star.is_bifurcating(true).unwrap());
        assert!(star.is_bifurcating(false).unwrap());

        let unary = build_tree("((A)X,B)R;");
        assert!(unary.is_bifurcating(true).unwrap());
        assert!(unary.is_bifurcating(false).unwrap());

        let inner_polytomy = build_tree("((A,B,C)X,D)R;");
        assert!(!inner_polytomy.is_bifurcating(false).unwrap());
    }

    #[test]
    fn name_lookup() {
        let tree = build_tree("((A,B)C,(A,D)E)F;");
        let root = tree.get_root().unwrap();

        assert_eq!(tree.get_leaves_by_name(&root, "A").unwrap().len(), 2);
        assert!(matches!(
            tree.translate_names(&root, &["A"]),
            Err(TreeError::AmbiguousName(name)) if name == "A"
        ));

        let c = id(&tree, "C");
        let found = tree.translate_names(&c, &["A", "B"]).unwrap();
        assert_eq!(names(&tree, &found), vec!["A", "B"]);
    }

    #[test]
    fn features() {
        let mut tree = build_tree("((A,B)C,D);");
        let a = id(&tree, "A");
        let d = id(&tree, "D");

        tree.set_feature(&a, "rate", 0.5).unwrap();
        tree.set_feature(&d, "rate", 2_i64).unwrap();
        tree.set_feature(&d, "name", "Z").unwrap();

        assert_eq!(tree.get(&d).unwrap().name, "Z");
        assert_eq!(tree.get_feature(&a, "rate"), Some(&Feature::Float(0.5)));
        assert_eq!(tree.get_attribute(&d, "rate").unwrap(), Feature::Int(2));
        assert_eq!(tree.get_attribute(&d, "dist").unwrap(), Feature::Float(1.0));
        assert!(matches!(
            tree.get_attribute(&a, "color"),
            Err(TreeError::FeatureNotFound { key, .. }) if key == "color"
        ));
        assert!(matches!(
            tree.set_feature(&a, "dist", "long"),
            Err(TreeError::NodeError(NodeError::TypeMismatch { .. }))
        ));
        assert_eq!(tree.feature_names(), vec!["rate"]);

        assert_eq!(tree.remove_feature(&a, "rate"), Some(Feature::Float(0.5)));
        tree.drop_features(&d);
        assert!(tree.feature_names().is_empty());
    }

    #[test]
    fn ascii_rendering() {
        let tree = build_tree("((A,B)C,D)R;");
        let root = tree.get_root().unwrap();
        let rendered = tree.to_ascii(&root).unwrap();

        let first_line = rendered.lines().next().unwrap();
        assert!(first_line.contains("\"R\""));
        for name in ["A", "B", "C", "D"] {
            assert!(rendered.contains(&format!("{name:?}")));
        }
        assert_eq!(rendered.lines().count(), 5);
    }
}
