//! A node graph for phylogenetic trees.
//!
//! Nodes are stored in an arena owned by a [`tree::Tree`] and refer to each
//! other through [`tree::NodeId`] handles. The tree can be walked lazily,
//! edited (rerooting, pruning, polytomy resolution, ...), queried for
//! patristic distances and summarized in an all-pairs [`distance::DistanceMatrix`].
//!
//! ```
//! use phylonode::tree::{Tree, Node};
//!
//! let mut tree = Tree::new();
//! let root = tree.add(Node::new_named("R"));
//! let inner = tree.add_child(Node::new(), root).unwrap();
//! let a = tree.add_child(Node::new_named("A"), inner).unwrap();
//! let b = tree.add_child(Node::new_named("B"), inner).unwrap();
//! let c = tree.add_child(Node::new_named("C"), root).unwrap();
//!
//! assert_eq!(tree.get_leaf_names(&root).unwrap(), vec!["A", "B", "C"]);
//! assert_eq!(tree.get_node_distance(&a, &c, false).unwrap(), 3.0);
//!
//! tree.set_outgroup(&root, &c).unwrap();
//! assert_eq!(tree.get_common_ancestor(&[a, b]).unwrap(), inner);
//!
//! let matrix = tree.tip_distance_matrix(&root, true).unwrap();
//! assert_eq!(matrix.get(&a, &b).unwrap(), 2.0);
//! ```

pub mod distance;
pub mod tree;

pub use distance::{DistanceMatrix, MatrixError};
pub use tree::{Node, NodeId, Tree, TreeError};
