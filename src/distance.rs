//! Compute all pairwise node distances of a [`Tree`] at once
//!

use std::collections::HashMap;

use ndarray::{s, Array2, ArrayView2};
use thiserror::Error;
use tracing::trace;

use crate::tree::{EdgeLength, NodeId, Tree, TreeError};

/// Errors that can occur when querying a [`DistanceMatrix`].
#[derive(Error, Debug)]
pub enum MatrixError {
    /// We are trying to access a node that is not in the matrix
    #[error("Node {0} is not in the distance matrix")]
    MissingNode(NodeId),
}

/// Distances between every pair of nodes of a subtree.
///
/// Rows and columns follow the idx order of the subtree (see
/// [`Tree::idx_order`]): the leaves come first, so the leaf block is the top
/// left corner of the matrix.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    order: Vec<NodeId>,
    n_tips: usize,
    position: HashMap<NodeId, usize>,
    matrix: Array2<EdgeLength>,
}

impl DistanceMatrix {
    fn new(order: Vec<NodeId>, n_tips: usize, matrix: Array2<EdgeLength>) -> Self {
        let position = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        Self {
            order,
            n_tips,
            position,
            matrix,
        }
    }

    fn index(&self, node: &NodeId) -> Result<usize, MatrixError> {
        self.position
            .get(node)
            .copied()
            .ok_or(MatrixError::MissingNode(*node))
    }

    /// Get the distance between two nodes
    pub fn get(&self, source: &NodeId, target: &NodeId) -> Result<EdgeLength, MatrixError> {
        Ok(self.matrix[[self.index(source)?, self.index(target)?]])
    }

    /// Ids of the nodes, in row order
    pub fn nodes(&self) -> &[NodeId] {
        &self.order
    }

    /// Number of leaves at the start of the row order
    pub fn n_tips(&self) -> usize {
        self.n_tips
    }

    /// Number of rows of the matrix
    pub fn size(&self) -> usize {
        self.order.len()
    }

    /// The full square matrix
    pub fn as_array(&self) -> &Array2<EdgeLength> {
        &self.matrix
    }

    /// Leaf to leaf distances
    pub fn tip_matrix(&self) -> ArrayView2<'_, EdgeLength> {
        self.matrix.slice(s![..self.n_tips, ..self.n_tips])
    }

    /// Distances between internal nodes
    pub fn internal_matrix(&self) -> ArrayView2<'_, EdgeLength> {
        self.matrix.slice(s![self.n_tips.., self.n_tips..])
    }

    /// Returns the node farthest from `node` and its distance. The first one
    /// in row order wins ties.
    pub fn farthest(&self, node: &NodeId) -> Result<(NodeId, EdgeLength), MatrixError> {
        let row = self.matrix.row(self.index(node)?);
        let mut best = (*node, 0.0);
        for (col, dist) in row.iter().enumerate() {
            if *dist > best.1 {
                best = (self.order[col], *dist);
            }
        }

        Ok(best)
    }

    /// Keeps the rows and columns from `start` on, up to `end`
    fn restrict(&self, start: usize, end: usize, n_tips: usize) -> Self {
        Self::new(
            self.order[start..end].to_vec(),
            n_tips,
            self.matrix.slice(s![start..end, start..end]).to_owned(),
        )
    }
}

/// Methods to build [`DistanceMatrix`] structs from a [`Tree`].
///
/// ----
/// ----
impl Tree {
    /// Computes the distance between every pair of nodes in the subtree of
    /// `root`. This is done in a single postorder pass: every node keeps
    /// the distances to its descendants, so distances between nodes of two
    /// sister clades are the sum of two cached values.
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new_named("R"));
    /// let a = tree.add_child(Node::new_named("A").with_dist(0.5).unwrap(), root).unwrap();
    /// let b = tree.add_child(Node::new_named("B").with_dist(2.0).unwrap(), root).unwrap();
    ///
    /// let matrix = tree.node_distance_matrix(&root, false).unwrap();
    /// assert_eq!(matrix.nodes(), &[a, b, root]);
    /// assert_eq!(matrix.get(&a, &b).unwrap(), 2.5);
    /// assert_eq!(matrix.get(&b, &root).unwrap(), 2.0);
    /// assert_eq!(matrix.farthest(&a).unwrap(), (b, 2.5));
    /// ```
    pub fn node_distance_matrix(
        &self,
        root: &NodeId,
        topology_only: bool,
    ) -> Result<DistanceMatrix, TreeError> {
        let order = self.idx_order(root)?;
        let n_tips = order
            .iter()
            .take_while(|id| self.nodes[**id].is_leaf())
            .count();
        let position: HashMap<NodeId, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let n = order.len();
        let mut matrix = Array2::<EdgeLength>::zeros((n, n));
        let mut fill = |a: NodeId, b: NodeId, dist: EdgeLength| {
            let (i, j) = (position[&a], position[&b]);
            if i < j {
                matrix[[i, j]] = dist;
            } else {
                matrix[[j, i]] = dist;
            }
        };

        // Distances from a finished node to each of its descendants
        let mut below: HashMap<NodeId, Vec<(NodeId, EdgeLength)>> = HashMap::new();

        for id in self.postorder(root)? {
            let node = &self.nodes[id];

            let mut clades: Vec<Vec<(NodeId, EdgeLength)>> = Vec::with_capacity(node.children.len());
            for child in node.children.iter() {
                let edge = if topology_only {
                    1.0
                } else {
                    self.nodes[*child].dist
                };
                let mut clade = below.remove(child).unwrap_or_default();
                for (_, dist) in clade.iter_mut() {
                    *dist += edge;
                }
                clade.push((*child, edge));
                clades.push(clade);
            }

            for (i, clade) in clades.iter().enumerate() {
                for (desc, dist) in clade.iter() {
                    fill(id, *desc, *dist);
                    for other in clades[i + 1..].iter() {
                        for (cousin, cousin_dist) in other.iter() {
                            fill(*desc, *cousin, dist + cousin_dist);
                        }
                    }
                }
            }

            below.insert(id, clades.into_iter().flatten().collect());
        }

        for i in 0..n {
            for j in (i + 1)..n {
                matrix[[j, i]] = matrix[[i, j]];
            }
        }

        trace!(root = *root, size = n, tips = n_tips, "built distance matrix");

        Ok(DistanceMatrix::new(order, n_tips, matrix))
    }

    /// Distances between the leaves of the subtree of `root`
    pub fn tip_distance_matrix(
        &self,
        root: &NodeId,
        topology_only: bool,
    ) -> Result<DistanceMatrix, TreeError> {
        let full = self.node_distance_matrix(root, topology_only)?;
        Ok(full.restrict(0, full.n_tips, full.n_tips))
    }

    /// Distances between the internal nodes of the subtree of `root`. The
    /// resulting matrix holds no tips.
    pub fn internal_node_distance_matrix(
        &self,
        root: &NodeId,
        topology_only: bool,
    ) -> Result<DistanceMatrix, TreeError> {
        let full = self.node_distance_matrix(root, topology_only)?;
        Ok(full.restrict(full.n_tips, full.size(), 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;
    use itertools::Itertools;

    fn build_tree() -> Tree {
        // ((A:0.1,B:0.2)E:0.3,(C:0.4,D:0.5)F:0.6,G:0.7)R
        let mut tree = Tree::new();
        let r = tree.add(Node::new_named("R"));
        let e = tree
            .add_child(Node::new_named("E").with_dist(0.3).unwrap(), r)
            .unwrap();
        let f = tree
            .add_child(Node::new_named("F").with_dist(0.6).unwrap(), r)
            .unwrap();
        tree.add_child(Node::new_named("G").with_dist(0.7).unwrap(), r)
            .unwrap();
        for (name, dist, parent) in [("A", 0.1, e), ("B", 0.2, e), ("C", 0.4, f), ("D", 0.5, f)] {
            tree.add_child(Node::new_named(name).with_dist(dist).unwrap(), parent)
                .unwrap();
        }

        tree
    }

    fn named(tree: &Tree, name: &str) -> NodeId {
        tree.get_by_name(name).unwrap().id()
    }

    #[test]
    fn matches_pairwise_distances() {
        let tree = build_tree();
        let root = tree.get_root().unwrap();

        for topology_only in [false, true] {
            let matrix = tree.node_distance_matrix(&root, topology_only).unwrap();
            assert_eq!(matrix.size(), tree.size().unwrap());

            for (a, b) in matrix.nodes().iter().cartesian_product(matrix.nodes()) {
                let expected = tree.get_node_distance(a, b, topology_only).unwrap();
                let found = matrix.get(a, b).unwrap();
                assert!(
                    (expected - found).abs() < 1e-12,
                    "{a}-{b}: {found} instead of {expected}"
                );
            }
        }
    }

    #[test]
    fn idx_order_layout() {
        let tree = build_tree();
        let root = tree.get_root().unwrap();
        let matrix = tree.node_distance_matrix(&root, false).unwrap();

        let names: String = matrix
            .nodes()
            .iter()
            .map(|id| tree.get(id).unwrap().name.clone())
            .collect();
        assert_eq!(names, "ABCDGEFR");
        assert_eq!(matrix.n_tips(), 5);
        assert_eq!(matrix.tip_matrix().dim(), (5, 5));
        assert_eq!(matrix.internal_matrix().dim(), (3, 3));
        assert_eq!(matrix.as_array(), &matrix.as_array().t());
    }

    #[test]
    fn subtree_matrix() {
        let tree = build_tree();
        let e = named(&tree, "E");
        let a = named(&tree, "A");

        let matrix = tree.node_distance_matrix(&e, false).unwrap();
        assert_eq!(matrix.size(), 3);
        assert!((matrix.get(&a, &named(&tree, "B")).unwrap() - 0.3).abs() < 1e-12);
        assert!(matches!(
            matrix.get(&a, &named(&tree, "C")),
            Err(MatrixError::MissingNode(_))
        ));
    }

    #[test]
    fn tip_and_internal_matrices() {
        let tree = build_tree();
        let root = tree.get_root().unwrap();

        let tips = tree.tip_distance_matrix(&root, true).unwrap();
        assert_eq!(tips.size(), 5);
        assert_eq!(tips.n_tips(), 5);
        assert_eq!(tips.get(&named(&tree, "A"), &named(&tree, "C")).unwrap(), 4.0);
        assert_eq!(tips.get(&named(&tree, "A"), &named(&tree, "G")).unwrap(), 3.0);

        let internal = tree.internal_node_distance_matrix(&root, true).unwrap();
        assert_eq!(internal.size(), 3);
        assert_eq!(internal.n_tips(), 0);
        assert_eq!(internal.get(&named(&tree, "E"), &named(&tree, "F")).unwrap(), 2.0);
        assert!(internal.get(&named(&tree, "A"), &root).is_err());
    }

    #[test]
    fn farthest_node() {
        let tree = build_tree();
        let root = tree.get_root().unwrap();
        let matrix = tree.node_distance_matrix(&root, false).unwrap();

        let (far, dist) = matrix.farthest(&named(&tree, "A")).unwrap();
        assert_eq!(far, named(&tree, "D"));
        assert!((dist - 1.5).abs() < 1e-12);
    }

    #[test]
    fn single_node() {
        let mut tree = Tree::new();
        let root = tree.add(Node::new());
        let matrix = tree.node_distance_matrix(&root, false).unwrap();

        assert_eq!(matrix.size(), 1);
        assert_eq!(matrix.get(&root, &root).unwrap(), 0.0);
        assert_eq!(matrix.farthest(&root).unwrap(), (root, 0.0));
    }
}
