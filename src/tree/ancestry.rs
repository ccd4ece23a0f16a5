use accurate::sum::Sum2;
use accurate::traits::*;
use std::collections::{HashMap, HashSet};

use super::node::Node;
use super::tree_impl::{Tree, TreeError};
use super::{EdgeLength, NodeId};

/// A node found by a distance query, with its distance to the query node
pub type LeafDistance = (NodeId, EdgeLength);

/// Methods to find paths in a [`Tree`] as well as measure distances between [`Node`] objects.
///
/// Topology-only distances count edges.
///
/// ----
/// ----
impl Tree {
    // ##########################
    // # FIND PATHS IN THE TREE #
    // ##########################

    fn edge_length(node: &Node, topology_only: bool) -> EdgeLength {
        if topology_only {
            1.0
        } else {
            node.dist
        }
    }

    /// Nodes from `from` up to `ancestor`, `ancestor` excluded
    fn climb(&self, from: NodeId, ancestor: NodeId) -> Vec<NodeId> {
        let mut path = vec![];
        let mut current = Some(from);
        while let Some(id) = current {
            if id == ancestor {
                break;
            }
            path.push(id);
            current = self.nodes[id].parent;
        }

        path
    }

    /// Returns the most recent common ancestor of a group of nodes. A node
    /// is its own ancestor, so the ancestor of a single node is itself.
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let inner = tree.add_child(Node::new(), root).unwrap();
    /// let c = tree.add_child(Node::new(), root).unwrap();
    /// let a = tree.add_child(Node::new(), inner).unwrap();
    /// let b = tree.add_child(Node::new(), inner).unwrap();
    ///
    /// assert_eq!(tree.get_common_ancestor(&[a, b]).unwrap(), inner);
    /// assert_eq!(tree.get_common_ancestor(&[a, b, c]).unwrap(), root);
    /// assert_eq!(tree.get_common_ancestor(&[a, inner]).unwrap(), inner);
    /// ```
    pub fn get_common_ancestor(&self, nodes: &[NodeId]) -> Result<NodeId, TreeError> {
        Ok(self.get_common_ancestor_with_paths(nodes)?.0)
    }

    /// Common ancestor of the nodes, and the path from each node up to the
    /// root of its component, both ends included.
    pub(crate) fn get_common_ancestor_with_paths(
        &self,
        nodes: &[NodeId],
    ) -> Result<(NodeId, HashMap<NodeId, Vec<NodeId>>), TreeError> {
        let (first, rest) = nodes.split_first().ok_or(TreeError::EmptyQuery)?;

        let mut paths = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let path: Vec<NodeId> = std::iter::once(*node).chain(self.ancestors(node)?).collect();
            paths.insert(*node, path);
        }

        let others: Vec<HashSet<NodeId>> = rest
            .iter()
            .map(|node| paths[node].iter().copied().collect())
            .collect();
        let common = paths[first]
            .iter()
            .find(|id| others.iter().all(|path| path.contains(id)))
            .copied()
            .ok_or(TreeError::DisconnectedNodes)?;

        Ok((common, paths))
    }

    /// Returns the nodes on the path between two nodes, both included,
    /// going through their common ancestor.
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let left = tree.add_child(Node::new(), root).unwrap();
    /// let right = tree.add_child(Node::new(), root).unwrap();
    /// let a = tree.add_child(Node::new(), left).unwrap();
    /// let d = tree.add_child(Node::new(), right).unwrap();
    ///
    /// assert_eq!(tree.get_node_path(&a, &d).unwrap(), vec![a, left, root, right, d]);
    /// assert_eq!(tree.get_node_path(&root, &a).unwrap(), vec![root, left, a]);
    /// ```
    pub fn get_node_path(&self, source: &NodeId, target: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        let common = self.get_common_ancestor(&[*source, *target])?;

        let mut path = self.climb(*source, common);
        path.push(common);
        path.extend(self.climb(*target, common).into_iter().rev());

        Ok(path)
    }

    /// Gets the distance between two nodes: the sum of the edge lengths on
    /// the path between them, or the number of edges with `topology_only`.
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let a = tree.add_child(Node::new().with_dist(0.5).unwrap(), root).unwrap();
    /// let inner = tree.add_child(Node::new().with_dist(0.2).unwrap(), root).unwrap();
    /// let b = tree.add_child(Node::new().with_dist(0.1).unwrap(), inner).unwrap();
    ///
    /// assert!((tree.get_node_distance(&a, &b, false).unwrap() - 0.8).abs() < 1e-12);
    /// assert_eq!(tree.get_node_distance(&a, &b, true).unwrap(), 3.0);
    /// assert_eq!(tree.get_node_distance(&a, &a, false).unwrap(), 0.0);
    /// ```
    pub fn get_node_distance(
        &self,
        source: &NodeId,
        target: &NodeId,
        topology_only: bool,
    ) -> Result<EdgeLength, TreeError> {
        if source == target {
            self.get(source)?;
            return Ok(0.0);
        }

        let common = self.get_common_ancestor(&[*source, *target])?;
        let mut dist: Sum2<f64> = Sum2::zero();
        for node in self
            .climb(*source, common)
            .into_iter()
            .chain(self.climb(*target, common))
        {
            dist += Self::edge_length(&self.nodes[node], topology_only);
        }

        Ok(dist.sum())
    }

    /// Distance from a node to the root of its component
    pub fn dist_to_root(&self, node: &NodeId, topology_only: bool) -> Result<EdgeLength, TreeError> {
        let root = self.get_tree_root(node)?;

        Ok(self
            .climb(*node, root)
            .into_iter()
            .map(|id| Self::edge_length(&self.nodes[id], topology_only))
            .sum_with_accumulator::<Sum2<_>>())
    }

    /// Distance from `root` to every node of its subtree, `root` included
    pub fn distances_to_descendants(
        &self,
        root: &NodeId,
        topology_only: bool,
    ) -> Result<HashMap<NodeId, EdgeLength>, TreeError> {
        let mut distances = HashMap::new();
        for id in self.preorder(root)? {
            let node = &self.nodes[id];
            let dist = match node.parent {
                Some(parent) if id != *root => {
                    distances.get(&parent).copied().unwrap_or(0.0)
                        + Self::edge_length(node, topology_only)
                }
                _ => 0.0,
            };
            distances.insert(id, dist);
        }

        Ok(distances)
    }

    // ############################
    // # FARTHEST AND CLOSEST     #
    // ############################

    fn leaf_sweep<F>(
        &self,
        node: &NodeId,
        topology_only: bool,
        is_leaf: F,
        farthest: bool,
    ) -> Result<LeafDistance, TreeError>
    where
        F: Fn(&Node) -> bool,
    {
        let start = self.get(node)?;
        if start.is_leaf() || is_leaf(start) {
            return Ok((*node, 0.0));
        }

        let mut depth = 0.0;
        let mut best: Option<LeafDistance> = None;
        for (is_post, id) in self.prepostorder_with(node, &is_leaf)? {
            if id == *node {
                continue;
            }
            let current = &self.nodes[id];
            let edge = Self::edge_length(current, topology_only);

            if current.is_leaf() || is_leaf(current) {
                if is_post {
                    continue;
                }
                let total = depth + edge;
                let better = match best {
                    None => true,
                    Some((_, d)) if farthest => total > d,
                    Some((_, d)) => total < d,
                };
                if better {
                    best = Some((id, total));
                }
            } else if is_post {
                depth -= edge;
            } else {
                depth += edge;
            }
        }

        best.ok_or(TreeError::NodeNotFound(*node))
    }

    /// Returns the leaf of the subtree of `node` farthest from it, and its
    /// distance. The first one in preorder wins ties. A leaf is its own
    /// farthest leaf, at distance 0.
    pub fn get_farthest_leaf(&self, node: &NodeId, topology_only: bool) -> Result<LeafDistance, TreeError> {
        self.leaf_sweep(node, topology_only, Node::is_leaf, true)
    }

    /// Same as [`Tree::get_farthest_leaf`], nodes matching `is_leaf` being
    /// treated as leaves.
    pub fn get_farthest_leaf_with<F>(
        &self,
        node: &NodeId,
        topology_only: bool,
        is_leaf: F,
    ) -> Result<LeafDistance, TreeError>
    where
        F: Fn(&Node) -> bool,
    {
        self.leaf_sweep(node, topology_only, is_leaf, true)
    }

    /// Returns the leaf of the subtree of `node` closest to it, and its
    /// distance.
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let a = tree.add_child(Node::new().with_dist(3.0).unwrap(), root).unwrap();
    /// let inner = tree.add_child(Node::new().with_dist(0.5).unwrap(), root).unwrap();
    /// let b = tree.add_child(Node::new().with_dist(0.5).unwrap(), inner).unwrap();
    ///
    /// assert_eq!(tree.get_closest_leaf(&root, false).unwrap(), (b, 1.0));
    /// assert_eq!(tree.get_closest_leaf(&root, true).unwrap(), (a, 1.0));
    /// assert_eq!(tree.get_farthest_leaf(&root, false).unwrap(), (a, 3.0));
    /// ```
    pub fn get_closest_leaf(&self, node: &NodeId, topology_only: bool) -> Result<LeafDistance, TreeError> {
        self.leaf_sweep(node, topology_only, Node::is_leaf, false)
    }

    /// Same as [`Tree::get_closest_leaf`], nodes matching `is_leaf` being
    /// treated as leaves.
    pub fn get_closest_leaf_with<F>(
        &self,
        node: &NodeId,
        topology_only: bool,
        is_leaf: F,
    ) -> Result<LeafDistance, TreeError>
    where
        F: Fn(&Node) -> bool,
    {
        self.leaf_sweep(node, topology_only, is_leaf, false)
    }

    /// Farthest leaf from `node` in the whole component, climbing no higher
    /// than `boundary` when one is given.
    fn farthest_node_within(
        &self,
        node: &NodeId,
        topology_only: bool,
        boundary: Option<NodeId>,
    ) -> Result<LeafDistance, TreeError> {
        let (mut best_node, mut best_dist) = self.get_farthest_leaf(node, topology_only)?;

        let mut previous = *node;
        let mut climbed = Self::edge_length(&self.nodes[*node], topology_only);
        let mut current = if boundary == Some(*node) {
            None
        } else {
            self.nodes[*node].parent
        };

        while let Some(ancestor) = current {
            for sister in self.nodes[ancestor].children.iter() {
                if *sister == previous {
                    continue;
                }
                let (leaf, below) = self.get_farthest_leaf(sister, topology_only)?;
                let total = climbed + Self::edge_length(&self.nodes[*sister], topology_only) + below;
                if total > best_dist {
                    best_node = leaf;
                    best_dist = total;
                }
            }

            if boundary == Some(ancestor) {
                break;
            }
            climbed += Self::edge_length(&self.nodes[ancestor], topology_only);
            previous = ancestor;
            current = self.nodes[ancestor].parent;
        }

        Ok((best_node, best_dist))
    }

    /// Returns the leaf farthest from `node` anywhere in its component,
    /// with its distance.
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let a = tree.add_child(Node::new(), root).unwrap();
    /// let inner = tree.add_child(Node::new(), root).unwrap();
    /// let b = tree.add_child(Node::new().with_dist(4.0).unwrap(), inner).unwrap();
    ///
    /// assert_eq!(tree.get_farthest_node(&a, false).unwrap(), (b, 6.0));
    /// ```
    pub fn get_farthest_node(&self, node: &NodeId, topology_only: bool) -> Result<LeafDistance, TreeError> {
        self.farthest_node_within(node, topology_only, None)
    }

    /// Returns the node below the edge holding the midpoint of the longest
    /// leaf to leaf path of the subtree of `root`. Rerooting on it
    /// ([`Tree::root_on_midpoint`]) balances the two root children.
    /// A subtree with no positive edge length returns its farthest leaf.
    pub fn get_midpoint_outgroup(&self, root: &NodeId) -> Result<NodeId, TreeError> {
        let (start, _) = self.get_farthest_leaf(root, false)?;
        let (end, diameter) = self.farthest_node_within(&start, false, Some(*root))?;
        let half = diameter / 2.0;

        let mut walked = 0.0;
        for step in self.get_node_path(&start, &end)?.windows(2) {
            let (from, to) = (step[0], step[1]);
            let below = if self.nodes[from].parent == Some(to) {
                from
            } else {
                to
            };
            walked += self.nodes[below].dist;
            if walked > half {
                return Ok(below);
            }
        }

        Ok(start)
    }

    /// Distance from a node to the farthest leaf below it
    pub fn node_height(&self, node: &NodeId) -> Result<EdgeLength, TreeError> {
        Ok(self.get_farthest_leaf(node, false)?.1)
    }

    /// Returns the length of the longest path between two leaves of the tree
    pub fn diameter(&self) -> Result<EdgeLength, TreeError> {
        let root = self.get_root()?;
        let (start, _) = self.get_farthest_leaf(&root, false)?;

        Ok(self.farthest_node_within(&start, false, Some(root))?.1)
    }
}
