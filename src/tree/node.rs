use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{EdgeLength, NodeId, DEFAULT_EDGE_LENGTH, DEFAULT_SUPPORT};

/// Errors that can occur when manipulating [`Node`] structs.
#[derive(Error, Debug)]
pub enum NodeError {
    /// We are trying to access the an unexisting child of the node
    #[error("Node {parent} does not have child {child}.")]
    HasNoChild {
        /// Id of the parent node
        parent: NodeId,
        /// Id of the inexistant child node
        child: NodeId,
    },
    /// We are trying to store a NaN or infinite number in a numeric field
    #[error("The {field} of a node must be a finite number, got {value}")]
    NonFinite {
        /// Name of the numeric field
        field: &'static str,
        /// Rejected value
        value: f64,
    },
    /// A value could not be converted to the type a field requires
    #[error("Cannot use a {found} value for '{key}', expected {expected}")]
    TypeMismatch {
        /// Field or feature name
        key: String,
        /// Type the field requires
        expected: &'static str,
        /// Type of the value that was given
        found: &'static str,
    },
}

fn check_finite(field: &'static str, value: f64) -> Result<f64, NodeError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(NodeError::NonFinite { field, value })
    }
}

/// A node of the Tree
///
/// Topology (parent and children) is owned by the [`Tree`](super::Tree)
/// arena and can only be changed through its methods, which keep the
/// parent/child links of both ends consistent.
#[derive(Clone, Serialize, Deserialize)]
pub struct Node {
    /// Index of the node in the tree arena
    pub(crate) id: NodeId,
    /// Name of the node, empty by default
    pub name: String,
    /// Index of the parent node
    pub(crate) parent: Option<NodeId>,
    /// Indices of child nodes, in order
    pub(crate) children: Vec<NodeId>,
    /// Length of the branch between the parent and this node
    pub(crate) dist: EdgeLength,
    /// Support value of the branch between the parent and this node
    pub(crate) support: f64,
    // Whether the node is deleted or not
    pub(crate) deleted: bool,
}

impl Node {
    /// Creates a new unnamed Node with default edge length and support
    pub fn new() -> Self {
        Self {
            id: 0,
            name: String::new(),
            parent: None,
            children: vec![],
            dist: DEFAULT_EDGE_LENGTH,
            support: DEFAULT_SUPPORT,
            deleted: false,
        }
    }

    /// Creates a new named Node
    pub fn new_named(name: &str) -> Self {
        Self {
            name: String::from(name),
            ..Self::new()
        }
    }

    /// Sets the length of the edge above the node, consuming and returning it.
    /// ```
    /// use phylonode::tree::Node;
    ///
    /// let node = Node::new_named("A").with_dist(0.5).unwrap();
    /// assert_eq!(node.dist(), 0.5);
    ///
    /// assert!(Node::new().with_dist(f64::NAN).is_err());
    /// ```
    pub fn with_dist(mut self, dist: EdgeLength) -> Result<Self, NodeError> {
        self.set_dist(dist)?;
        Ok(self)
    }

    /// Sets the support of the edge above the node, consuming and returning it.
    pub fn with_support(mut self, support: f64) -> Result<Self, NodeError> {
        self.set_support(support)?;
        Ok(self)
    }

    /// Index of the node in its tree
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Index of the parent node, `None` for a root
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Ordered indices of the child nodes
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Length of the edge between the node and its parent
    pub fn dist(&self) -> EdgeLength {
        self.dist
    }

    /// Support value of the edge between the node and its parent
    pub fn support(&self) -> f64 {
        self.support
    }

    /// Sets the internal Node name
    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Sets the length of the edge above the node. Negative lengths are
    /// accepted, non-finite ones are not.
    pub fn set_dist(&mut self, dist: EdgeLength) -> Result<(), NodeError> {
        self.dist = check_finite("dist", dist)?;
        Ok(())
    }

    /// Sets the support of the edge above the node.
    pub fn set_support(&mut self, support: f64) -> Result<(), NodeError> {
        self.support = check_finite("support", support)?;
        Ok(())
    }

    /// Check if the node is a leaf node
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Check if the node is a root node
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Empties the node and sets it as deleted
    pub(crate) fn delete(&mut self) {
        let id = self.id;
        *self = Self::new();
        self.id = id;
        self.deleted = true;
    }

    /// Removes the child from the node, returning the position it occupied
    pub(crate) fn remove_child(&mut self, child: &NodeId) -> Result<usize, NodeError> {
        let vec_index = match self.children.iter().position(|node_id| node_id == child) {
            Some(idx) => idx,
            None => {
                return Err(NodeError::HasNoChild {
                    parent: self.id,
                    child: *child,
                })
            }
        };

        self.children.remove(vec_index);

        Ok(vec_index)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        if self.parent.is_none() != other.parent.is_none() {
            return false;
        }

        self.name == other.name
            && self.children.len() == other.children.len()
            && (self.dist - other.dist).abs() < f64::EPSILON
            && (self.support - other.support).abs() < f64::EPSILON
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}) {:?}", self.dist, self.name)
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}) {:?} Id[{}] Parent[{:?}] Support[{}] Children({:?})",
            self.dist, self.name, self.id, self.parent, self.support, self.children,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let node = Node::new();
        assert_eq!(node.name, "");
        assert_eq!(node.dist(), 1.0);
        assert_eq!(node.support(), 0.0);
        assert!(node.is_leaf());
        assert!(node.is_root());
    }

    #[test]
    fn reject_non_finite_values() {
        let mut node = Node::new_named("A");
        assert!(matches!(
            node.set_dist(f64::INFINITY),
            Err(NodeError::NonFinite { field: "dist", .. })
        ));
        assert!(matches!(
            node.set_support(f64::NAN),
            Err(NodeError::NonFinite {
                field: "support",
                ..
            })
        ));
        // Failed writes leave the node untouched
        assert_eq!(node.dist(), 1.0);

        node.set_dist(-0.5).unwrap();
        assert_eq!(node.dist(), -0.5);
    }

    #[test]
    fn remove_missing_child() {
        let mut node = Node::new();
        node.id = 3;
        node.children = vec![4, 5];

        assert_eq!(node.remove_child(&5).unwrap(), 1);
        assert!(matches!(
            node.remove_child(&5),
            Err(NodeError::HasNoChild {
                parent: 3,
                child: 5
            })
        ));
        assert_eq!(node.children(), &[4]);
    }

    #[test]
    fn delete_keeps_id() {
        let mut node = Node::new_named("A").with_dist(0.3).unwrap();
        node.id = 7;
        node.delete();
        assert!(node.deleted);
        assert_eq!(node.id(), 7);
        assert_eq!(node.name, "");
    }
}
