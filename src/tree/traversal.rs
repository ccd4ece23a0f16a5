use std::collections::VecDeque;

use trait_set::trait_set;

use super::node::Node;
use super::tree_impl::{Tree, TreeError};
use super::NodeId;

trait_set! {
    /// Predicate deciding whether a traversal treats a node as a leaf,
    /// i.e. visits it without descending into its children.
    pub trait LeafFn = Fn(&Node) -> bool;
}

/// Default leaf predicate: a node is a leaf when it has no children
pub type Structural = fn(&Node) -> bool;

fn structural() -> Structural {
    Node::is_leaf
}

/// Node visiting orders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// Parent before its children, children left to right
    PreOrder,
    /// Children left to right before their parent
    PostOrder,
    /// Breadth first, level by level
    LevelOrder,
}

/// Lazy preorder iterator, see [`Tree::preorder`]
#[derive(Clone)]
pub struct PreOrder<'a, F = Structural> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
    is_leaf: F,
}

impl<'a, F: LeafFn> Iterator for PreOrder<'a, F> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = &self.tree.nodes[id];
        if !(self.is_leaf)(node) {
            self.stack.extend(node.children.iter().rev());
        }

        Some(id)
    }
}

/// Lazy postorder iterator, see [`Tree::postorder`]
#[derive(Clone)]
pub struct PostOrder<'a, F = Structural> {
    tree: &'a Tree,
    // Second member is true once the children of the node were pushed
    stack: Vec<(NodeId, bool)>,
    is_leaf: F,
}

impl<'a, F: LeafFn> Iterator for PostOrder<'a, F> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (id, expanded) = self.stack.pop()?;
            let node = &self.tree.nodes[id];
            if expanded || node.children.is_empty() || (self.is_leaf)(node) {
                return Some(id);
            }
            self.stack.push((id, true));
            self.stack
                .extend(node.children.iter().rev().map(|child| (*child, false)));
        }
    }
}

/// Lazy breadth-first iterator, see [`Tree::levelorder`]
#[derive(Clone)]
pub struct LevelOrder<'a, F = Structural> {
    tree: &'a Tree,
    queue: VecDeque<NodeId>,
    is_leaf: F,
}

impl<'a, F: LeafFn> Iterator for LevelOrder<'a, F> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.queue.pop_front()?;
        let node = &self.tree.nodes[id];
        if !(self.is_leaf)(node) {
            self.queue.extend(node.children.iter());
        }

        Some(id)
    }
}

/// Lazy iterator visiting every node twice, see [`Tree::prepostorder`]
#[derive(Clone)]
pub struct PrePostOrder<'a, F = Structural> {
    tree: &'a Tree,
    // Second member is true for the closing visit
    stack: Vec<(NodeId, bool)>,
    is_leaf: F,
}

impl<'a, F: LeafFn> Iterator for PrePostOrder<'a, F> {
    type Item = (bool, NodeId);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, is_post) = self.stack.pop()?;
        if is_post {
            return Some((true, id));
        }

        self.stack.push((id, true));
        let node = &self.tree.nodes[id];
        if !(self.is_leaf)(node) {
            self.stack
                .extend(node.children.iter().rev().map(|child| (*child, false)));
        }

        Some((false, id))
    }
}

/// Iterator over the ancestors of a node, closest first, root last
#[derive(Clone)]
pub struct Ancestors<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.tree.nodes[id].parent;

        Some(id)
    }
}

/// Methods to traverse the [`Tree`]
///
/// Traversals are lazy and borrow the tree: the borrow checker forbids
/// editing the topology while one is alive. Collect the ids first when a
/// traversal drives edits.
///
/// ----
/// ----
impl Tree {
    // ###################
    // # TREE TRAVERSALS #
    // ###################

    /// Iterates over the subtree of `root` in preorder
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new_named("R"));
    /// let a = tree.add_child(Node::new_named("A"), root).unwrap();
    /// let b = tree.add_child(Node::new_named("B"), root).unwrap();
    /// let c = tree.add_child(Node::new_named("C"), a).unwrap();
    ///
    /// let order: Vec<_> = tree.preorder(&root).unwrap().collect();
    /// assert_eq!(order, vec![root, a, c, b]);
    /// ```
    pub fn preorder(&self, root: &NodeId) -> Result<PreOrder<'_>, TreeError> {
        self.preorder_with(root, structural())
    }

    /// Preorder traversal that does not descend below nodes matching `is_leaf`
    pub fn preorder_with<F>(&self, root: &NodeId, is_leaf: F) -> Result<PreOrder<'_, F>, TreeError>
    where
        F: Fn(&Node) -> bool,
    {
        self.get(root)?;
        Ok(PreOrder {
            tree: self,
            stack: vec![*root],
            is_leaf,
        })
    }

    /// Iterates over the subtree of `root` in postorder
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new_named("R"));
    /// let a = tree.add_child(Node::new_named("A"), root).unwrap();
    /// let b = tree.add_child(Node::new_named("B"), root).unwrap();
    /// let c = tree.add_child(Node::new_named("C"), a).unwrap();
    ///
    /// let order: Vec<_> = tree.postorder(&root).unwrap().collect();
    /// assert_eq!(order, vec![c, a, b, root]);
    /// ```
    pub fn postorder(&self, root: &NodeId) -> Result<PostOrder<'_>, TreeError> {
        self.postorder_with(root, structural())
    }

    /// Postorder traversal that does not descend below nodes matching `is_leaf`
    pub fn postorder_with<F>(&self, root: &NodeId, is_leaf: F) -> Result<PostOrder<'_, F>, TreeError>
    where
        F: Fn(&Node) -> bool,
    {
        self.get(root)?;
        Ok(PostOrder {
            tree: self,
            stack: vec![(*root, false)],
            is_leaf,
        })
    }

    /// Iterates over the subtree of `root` level by level
    pub fn levelorder(&self, root: &NodeId) -> Result<LevelOrder<'_>, TreeError> {
        self.levelorder_with(root, structural())
    }

    /// Levelorder traversal that does not descend below nodes matching `is_leaf`
    pub fn levelorder_with<F>(
        &self,
        root: &NodeId,
        is_leaf: F,
    ) -> Result<LevelOrder<'_, F>, TreeError>
    where
        F: Fn(&Node) -> bool,
    {
        self.get(root)?;
        Ok(LevelOrder {
            tree: self,
            queue: VecDeque::from([*root]),
            is_leaf,
        })
    }

    /// Visits every node twice: once on the way down (`false`) and once after
    /// all of its descendants (`true`). Leaves are closed right after being
    /// opened.
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let a = tree.add_child(Node::new(), root).unwrap();
    ///
    /// let visits: Vec<_> = tree.prepostorder(&root).unwrap().collect();
    /// assert_eq!(visits, vec![(false, root), (false, a), (true, a), (true, root)]);
    /// ```
    pub fn prepostorder(&self, root: &NodeId) -> Result<PrePostOrder<'_>, TreeError> {
        self.prepostorder_with(root, structural())
    }

    /// Pre/post traversal that does not descend below nodes matching `is_leaf`
    pub fn prepostorder_with<F>(
        &self,
        root: &NodeId,
        is_leaf: F,
    ) -> Result<PrePostOrder<'_, F>, TreeError>
    where
        F: Fn(&Node) -> bool,
    {
        self.get(root)?;
        Ok(PrePostOrder {
            tree: self,
            stack: vec![(*root, false)],
            is_leaf,
        })
    }

    /// Iterates over the subtree of `root` in the requested order
    pub fn traverse(
        &self,
        root: &NodeId,
        order: Traversal,
    ) -> Result<Box<dyn Iterator<Item = NodeId> + '_>, TreeError> {
        Ok(match order {
            Traversal::PreOrder => Box::new(self.preorder(root)?),
            Traversal::PostOrder => Box::new(self.postorder(root)?),
            Traversal::LevelOrder => Box::new(self.levelorder(root)?),
        })
    }

    // ######################
    // # NAVIGATE THE NODES #
    // ######################

    /// Returns the leaves of the subtree of `root`, left to right
    pub fn get_leaves(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        Ok(self
            .preorder(root)?
            .filter(|id| self.nodes[*id].is_leaf())
            .collect())
    }

    /// Returns the nodes of the subtree that are leaves or match `is_leaf`,
    /// without descending below the matching ones.
    pub fn get_leaves_with<F>(&self, root: &NodeId, is_leaf: F) -> Result<Vec<NodeId>, TreeError>
    where
        F: Fn(&Node) -> bool,
    {
        Ok(self
            .preorder_with(root, &is_leaf)?
            .filter(|id| {
                let node = &self.nodes[*id];
                node.is_leaf() || is_leaf(node)
            })
            .collect())
    }

    /// Returns the names of the leaves of the subtree of `root`, left to right
    pub fn get_leaf_names(&self, root: &NodeId) -> Result<Vec<String>, TreeError> {
        Ok(self
            .get_leaves(root)?
            .into_iter()
            .map(|id| self.nodes[id].name.clone())
            .collect())
    }

    /// Returns all the descendants of `root` (excluding `root`) in the
    /// requested order
    pub fn get_descendants(&self, root: &NodeId, order: Traversal) -> Result<Vec<NodeId>, TreeError> {
        Ok(self.traverse(root, order)?.filter(|id| id != root).collect())
    }

    /// Iterates over the ancestors of a node, from its parent to the root
    pub fn ancestors(&self, node: &NodeId) -> Result<Ancestors<'_>, TreeError> {
        Ok(Ancestors {
            tree: self,
            next: self.get(node)?.parent,
        })
    }

    /// Returns the ancestors of a node, from its parent to the root
    pub fn get_ancestors(&self, node: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        Ok(self.ancestors(node)?.collect())
    }

    /// Returns the root of the component holding `node`
    pub fn get_tree_root(&self, node: &NodeId) -> Result<NodeId, TreeError> {
        Ok(self.ancestors(node)?.last().unwrap_or(*node))
    }

    /// Checks if `node` is `ancestor` or one of its descendants
    pub fn is_in_subtree(&self, node: &NodeId, ancestor: &NodeId) -> Result<bool, TreeError> {
        self.get(ancestor)?;
        Ok(node == ancestor || self.ancestors(node)?.any(|id| id == *ancestor))
    }

    /// Returns the children of a node
    pub fn get_children(&self, node: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        Ok(self.get(node)?.children.clone())
    }

    /// Returns the other children of the parent of a node
    pub fn get_sisters(&self, node: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        Ok(match self.get(node)?.parent {
            Some(parent) => self.nodes[parent]
                .children
                .iter()
                .filter(|id| *id != node)
                .copied()
                .collect(),
            None => vec![],
        })
    }

    /// Returns the nodes of the subtree in idx order: leaves left to right
    /// followed by internal nodes in postorder, so that `root` comes last.
    /// This numbering changes with every topology edit.
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
    /// assert_eq!(tree.idx_order(&root).unwrap(), vec![a, b, c, inner, root]);
    /// ```
    pub fn idx_order(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut order = self.get_leaves(root)?;
        order.extend(
            self.postorder(root)?
                .filter(|id| !self.nodes[*id].is_leaf()),
        );

        Ok(order)
    }
}
