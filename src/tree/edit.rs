use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, trace};

use super::node::{Node, NodeError};
use super::tree_impl::{Tree, TreeError};
use super::{EdgeLength, NodeId};

/// How [`Tree::add_sister`] connects the new sister to the tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Split {
    /// Append the sister to the parent's children, creating a polytomy
    /// if the parent already had two children.
    No,
    /// Insert a new node halfway along the edge above the target node.
    /// The sister gets the same half length so tips stay aligned.
    Half,
    /// Insert a new node on the edge above the target node, leaving the
    /// given length below it. The sister keeps its own length.
    At(EdgeLength),
}

fn check_finite(field: &'static str, value: f64) -> Result<f64, TreeError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(NodeError::NonFinite { field, value }.into())
    }
}

/// Methods to manipulate and alter the topology of the [`Tree`].
///
/// Every method validates its arguments before the first write: when an
/// error is returned the tree is left unchanged.
///
/// ----
/// ----
impl Tree {
    // ##########################
    // # LINK AND UNLINK NODES  #
    // ##########################

    /// Moves an existing node, with its subtree, below `parent` as its last
    /// child. If `child` was the tree root, the root of the receiving
    /// component becomes the tree root.
    /// ```
    /// use phylonode::tree::{Tree, Node, TreeError};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let a = tree.add_child(Node::new(), root).unwrap();
    /// let b = tree.add_child(Node::new(), root).unwrap();
    ///
    /// tree.attach(&b, &a).unwrap();
    /// assert_eq!(tree.get(&a).unwrap().children(), &[b]);
    /// assert_eq!(tree.get(&root).unwrap().children(), &[a]);
    ///
    /// assert!(matches!(tree.attach(&root, &b), Err(TreeError::WouldCreateCycle { .. })));
    /// ```
    pub fn attach(&mut self, child: &NodeId, parent: &NodeId) -> Result<(), TreeError> {
        if self.is_in_subtree(parent, child)? {
            return Err(TreeError::WouldCreateCycle {
                parent: *parent,
                child: *child,
            });
        }

        if let Some(old_parent) = self.nodes[*child].parent {
            self.nodes[old_parent].remove_child(child)?;
        }
        self.nodes[*child].parent = Some(*parent);
        self.nodes[*parent].children.push(*child);

        if self.root == Some(*child) {
            self.root = Some(self.get_tree_root(parent)?);
        }
        trace!(child = *child, parent = *parent, "attached node");

        Ok(())
    }

    /// Unlinks `child` from `parent`. The child keeps its subtree and
    /// becomes the root of a separate component.
    pub fn remove_child(&mut self, parent: &NodeId, child: &NodeId) -> Result<NodeId, TreeError> {
        self.get(child)?;
        self.get_mut(parent)?.remove_child(child)?;
        self.nodes[*child].parent = None;

        Ok(*child)
    }

    /// Unlinks a node from its parent, returning it. Detaching a root does
    /// nothing.
    pub fn detach(&mut self, node: &NodeId) -> Result<NodeId, TreeError> {
        if let Some(parent) = self.get(node)?.parent {
            self.remove_child(&parent, node)?;
        }

        Ok(*node)
    }

    /// Adds a sister to a non-root node and returns the id of the sister.
    /// With [`Split::Half`] or [`Split::At`] a new node is inserted on the
    /// edge above `node`, taking its position among its parent's children,
    /// and both `node` and the sister hang below it.
    /// ```
    /// use phylonode::tree::{Tree, Node, Split};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let a = tree.add_child(Node::new_named("A").with_dist(2.0).unwrap(), root).unwrap();
    ///
    /// let b = tree.add_sister(&a, Node::new_named("B"), Split::Half).unwrap();
    /// let inner = tree.get(&b).unwrap().parent().unwrap();
    ///
    /// assert_eq!(tree.get(&root).unwrap().children(), &[inner]);
    /// assert_eq!(tree.get(&inner).unwrap().children(), &[a, b]);
    /// assert_eq!(tree.get(&inner).unwrap().dist(), 1.0);
    /// assert_eq!(tree.get(&a).unwrap().dist(), 1.0);
    /// assert_eq!(tree.get(&b).unwrap().dist(), 1.0);
    /// ```
    pub fn add_sister(&mut self, node: &NodeId, sister: Node, split: Split) -> Result<NodeId, TreeError> {
        let target = self.get(node)?;
        let parent = target.parent.ok_or(TreeError::NoParent(*node))?;
        let old_dist = target.dist;

        let (node_dist, inner_dist, sister_dist) = match split {
            Split::No => return self.add_child(sister, parent),
            Split::Half => (old_dist / 2.0, old_dist / 2.0, Some(old_dist / 2.0)),
            Split::At(length) => {
                let length = check_finite("dist", length)?;
                (length, old_dist - length, None)
            }
        };

        let position = self.nodes[parent].remove_child(node)?;
        let inner = self.add(Node::new());
        self.nodes[inner].dist = inner_dist;
        self.nodes[inner].parent = Some(parent);
        self.nodes[parent].children.insert(position, inner);

        self.nodes[*node].parent = Some(inner);
        self.nodes[*node].dist = node_dist;
        self.nodes[inner].children.push(*node);

        let sister = self.add_child(sister, inner)?;
        if let Some(dist) = sister_dist {
            self.nodes[sister].dist = dist;
        }
        debug!(node = *node, inner, sister, "inserted sister");

        Ok(sister)
    }

    /// Removes a sister of `node`: the given one, or the first one when
    /// `sister` is `None`. Returns the removed sister, now a separate
    /// component, or `None` if `node` has no sisters.
    pub fn remove_sister(
        &mut self,
        node: &NodeId,
        sister: Option<NodeId>,
    ) -> Result<Option<NodeId>, TreeError> {
        let parent = self.get(node)?.parent.ok_or(TreeError::NoParent(*node))?;
        let sisters = self.get_sisters(node)?;

        let target = match sister {
            Some(sister) if sisters.contains(&sister) => sister,
            Some(sister) => {
                return Err(NodeError::HasNoChild {
                    parent,
                    child: sister,
                }
                .into())
            }
            None => match sisters.first() {
                Some(first) => *first,
                None => return Ok(None),
            },
        };

        self.remove_child(&parent, &target).map(Some)
    }

    // ######################
    // # SPLICE OUT NODES   #
    // ######################

    /// Removes a node from the tree, its children taking its place among
    /// the children of its parent.
    ///
    /// With `preserve_branch_length`, the edge of the removed node is added
    /// to its only child or, if it has several, to its parent, so that
    /// distances to the root are kept whenever possible.
    ///
    /// With `prevent_polytomy_collapse`, a non-root parent left with fewer
    /// than two children is removed as well (one level only).
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let inner = tree.add_child(Node::new(), root).unwrap();
    /// let leaf = tree.add_child(Node::new().with_dist(0.5).unwrap(), inner).unwrap();
    ///
    /// tree.delete(&inner, false, true).unwrap();
    ///
    /// assert_eq!(tree.get(&root).unwrap().children(), &[leaf]);
    /// assert_eq!(tree.get(&leaf).unwrap().dist(), 1.5);
    /// assert!(tree.get(&inner).is_err());
    /// ```
    pub fn delete(
        &mut self,
        node: &NodeId,
        prevent_polytomy_collapse: bool,
        preserve_branch_length: bool,
    ) -> Result<(), TreeError> {
        let target = self.get(node)?;
        let parent = target.parent.ok_or(TreeError::CannotDeleteRoot(*node))?;
        let children = target.children.clone();
        let dist = target.dist;

        if preserve_branch_length {
            match children.as_slice() {
                [] => {}
                [only] => self.nodes[*only].dist += dist,
                _ => self.nodes[parent].dist += dist,
            }
        }

        let position = self.nodes[parent].remove_child(node)?;
        for child in children.iter() {
            self.nodes[*child].parent = Some(parent);
        }
        self.nodes[parent]
            .children
            .splice(position..position, children.iter().copied());

        self.nodes[*node].delete();
        self.drop_features(node);
        trace!(node = *node, parent, n_children = children.len(), "deleted node");

        if prevent_polytomy_collapse
            && self.nodes[parent].children.len() < 2
            && self.nodes[parent].parent.is_some()
        {
            self.delete(&parent, false, preserve_branch_length)?;
        }

        Ok(())
    }

    /// Keeps only the minimal subtree of `root` connecting the nodes in
    /// `keep`. Internal nodes where the lineages of several kept nodes
    /// merge are retained, all other descendants of `root` are deleted.
    ///
    /// # Example
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let left = tree.add_child(Node::new(), root).unwrap();
    /// let a = tree.add_child(Node::new_named("A"), left).unwrap();
    /// tree.add_child(Node::new_named("B"), left).unwrap();
    /// let c = tree.add_child(Node::new_named("C"), root).unwrap();
    ///
    /// tree.prune(&root, &[a, c], true).unwrap();
    ///
    /// assert_eq!(tree.get(&root).unwrap().children(), &[a, c]);
    /// assert_eq!(tree.get(&a).unwrap().dist(), 2.0);
    /// ```
    pub fn prune(
        &mut self,
        root: &NodeId,
        keep: &[NodeId],
        preserve_branch_length: bool,
    ) -> Result<(), TreeError> {
        self.get(root)?;
        for node in keep {
            if !self.is_in_subtree(node, root)? {
                return Err(TreeError::NotDescendant {
                    node: *node,
                    ancestor: *root,
                });
            }
        }

        let (common, paths) = self.get_common_ancestor_with_paths(keep)?;

        let mut to_keep: HashSet<NodeId> = keep.iter().copied().collect();
        to_keep.insert(*root);

        // Kept nodes found in the subtree of each node, and its depth
        let mut visitors: HashMap<NodeId, BTreeSet<NodeId>> = HashMap::new();
        let mut depths: HashMap<NodeId, usize> = HashMap::new();
        for (seed, path) in paths.iter() {
            for (i, visited) in path.iter().enumerate() {
                depths.insert(*visited, path.len() - 1 - i);
                if visited != seed {
                    visitors.entry(*visited).or_default().insert(*seed);
                }
            }
        }

        // Nodes seen by the same set of several lineages are interchangeable
        // junctions: keep the deepest unless one of them is already kept.
        let mut junctions: HashMap<BTreeSet<NodeId>, Vec<NodeId>> = HashMap::new();
        for (node, seeds) in visitors {
            if seeds.len() > 1 {
                junctions.entry(seeds).or_default().push(node);
            }
        }
        for members in junctions.values() {
            if members.iter().any(|node| to_keep.contains(node)) {
                continue;
            }
            if let Some(deepest) = members
                .iter()
                .max_by_key(|node| (depths.get(*node).copied().unwrap_or(0), Reverse(**node)))
            {
                to_keep.insert(*deepest);
            }
        }

        let doomed: Vec<NodeId> = self
            .postorder(root)?
            .filter(|id| !to_keep.contains(id))
            .collect();
        for node in doomed.iter() {
            self.delete(node, false, preserve_branch_length)?;
        }
        debug!(
            root = *root,
            common,
            kept = to_keep.len(),
            removed = doomed.len(),
            "pruned tree"
        );

        Ok(())
    }

    /// Removes every non-root node of the subtree that has exactly one
    /// child, returning how many were removed.
    pub fn compress(&mut self, root: &NodeId, preserve_branch_length: bool) -> Result<usize, TreeError> {
        let unary: Vec<NodeId> = self
            .preorder(root)?
            .filter(|id| {
                let node = &self.nodes[*id];
                node.parent.is_some() && node.children.len() == 1
            })
            .collect();

        for node in unary.iter() {
            self.delete(node, false, preserve_branch_length)?;
        }
        debug!(root = *root, removed = unary.len(), "compressed tree");

        Ok(unary.len())
    }

    // ###################
    // # CHANGE ROOTING  #
    // ###################

    /// Turns a root with two children into a root with three or more, by
    /// removing its first internal child. The removed edge length is added
    /// to the other child and its support moves to the root.
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let inner = tree.add_child(Node::new().with_support(90.0).unwrap(), root).unwrap();
    /// let c = tree.add_child(Node::new_named("C"), root).unwrap();
    /// let a = tree.add_child(Node::new_named("A"), inner).unwrap();
    /// let b = tree.add_child(Node::new_named("B"), inner).unwrap();
    ///
    /// tree.unroot(&root).unwrap();
    ///
    /// assert_eq!(tree.get(&root).unwrap().children(), &[c, a, b]);
    /// assert_eq!(tree.get(&c).unwrap().dist(), 2.0);
    /// assert_eq!(tree.get(&root).unwrap().support(), 90.0);
    /// ```
    pub fn unroot(&mut self, node: &NodeId) -> Result<(), TreeError> {
        let (first, second) = match self.get(node)?.children.as_slice() {
            [first, second] => (*first, *second),
            _ => return Err(TreeError::NotBifurcating(*node)),
        };

        let (inner, other) = if !self.nodes[first].is_leaf() {
            (first, second)
        } else if !self.nodes[second].is_leaf() {
            (second, first)
        } else {
            return Err(TreeError::CannotUnrootTwoLeaves);
        };

        let grandchildren = self.nodes[inner].children.clone();
        for child in grandchildren.iter() {
            self.nodes[*child].parent = Some(*node);
        }
        let (support, dist) = (self.nodes[inner].support, self.nodes[inner].dist);
        let root = &mut self.nodes[*node];
        root.children.extend(grandchildren);
        root.children.retain(|id| *id != inner);
        root.support = support;
        self.nodes[other].dist += dist;

        self.nodes[inner].delete();
        self.drop_features(&inner);
        debug!(root = *node, removed = inner, "unrooted tree");

        Ok(())
    }

    /// Reroots the subtree of `root` so that `outgroup` and the rest of the
    /// nodes are the two children of `root`. Edges on the path between
    /// `root` and the outgroup are reversed, each carrying its length and
    /// support one step along. The outgroup edge is split evenly between
    /// the two new root children.
    ///
    /// # Example
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let left = tree.add_child(Node::new(), root).unwrap();
    /// let right = tree.add_child(Node::new(), root).unwrap();
    /// let a = tree.add_child(Node::new_named("A"), left).unwrap();
    /// let b = tree.add_child(Node::new_named("B"), left).unwrap();
    ///
    /// tree.set_outgroup(&root, &a).unwrap();
    ///
    /// assert_eq!(tree.get(&root).unwrap().children(), &[a, left]);
    /// assert_eq!(tree.get(&left).unwrap().children(), &[b, right]);
    /// assert_eq!(tree.get(&a).unwrap().dist(), 0.5);
    /// assert_eq!(tree.get(&left).unwrap().dist(), 0.5);
    /// ```
    pub fn set_outgroup(&mut self, root: &NodeId, outgroup: &NodeId) -> Result<(), TreeError> {
        if root == outgroup {
            return Err(TreeError::OutgroupIsSelf(*root));
        }
        self.get(root)?;
        let parent_outgroup = self.get(outgroup)?.parent;

        // Child of root on the path to the outgroup
        let mut branch = *outgroup;
        loop {
            match self.nodes[branch].parent {
                Some(parent) if parent == *root => break,
                Some(parent) => branch = parent,
                None => {
                    return Err(TreeError::NotDescendant {
                        node: *outgroup,
                        ancestor: *root,
                    })
                }
            }
        }
        let parent_outgroup = parent_outgroup.ok_or(TreeError::NoParent(*outgroup))?;

        let remaining: Vec<NodeId> = self.nodes[*root]
            .children
            .iter()
            .filter(|id| **id != branch)
            .copied()
            .collect();
        if remaining.is_empty() {
            return Err(TreeError::TooFewChildren(*root));
        }

        // Everything except the outgroup branch, hanging from a single node
        let down = if let [only] = remaining.as_slice() {
            *only
        } else {
            let connector = self.add(Node::new());
            self.nodes[connector].dist = 0.0;
            self.nodes[connector].support = self.nodes[branch].support;
            for child in remaining.iter() {
                self.nodes[*child].parent = Some(connector);
            }
            self.nodes[connector].children = remaining;
            connector
        };
        self.nodes[*root].children.clear();

        let sister = if parent_outgroup != *root {
            let mut current = parent_outgroup;
            let mut above = self.nodes[current].parent.unwrap_or(*root);
            let mut below: Option<NodeId> = None;
            let mut carried_dist = self.nodes[current].dist;
            let mut carried_support = self.nodes[current].support;

            while above != *root {
                self.nodes[current].children.push(above);
                self.nodes[above].remove_child(&current)?;

                let node = &mut self.nodes[above];
                std::mem::swap(&mut node.dist, &mut carried_dist);
                std::mem::swap(&mut node.support, &mut carried_support);

                self.nodes[current].parent = below;
                below = Some(current);
                current = above;
                above = self.nodes[current].parent.unwrap_or(*root);
            }

            // `current` is the old root child on the outgroup branch
            self.nodes[current].children.push(down);
            self.nodes[down].parent = Some(current);
            self.nodes[current].parent = below;
            self.nodes[down].dist += carried_dist;

            self.nodes[parent_outgroup].remove_child(outgroup)?;
            self.nodes[parent_outgroup].dist = 0.0;
            parent_outgroup
        } else {
            down
        };

        self.nodes[*outgroup].parent = Some(*root);
        self.nodes[sister].parent = Some(*root);
        self.nodes[*root].children = vec![*outgroup, sister];

        let half = (self.nodes[sister].dist + self.nodes[*outgroup].dist) / 2.0;
        self.nodes[sister].dist = half;
        self.nodes[*outgroup].dist = half;
        self.nodes[sister].support = self.nodes[*outgroup].support;
        debug!(root = *root, outgroup = *outgroup, "rerooted tree");

        Ok(())
    }

    /// Reroots the tree on the midpoint of its longest leaf to leaf path,
    /// see [`Tree::get_midpoint_outgroup`].
    pub fn root_on_midpoint(&mut self, root: &NodeId) -> Result<(), TreeError> {
        let outgroup = self.get_midpoint_outgroup(root)?;
        if outgroup != *root {
            self.set_outgroup(root, &outgroup)?;
        }

        Ok(())
    }

    // ######################
    // # REORDER AND RESOLVE #
    // ######################

    /// Resolves polytomies into a left-branching cascade of bifurcations.
    /// A node with `k > 2` children gets `k - 2` new internal descendants
    /// with the given length and support: `(c0,c1,c2,c3)` becomes
    /// `(((c2,c3),c1),c0)`. Other resolutions are equally valid, this one
    /// is only deterministic. Returns the number of nodes created.
    pub fn resolve_polytomy(
        &mut self,
        node: &NodeId,
        default_dist: EdgeLength,
        default_support: f64,
        recursive: bool,
    ) -> Result<usize, TreeError> {
        let template = Node::new()
            .with_dist(default_dist)?
            .with_support(default_support)?;

        let targets: Vec<NodeId> = if recursive {
            self.preorder(node)?.collect()
        } else {
            self.get(node)?;
            vec![*node]
        };

        let mut created = 0;
        for target in targets {
            let children = std::mem::take(&mut self.nodes[target].children);
            let k = children.len();
            if k <= 2 {
                self.nodes[target].children = children;
                continue;
            }

            let mut next = target;
            for _ in 0..k - 2 {
                let new = self.add(template.clone());
                self.nodes[new].parent = Some(next);
                self.nodes[next].children.push(new);
                next = new;
            }
            created += k - 2;

            let mut next = target;
            for (i, child) in children.iter().enumerate() {
                self.nodes[*child].parent = Some(next);
                self.nodes[next].children.push(*child);
                if i + 2 < k {
                    next = self.nodes[next].children[0];
                }
            }
            trace!(node = target, n_children = k, "resolved polytomy");
        }
        debug!(root = *node, created, "resolved polytomies");

        Ok(created)
    }

    /// Sorts the children of every node of the subtree by their number of
    /// leaves, smallest first, or largest first when `descending`. Returns
    /// the number of leaves below `node`.
    /// ```
    /// use phylonode::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root = tree.add(Node::new());
    /// let inner = tree.add_child(Node::new(), root).unwrap();
    /// let c = tree.add_child(Node::new(), root).unwrap();
    /// tree.add_child(Node::new(), inner).unwrap();
    /// tree.add_child(Node::new(), inner).unwrap();
    ///
    /// assert_eq!(tree.ladderize(&root, false).unwrap(), 3);
    /// assert_eq!(tree.get(&root).unwrap().children(), &[c, inner]);
    /// ```
    pub fn ladderize(&mut self, node: &NodeId, descending: bool) -> Result<usize, TreeError> {
        let order: Vec<NodeId> = self.postorder(node)?.collect();
        let mut sizes: HashMap<NodeId, usize> = HashMap::with_capacity(order.len());

        for id in order {
            let target = &mut self.nodes[id];
            if target.is_leaf() {
                sizes.insert(id, 1);
                continue;
            }
            target.children.sort_by_key(|child| sizes[child]);
            if descending {
                target.children.reverse();
            }
            let size = target.children.iter().map(|child| sizes[child]).sum();
            sizes.insert(id, size);
        }

        Ok(sizes[node])
    }

    /// Reverses the order of the children of a node
    pub fn swap_children(&mut self, node: &NodeId) -> Result<(), TreeError> {
        self.get_mut(node)?.children.reverse();
        Ok(())
    }

    /// Sorts the children of every node of the subtree by the sorted values
    /// of an attribute over their leaves (see
    /// [`Tree::get_cached_attribute`]).
    pub fn sort_descendants(&mut self, root: &NodeId, key: &str) -> Result<(), TreeError> {
        let mut content = self.get_cached_attribute(root, key)?;
        for values in content.values_mut() {
            values.sort();
        }

        let internal: Vec<NodeId> = self
            .preorder(root)?
            .filter(|id| !self.nodes[*id].is_leaf())
            .collect();
        for id in internal {
            self.nodes[id]
                .children
                .sort_by(|a, b| content[a].cmp(&content[b]));
        }

        Ok(())
    }

    /// Multiplies every edge length in the arena by a factor
    pub fn rescale(&mut self, factor: f64) -> Result<(), TreeError> {
        let factor = check_finite("scaling factor", factor)?;
        for node in self.nodes.iter_mut().filter(|node| !node.deleted) {
            node.dist *= factor;
        }

        Ok(())
    }
}
