//! Build, walk and edit phylogenetic trees.
//!
//! This module defines the essential structs to represent phylogenetic trees:
//!  - The [`Node`] struct that represents a node of a phylogenetic tree.
//!  - The [`Tree`] struct, an arena holding a collection of [`Node`] objects
//!    linked to each other through [`NodeId`] handles.
//!  - The [`Feature`] enum holding typed, user-defined node attributes.
//!
//! Methods on [`Tree`] are split by concern: traversals, topology edits,
//! cached content and ancestry/distance queries each live in their own file.
//!

mod ancestry;
mod content;
mod edit;
mod feature;
mod node;
mod traversal;
mod tree_impl;

#[cfg(test)]
pub(crate) mod test_utils;

pub use self::ancestry::LeafDistance;
pub use self::content::{Bipartition, Monophyly, MonophylyKind};
pub use self::edit::Split;
pub use self::feature::Feature;
pub use self::node::{Node, NodeError};
pub use self::traversal::{
    Ancestors, LeafFn, LevelOrder, PostOrder, PreOrder, PrePostOrder, Structural, Traversal,
};
pub use self::tree_impl::{Tree, TreeError};

/// A type that represents Identifiers of [`Node`] objects
/// within phylogenetic [`Tree`] object.
pub type NodeId = usize;

/// A type that represents branch lengths between [`Node`] objects
/// within phylogenetic [`Tree`] object.
pub type EdgeLength = f64;

/// Edge length given to nodes created without an explicit one.
pub const DEFAULT_EDGE_LENGTH: EdgeLength = 1.0;

/// Support value given to nodes created without an explicit one.
pub const DEFAULT_SUPPORT: f64 = 0.0;
