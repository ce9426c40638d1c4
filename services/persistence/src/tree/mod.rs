//! Persistent red-black tree
//!
//! An ordered map whose nodes live in the write-back store, addressed only
//! by byte keys. Every parent/child/sibling hop is a store lookup and every
//! structural edit is a store write, so a [`Tree`] value itself is just a
//! small handle (root key, size, comparator) that its owner persists
//! separately.

mod node;
mod rbtree;

pub use node::{node_color, Color, Node, NodeItem};
pub use rbtree::{bytes_compare, Comparator, Tree, TreeIter};
