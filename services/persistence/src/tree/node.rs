//! Persisted tree node
//!
//! Nodes reference parent and children by byte key only; there is no
//! in-memory pointer graph. A loaded [`Node`] is a detached copy of the
//! persisted item: mutate it, then save it back through the tree.

use serde::{Deserialize, Serialize};
use types::keys::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Black,
}

/// Persisted payload of one tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeItem {
    /// Opaque encoded value; the tree never interprets it.
    pub value: Vec<u8>,
    pub color: Color,
    pub parent: Key,
    pub left: Key,
    pub right: Key,
}

impl NodeItem {
    /// Fresh red leaf with no links, the shape every insert starts from.
    pub fn leaf(value: Vec<u8>) -> Self {
        NodeItem {
            value,
            color: Color::Red,
            parent: Key::EMPTY,
            left: Key::EMPTY,
            right: Key::EMPTY,
        }
    }
}

/// A node together with the key it is stored under.
#[derive(Debug, Clone)]
pub struct Node {
    pub key: Key,
    pub item: NodeItem,
}

/// Absent nodes count as black.
pub fn node_color(node: Option<&Node>) -> Color {
    node.map(|n| n.item.color).unwrap_or(Color::Black)
}
