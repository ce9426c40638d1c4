//! Red-black tree over the write-back store
//!
//! The algorithm is the classic insert/delete case analysis, adapted for
//! nodes that only exist as store records. Loaded nodes are detached
//! copies, so the discipline throughout is: mutate, save immediately, and
//! reload before reuse whenever a helper may have touched the same record.

use crate::codec::Codec;
use crate::store::BatchStore;
use crate::tree::node::{node_color, Color, Node, NodeItem};
use std::cmp::Ordering;
use types::errors::StoreError;
use types::keys::Key;

/// Key ordering used by a tree.
pub type Comparator = fn(&Key, &Key) -> Ordering;

/// Default lexicographic byte comparison; equals numeric order for the
/// fixed-width big-endian keys used everywhere.
pub fn bytes_compare(a: &Key, b: &Key) -> Ordering {
    a.cmp(b)
}

/// Handle over a persisted red-black tree.
///
/// Root key and size are external state: the owner persists them (in its
/// own metadata record) and restores them with [`Tree::set_root`].
#[derive(Debug, Clone)]
pub struct Tree {
    root: Key,
    size: u64,
    comparator: Comparator,
}

impl Default for Tree {
    fn default() -> Self {
        Tree::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Tree::with_comparator(bytes_compare)
    }

    pub fn with_comparator(comparator: Comparator) -> Self {
        Tree {
            root: Key::EMPTY,
            size: 0,
            comparator,
        }
    }

    pub fn root_key(&self) -> Key {
        self.root
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Restore a handle over an already-persisted tree.
    pub fn set_root(&mut self, root: Key, size: u64) {
        self.root = root;
        self.size = size;
    }

    /// Reset to empty. Existing nodes become unreachable but are not
    /// deleted; inserts at the same keys overwrite them.
    pub fn clear(&mut self) {
        self.root = Key::EMPTY;
        self.size = 0;
    }

    /// Load the node stored at `key`; empty and absent keys are `None`.
    pub fn node<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<Option<Node>, StoreError> {
        if store.is_empty_key(key) {
            return Ok(None);
        }
        Ok(store.get::<NodeItem>(key)?.map(|item| Node { key: *key, item }))
    }

    fn must_node<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
        key: &Key,
        what: &str,
    ) -> Result<Node, StoreError> {
        match self.node(store, key)? {
            Some(node) => Ok(node),
            None => panic!("red-black structure corrupted: {what} missing at {key}"),
        }
    }

    fn save<C: Codec>(&self, store: &mut BatchStore<C>, node: &Node) -> Result<(), StoreError> {
        store.put(node.key, node.item.clone())
    }

    fn keys_equal(&self, a: &Key, b: &Key) -> bool {
        (self.comparator)(a, b) == Ordering::Equal
    }

    pub fn has<C: Codec>(&self, store: &mut BatchStore<C>, key: &Key) -> Result<bool, StoreError> {
        store.has(key)
    }

    /// Value stored at `key`, or `None` if absent.
    pub fn get<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.node(store, key)?.map(|node| node.item.value))
    }

    /// Insert or update. A new key is inserted as a red leaf and rebalanced;
    /// an existing key has its value replaced in place.
    pub fn put<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        key: Key,
        value: Vec<u8>,
    ) -> Result<(), StoreError> {
        if self.root.is_empty() {
            let node = Node {
                key,
                item: NodeItem::leaf(value),
            };
            self.root = key;
            self.save(store, &node)?;
            self.insert_case1(store, &key)?;
            self.size += 1;
            return Ok(());
        }

        let mut current = self.must_node(store, &self.root, "root")?;
        loop {
            match (self.comparator)(&key, &current.key) {
                Ordering::Equal => {
                    current.item.value = value;
                    self.save(store, &current)?;
                    return Ok(());
                }
                Ordering::Less => {
                    if current.item.left.is_empty() {
                        current.item.left = key;
                        self.save(store, &current)?;
                        break;
                    }
                    let next = current.item.left;
                    current = self.must_node(store, &next, "left child")?;
                }
                Ordering::Greater => {
                    if current.item.right.is_empty() {
                        current.item.right = key;
                        self.save(store, &current)?;
                        break;
                    }
                    let next = current.item.right;
                    current = self.must_node(store, &next, "right child")?;
                }
            }
        }

        let mut item = NodeItem::leaf(value);
        item.parent = current.key;
        self.save(store, &Node { key, item })?;
        self.insert_case1(store, &key)?;
        self.size += 1;
        Ok(())
    }

    /// Remove `key` from the tree; a no-op when absent. The node record is
    /// deleted from the store after the structural unlink.
    pub fn remove<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<(), StoreError> {
        let Some(node) = self.node(store, key)? else {
            return Ok(());
        };

        if !node.item.left.is_empty() && !node.item.right.is_empty() {
            // Two children: unlink the predecessor (left-subtree maximum,
            // which has at most a left child) with the usual fixup, then
            // relabel it into the removed node's position. The predecessor
            // property guarantees the relabel preserves search order.
            let pred = self.subtree_max(store, &node.item.left)?;
            let pred_key = pred.key;
            self.unlink_with_at_most_one_child(store, &pred_key)?;

            let node = self.must_node(store, key, "node being removed")?;
            let mut moved = self.must_node(store, &pred_key, "unlinked predecessor")?;
            moved.item.color = node.item.color;
            moved.item.parent = node.item.parent;
            moved.item.left = node.item.left;
            moved.item.right = node.item.right;

            if moved.item.parent.is_empty() {
                self.root = moved.key;
            } else {
                let mut parent =
                    self.must_node(store, &moved.item.parent, "parent of removed node")?;
                if self.keys_equal(&node.key, &parent.item.left) {
                    parent.item.left = moved.key;
                } else {
                    parent.item.right = moved.key;
                }
                self.save(store, &parent)?;
            }
            if !moved.item.left.is_empty() {
                let mut left = self.must_node(store, &moved.item.left, "left child")?;
                left.item.parent = moved.key;
                self.save(store, &left)?;
            }
            if !moved.item.right.is_empty() {
                let mut right = self.must_node(store, &moved.item.right, "right child")?;
                right.item.parent = moved.key;
                self.save(store, &right)?;
            }
            self.save(store, &moved)?;
        } else {
            self.unlink_with_at_most_one_child(store, key)?;
        }

        store.delete(key, false)?;
        self.size -= 1;
        Ok(())
    }

    // Standard deletion of a node with at most one child: fix up colors
    // while the node is still in place, then splice the child in. Does not
    // delete the node's store record.
    fn unlink_with_at_most_one_child<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<(), StoreError> {
        let node = self.must_node(store, key, "node being unlinked")?;
        let child_key = if node.item.right.is_empty() {
            node.item.left
        } else {
            node.item.right
        };
        let child = self.node(store, &child_key)?;
        if node.item.color == Color::Black {
            let mut node = node;
            node.item.color = node_color(child.as_ref());
            self.save(store, &node)?;
            self.delete_case1(store, key)?;
        }

        // The fixup may have rotated links around the node; reload.
        let node = self.must_node(store, key, "node being unlinked")?;
        let child_key = if node.item.right.is_empty() {
            node.item.left
        } else {
            node.item.right
        };
        let mut child = self.node(store, &child_key)?;
        self.replace_node(store, &node, child.as_mut())?;
        if node.item.parent.is_empty() {
            if let Some(mut child) = child {
                child.item.color = Color::Black;
                self.save(store, &child)?;
            }
        }
        Ok(())
    }

    /// Leftmost (minimum) node, or `None` on an empty tree.
    pub fn left<C: Codec>(&self, store: &mut BatchStore<C>) -> Result<Option<Node>, StoreError> {
        let mut result = None;
        let mut current = self.node(store, &self.root)?;
        while let Some(node) = current {
            let next = node.item.left;
            result = Some(node);
            current = self.node(store, &next)?;
        }
        Ok(result)
    }

    /// Rightmost (maximum) node, or `None` on an empty tree.
    pub fn right<C: Codec>(&self, store: &mut BatchStore<C>) -> Result<Option<Node>, StoreError> {
        let mut result = None;
        let mut current = self.node(store, &self.root)?;
        while let Some(node) = current {
            let next = node.item.right;
            result = Some(node);
            current = self.node(store, &next)?;
        }
        Ok(result)
    }

    /// Largest node with key <= `key`.
    pub fn floor<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<Option<Node>, StoreError> {
        let mut floor = None;
        let mut current = self.node(store, &self.root)?;
        while let Some(node) = current {
            match (self.comparator)(key, &node.key) {
                Ordering::Equal => return Ok(Some(node)),
                Ordering::Less => {
                    let next = node.item.left;
                    current = self.node(store, &next)?;
                }
                Ordering::Greater => {
                    let next = node.item.right;
                    floor = Some(node);
                    current = self.node(store, &next)?;
                }
            }
        }
        Ok(floor)
    }

    /// Smallest node with key >= `key`.
    pub fn ceiling<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<Option<Node>, StoreError> {
        let mut ceiling = None;
        let mut current = self.node(store, &self.root)?;
        while let Some(node) = current {
            match (self.comparator)(key, &node.key) {
                Ordering::Equal => return Ok(Some(node)),
                Ordering::Less => {
                    let next = node.item.left;
                    ceiling = Some(node);
                    current = self.node(store, &next)?;
                }
                Ordering::Greater => {
                    let next = node.item.right;
                    current = self.node(store, &next)?;
                }
            }
        }
        Ok(ceiling)
    }

    /// In-order cursor over the tree.
    pub fn iter<'a, C: Codec>(&'a self, store: &'a mut BatchStore<C>) -> TreeIter<'a, C> {
        TreeIter {
            tree: self,
            store,
            next: IterState::Start,
        }
    }

    /// All keys in comparator order.
    pub fn keys<C: Codec>(&self, store: &mut BatchStore<C>) -> Result<Vec<Key>, StoreError> {
        let mut keys = Vec::with_capacity(self.size as usize);
        for entry in self.iter(store) {
            keys.push(entry?.0);
        }
        Ok(keys)
    }

    /// All values in key order.
    pub fn values<C: Codec>(&self, store: &mut BatchStore<C>) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut values = Vec::with_capacity(self.size as usize);
        for entry in self.iter(store) {
            values.push(entry?.1);
        }
        Ok(values)
    }

    /// Remove and return the minimum entry.
    pub fn remove_min<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
    ) -> Result<Option<(Key, Vec<u8>)>, StoreError> {
        match self.left(store)? {
            None => Ok(None),
            Some(node) => {
                self.remove(store, &node.key)?;
                Ok(Some((node.key, node.item.value)))
            }
        }
    }

    /// Remove and return the maximum entry.
    pub fn remove_max<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
    ) -> Result<Option<(Key, Vec<u8>)>, StoreError> {
        match self.right(store)? {
            None => Ok(None),
            Some(node) => {
                self.remove(store, &node.key)?;
                Ok(Some((node.key, node.item.value)))
            }
        }
    }

    fn subtree_max<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<Node, StoreError> {
        let mut node = self.must_node(store, key, "subtree root")?;
        while !node.item.right.is_empty() {
            let next = node.item.right;
            node = self.must_node(store, &next, "right child")?;
        }
        Ok(node)
    }

    // Point whatever referenced `old` (root pointer or a parent child slot)
    // at `new`, and re-parent `new` under `old`'s parent.
    fn replace_node<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        old: &Node,
        new: Option<&mut Node>,
    ) -> Result<(), StoreError> {
        let new_key = new.as_ref().map(|n| n.key).unwrap_or(Key::EMPTY);
        if old.item.parent.is_empty() {
            self.root = new_key;
        } else {
            let mut parent = self.must_node(store, &old.item.parent, "parent of replaced node")?;
            if self.keys_equal(&old.key, &parent.item.left) {
                parent.item.left = new_key;
            } else {
                parent.item.right = new_key;
            }
            self.save(store, &parent)?;
        }
        if let Some(new) = new {
            new.item.parent = old.item.parent;
            self.save(store, new)?;
        }
        Ok(())
    }

    fn rotate_left<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<(), StoreError> {
        let mut node = self.must_node(store, key, "rotation node")?;
        let right_key = node.item.right;
        let mut right = self.must_node(store, &right_key, "rotation partner")?;
        self.replace_node(store, &node, Some(&mut right))?;
        node.item.right = right.item.left;
        if !right.item.left.is_empty() {
            let mut right_left = self.must_node(store, &right.item.left, "reattached child")?;
            right_left.item.parent = node.key;
            self.save(store, &right_left)?;
        }
        right.item.left = node.key;
        node.item.parent = right.key;
        self.save(store, &node)?;
        self.save(store, &right)
    }

    fn rotate_right<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<(), StoreError> {
        let mut node = self.must_node(store, key, "rotation node")?;
        let left_key = node.item.left;
        let mut left = self.must_node(store, &left_key, "rotation partner")?;
        self.replace_node(store, &node, Some(&mut left))?;
        node.item.left = left.item.right;
        if !left.item.right.is_empty() {
            let mut left_right = self.must_node(store, &left.item.right, "reattached child")?;
            left_right.item.parent = node.key;
            self.save(store, &left_right)?;
        }
        left.item.right = node.key;
        node.item.parent = left.key;
        self.save(store, &node)?;
        self.save(store, &left)
    }

    fn sibling_of<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
        node: &Node,
        parent: &Node,
    ) -> Result<Option<Node>, StoreError> {
        let sibling_key = if self.keys_equal(&node.key, &parent.item.left) {
            parent.item.right
        } else {
            parent.item.left
        };
        self.node(store, &sibling_key)
    }

    fn insert_case1<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<(), StoreError> {
        let mut node = self.must_node(store, key, "insert fixup node")?;
        if node.item.parent.is_empty() {
            if node.item.color != Color::Black {
                node.item.color = Color::Black;
                self.save(store, &node)?;
            }
            return Ok(());
        }
        self.insert_case2(store, node)
    }

    fn insert_case2<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        node: Node,
    ) -> Result<(), StoreError> {
        let parent = self.must_node(store, &node.item.parent, "insert parent")?;
        if parent.item.color == Color::Black {
            return Ok(());
        }
        self.insert_case3(store, node, parent)
    }

    fn insert_case3<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        node: Node,
        parent: Node,
    ) -> Result<(), StoreError> {
        // A red parent cannot be the root, so the grandparent must exist.
        let grandparent = self.must_node(store, &parent.item.parent, "insert grandparent")?;
        let uncle_key = if self.keys_equal(&parent.key, &grandparent.item.left) {
            grandparent.item.right
        } else {
            grandparent.item.left
        };
        let uncle = self.node(store, &uncle_key)?;

        if node_color(uncle.as_ref()) == Color::Red {
            let mut parent = parent;
            parent.item.color = Color::Black;
            self.save(store, &parent)?;
            let mut uncle = uncle.unwrap_or_else(|| {
                panic!("red-black structure corrupted: red uncle missing at {uncle_key}")
            });
            uncle.item.color = Color::Black;
            self.save(store, &uncle)?;
            let mut grandparent = grandparent;
            grandparent.item.color = Color::Red;
            self.save(store, &grandparent)?;
            self.insert_case1(store, &grandparent.key)
        } else {
            self.insert_case4(store, node, parent, grandparent)
        }
    }

    fn insert_case4<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        node: Node,
        parent: Node,
        grandparent: Node,
    ) -> Result<(), StoreError> {
        let continue_key = if self.keys_equal(&node.key, &parent.item.right)
            && self.keys_equal(&parent.key, &grandparent.item.left)
        {
            self.rotate_left(store, &parent.key)?;
            parent.key
        } else if self.keys_equal(&node.key, &parent.item.left)
            && self.keys_equal(&parent.key, &grandparent.item.right)
        {
            self.rotate_right(store, &parent.key)?;
            parent.key
        } else {
            node.key
        };
        self.insert_case5(store, &continue_key)
    }

    fn insert_case5<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<(), StoreError> {
        let node = self.must_node(store, key, "insert fixup node")?;
        let mut parent = self.must_node(store, &node.item.parent, "insert parent")?;
        parent.item.color = Color::Black;
        self.save(store, &parent)?;
        let mut grandparent = self.must_node(store, &parent.item.parent, "insert grandparent")?;
        grandparent.item.color = Color::Red;
        self.save(store, &grandparent)?;

        if self.keys_equal(&node.key, &parent.item.left)
            && self.keys_equal(&parent.key, &grandparent.item.left)
        {
            self.rotate_right(store, &grandparent.key)?;
        } else if self.keys_equal(&node.key, &parent.item.right)
            && self.keys_equal(&parent.key, &grandparent.item.right)
        {
            self.rotate_left(store, &grandparent.key)?;
        }
        Ok(())
    }

    fn delete_case1<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<(), StoreError> {
        let node = self.must_node(store, key, "delete fixup node")?;
        if node.item.parent.is_empty() {
            return Ok(());
        }
        self.delete_case2(store, key)
    }

    fn delete_case2<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<(), StoreError> {
        let node = self.must_node(store, key, "delete fixup node")?;
        let mut parent = self.must_node(store, &node.item.parent, "delete parent")?;
        let sibling = self.sibling_of(store, &node, &parent)?;

        if node_color(sibling.as_ref()) == Color::Red {
            let node_is_left = self.keys_equal(&node.key, &parent.item.left);
            let mut sibling = sibling.unwrap_or_else(|| {
                panic!("red-black structure corrupted: red sibling missing")
            });
            parent.item.color = Color::Red;
            sibling.item.color = Color::Black;
            self.save(store, &parent)?;
            self.save(store, &sibling)?;
            if node_is_left {
                self.rotate_left(store, &parent.key)?;
            } else {
                self.rotate_right(store, &parent.key)?;
            }
        }
        self.delete_case3(store, key)
    }

    fn delete_case3<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<(), StoreError> {
        let node = self.must_node(store, key, "delete fixup node")?;
        let parent = self.must_node(store, &node.item.parent, "delete parent")?;
        let mut sibling = match self.sibling_of(store, &node, &parent)? {
            Some(sibling) => sibling,
            None => panic!("red-black structure corrupted: sibling missing in delete fixup"),
        };
        let sibling_left = self.node(store, &sibling.item.left)?;
        let sibling_right = self.node(store, &sibling.item.right)?;

        if parent.item.color == Color::Black
            && sibling.item.color == Color::Black
            && node_color(sibling_left.as_ref()) == Color::Black
            && node_color(sibling_right.as_ref()) == Color::Black
        {
            sibling.item.color = Color::Red;
            self.save(store, &sibling)?;
            self.delete_case1(store, &parent.key)
        } else {
            self.delete_case4(store, key)
        }
    }

    fn delete_case4<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<(), StoreError> {
        let node = self.must_node(store, key, "delete fixup node")?;
        let mut parent = self.must_node(store, &node.item.parent, "delete parent")?;
        let mut sibling = match self.sibling_of(store, &node, &parent)? {
            Some(sibling) => sibling,
            None => panic!("red-black structure corrupted: sibling missing in delete fixup"),
        };
        let sibling_left = self.node(store, &sibling.item.left)?;
        let sibling_right = self.node(store, &sibling.item.right)?;

        if parent.item.color == Color::Red
            && sibling.item.color == Color::Black
            && node_color(sibling_left.as_ref()) == Color::Black
            && node_color(sibling_right.as_ref()) == Color::Black
        {
            sibling.item.color = Color::Red;
            parent.item.color = Color::Black;
            self.save(store, &sibling)?;
            self.save(store, &parent)
        } else {
            self.delete_case5(store, key)
        }
    }

    fn delete_case5<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<(), StoreError> {
        let node = self.must_node(store, key, "delete fixup node")?;
        let parent = self.must_node(store, &node.item.parent, "delete parent")?;
        let mut sibling = match self.sibling_of(store, &node, &parent)? {
            Some(sibling) => sibling,
            None => panic!("red-black structure corrupted: sibling missing in delete fixup"),
        };
        let sibling_left = self.node(store, &sibling.item.left)?;
        let sibling_right = self.node(store, &sibling.item.right)?;

        if self.keys_equal(&node.key, &parent.item.left)
            && sibling.item.color == Color::Black
            && node_color(sibling_left.as_ref()) == Color::Red
            && node_color(sibling_right.as_ref()) == Color::Black
        {
            sibling.item.color = Color::Red;
            let mut sibling_left = sibling_left.unwrap_or_else(|| {
                panic!("red-black structure corrupted: red sibling child missing")
            });
            sibling_left.item.color = Color::Black;
            self.save(store, &sibling)?;
            self.save(store, &sibling_left)?;
            self.rotate_right(store, &sibling.key)?;
        } else if self.keys_equal(&node.key, &parent.item.right)
            && sibling.item.color == Color::Black
            && node_color(sibling_right.as_ref()) == Color::Red
            && node_color(sibling_left.as_ref()) == Color::Black
        {
            sibling.item.color = Color::Red;
            let mut sibling_right = sibling_right.unwrap_or_else(|| {
                panic!("red-black structure corrupted: red sibling child missing")
            });
            sibling_right.item.color = Color::Black;
            self.save(store, &sibling)?;
            self.save(store, &sibling_right)?;
            self.rotate_left(store, &sibling.key)?;
        }
        self.delete_case6(store, key)
    }

    fn delete_case6<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<(), StoreError> {
        let node = self.must_node(store, key, "delete fixup node")?;
        let mut parent = self.must_node(store, &node.item.parent, "delete parent")?;
        let mut sibling = match self.sibling_of(store, &node, &parent)? {
            Some(sibling) => sibling,
            None => panic!("red-black structure corrupted: sibling missing in delete fixup"),
        };
        let sibling_left = self.node(store, &sibling.item.left)?;
        let sibling_right = self.node(store, &sibling.item.right)?;

        sibling.item.color = parent.item.color;
        parent.item.color = Color::Black;
        let node_is_left = self.keys_equal(&node.key, &parent.item.left);
        self.save(store, &sibling)?;
        self.save(store, &parent)?;

        if node_is_left && node_color(sibling_right.as_ref()) == Color::Red {
            let mut sibling_right = sibling_right.unwrap_or_else(|| {
                panic!("red-black structure corrupted: red sibling child missing")
            });
            sibling_right.item.color = Color::Black;
            self.save(store, &sibling_right)?;
            self.rotate_left(store, &parent.key)?;
        } else if node_color(sibling_left.as_ref()) == Color::Red {
            let mut sibling_left = sibling_left.unwrap_or_else(|| {
                panic!("red-black structure corrupted: red sibling child missing")
            });
            sibling_left.item.color = Color::Black;
            self.save(store, &sibling_left)?;
            self.rotate_right(store, &parent.key)?;
        }
        Ok(())
    }
}

enum IterState {
    Start,
    At(Key),
    Done,
}

/// In-order cursor; each step loads its nodes through the store.
pub struct TreeIter<'a, C: Codec> {
    tree: &'a Tree,
    store: &'a mut BatchStore<C>,
    next: IterState,
}

impl<'a, C: Codec> TreeIter<'a, C> {
    fn successor(&mut self, node: &Node) -> Result<Option<Key>, StoreError> {
        if !node.item.right.is_empty() {
            let mut current = self.tree.must_node(self.store, &node.item.right, "right child")?;
            while !current.item.left.is_empty() {
                let next = current.item.left;
                current = self.tree.must_node(self.store, &next, "left child")?;
            }
            return Ok(Some(current.key));
        }
        let mut child_key = node.key;
        let mut parent_key = node.item.parent;
        while !parent_key.is_empty() {
            let parent = self.tree.must_node(self.store, &parent_key, "parent")?;
            if self.tree.keys_equal(&child_key, &parent.item.left) {
                return Ok(Some(parent.key));
            }
            child_key = parent.key;
            parent_key = parent.item.parent;
        }
        Ok(None)
    }
}

impl<'a, C: Codec> Iterator for TreeIter<'a, C> {
    type Item = Result<(Key, Vec<u8>), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = match &self.next {
            IterState::Done => return None,
            IterState::Start => match self.tree.left(self.store) {
                Ok(None) => {
                    self.next = IterState::Done;
                    return None;
                }
                Ok(Some(node)) => node,
                Err(err) => {
                    self.next = IterState::Done;
                    return Some(Err(err));
                }
            },
            IterState::At(key) => {
                let key = *key;
                match self.tree.node(self.store, &key) {
                    Ok(Some(node)) => node,
                    Ok(None) => {
                        self.next = IterState::Done;
                        return None;
                    }
                    Err(err) => {
                        self.next = IterState::Done;
                        return Some(Err(err));
                    }
                }
            }
        };

        self.next = match self.successor(&current) {
            Ok(Some(key)) => IterState::At(key),
            Ok(None) => IterState::Done,
            Err(err) => {
                self.next = IterState::Done;
                return Some(Err(err));
            }
        };
        Some(Ok((current.key, current.item.value)))
    }
}
