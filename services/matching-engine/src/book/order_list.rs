//! FIFO order list at one price level
//!
//! A doubly-linked list of orders sharing a price on one side of a book.
//! List methods persist the order records they touch; the list item itself
//! lives as a price-tree value and is saved by the owning [`OrderTree`]
//! after each mutation.
//!
//! [`OrderTree`]: crate::book::order_tree::OrderTree

use crate::book::order::{Order, OrderItem};
use persistence::{BatchStore, Codec};
use serde::{Deserialize, Serialize};
use types::errors::StoreError;
use types::keys::Key;
use types::numeric::{Price, Quantity};

/// Persisted state of one price level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderListItem {
    pub price: Price,
    #[serde(rename = "headOrder")]
    pub head_order: Key,
    #[serde(rename = "tailOrder")]
    pub tail_order: Key,
    pub length: u64,
    /// Sum of member order quantities.
    pub volume: Quantity,
}

/// A price level together with its storage key (`side_slot + price`).
#[derive(Debug, Clone, PartialEq)]
pub struct OrderList {
    pub key: Key,
    pub item: OrderListItem,
}

impl OrderList {
    pub fn new(key: Key, price: Price) -> Self {
        OrderList {
            key,
            item: OrderListItem {
                price,
                head_order: Key::EMPTY,
                tail_order: Key::EMPTY,
                length: 0,
                volume: Quantity::ZERO,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.item.length == 0
    }

    /// Fetch a member order by key; empty and absent keys are `None`.
    pub fn get_order<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
        key: &Key,
    ) -> Result<Option<Order>, StoreError> {
        if key.is_empty() {
            return Ok(None);
        }
        Ok(store.get::<OrderItem>(key)?.map(|item| Order { key: *key, item }))
    }

    pub fn head_order<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
    ) -> Result<Option<Order>, StoreError> {
        let head = self.item.head_order;
        self.get_order(store, &head)
    }

    /// Append at the tail (newest time priority). Persists the order and
    /// the previous tail's link.
    pub fn append_order<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        order: &mut Order,
    ) -> Result<(), StoreError> {
        order.item.next_order = Key::EMPTY;
        order.item.prev_order = self.item.tail_order;
        order.item.order_list = self.key;

        if self.item.length == 0 {
            self.item.head_order = order.key;
        } else {
            let mut tail = match self.get_order(store, &self.item.tail_order.clone())? {
                Some(tail) => tail,
                None => panic!("tail order missing from non-empty price level {}", self.key),
            };
            tail.item.next_order = order.key;
            store.put(tail.key, tail.item)?;
        }
        self.item.tail_order = order.key;
        self.item.length += 1;
        self.item.volume = self.item.volume + order.item.quantity;
        store.put(order.key, order.item.clone())
    }

    /// Unlink a member order, patch its neighbors, and delete its record.
    pub fn remove_order<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        order: &Order,
    ) -> Result<(), StoreError> {
        let prev = order.item.prev_order;
        let next = order.item.next_order;

        if next.is_empty() {
            self.item.tail_order = prev;
        } else {
            let mut next_order = match self.get_order(store, &next)? {
                Some(next_order) => next_order,
                None => panic!("next order missing from price level {}", self.key),
            };
            next_order.item.prev_order = prev;
            store.put(next_order.key, next_order.item)?;
        }
        if prev.is_empty() {
            self.item.head_order = next;
        } else {
            let mut prev_order = match self.get_order(store, &prev)? {
                Some(prev_order) => prev_order,
                None => panic!("previous order missing from price level {}", self.key),
            };
            prev_order.item.next_order = next;
            store.put(prev_order.key, prev_order.item)?;
        }
        self.item.length -= 1;
        self.item.volume = self.item.volume - order.item.quantity;
        store.delete(&order.key, false)
    }

    /// Move an order to the tail, surrendering its time priority. Used when
    /// a resting order grows or changes timestamp.
    pub fn move_to_tail<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        order: &mut Order,
    ) -> Result<(), StoreError> {
        if order.key == self.item.tail_order {
            return Ok(());
        }

        let prev = order.item.prev_order;
        let next = order.item.next_order;
        if prev.is_empty() {
            self.item.head_order = next;
        } else {
            let mut prev_order = match self.get_order(store, &prev)? {
                Some(prev_order) => prev_order,
                None => panic!("previous order missing from price level {}", self.key),
            };
            prev_order.item.next_order = next;
            store.put(prev_order.key, prev_order.item)?;
        }
        // not the tail, so a successor must exist
        let mut next_order = match self.get_order(store, &next)? {
            Some(next_order) => next_order,
            None => panic!("next order missing from price level {}", self.key),
        };
        next_order.item.prev_order = prev;
        store.put(next_order.key, next_order.item)?;

        let mut tail = match self.get_order(store, &self.item.tail_order.clone())? {
            Some(tail) => tail,
            None => panic!("tail order missing from non-empty price level {}", self.key),
        };
        tail.item.next_order = order.key;
        store.put(tail.key, tail.item)?;

        order.item.prev_order = self.item.tail_order;
        order.item.next_order = Key::EMPTY;
        self.item.tail_order = order.key;
        store.put(order.key, order.item.clone())
    }

    /// Member orders from head to tail (for inspection and tests).
    pub fn orders<C: Codec>(&self, store: &mut BatchStore<C>) -> Result<Vec<Order>, StoreError> {
        let mut orders = Vec::with_capacity(self.item.length as usize);
        let mut cursor = self.item.head_order;
        while !cursor.is_empty() {
            let order = match self.get_order(store, &cursor)? {
                Some(order) => order,
                None => panic!("order chain broken at {cursor} in price level {}", self.key),
            };
            cursor = order.item.next_order;
            orders.push(order);
        }
        Ok(orders)
    }
}
