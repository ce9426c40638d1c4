//! Persisted order records
//!
//! An order is stored under `book_slot + order_id` and carries intrusive
//! doubly-linked-list keys tying it into the FIFO at its price level. No
//! order ever holds a live reference to another, only byte keys usable
//! against the store.

use serde::{Deserialize, Serialize};
use types::keys::Key;
use types::numeric::{Price, Quantity};

/// Persisted payload of one resting order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub timestamp: u64,
    pub quantity: Quantity,
    pub price: Price,
    #[serde(rename = "orderID")]
    pub order_id: u64,
    #[serde(rename = "nextOrder")]
    pub next_order: Key,
    #[serde(rename = "prevOrder")]
    pub prev_order: Key,
    /// Key of the containing price level.
    #[serde(rename = "orderList")]
    pub order_list: Key,
}

/// An order together with its storage key.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub key: Key,
    pub item: OrderItem,
}

impl Order {
    /// Fresh unlinked order; the list links are set on append.
    pub fn new(key: Key, order_id: u64, quantity: Quantity, price: Price, timestamp: u64) -> Self {
        Order {
            key,
            item: OrderItem {
                timestamp,
                quantity,
                price,
                order_id,
                next_order: Key::EMPTY,
                prev_order: Key::EMPTY,
                order_list: Key::EMPTY,
            },
        }
    }
}
