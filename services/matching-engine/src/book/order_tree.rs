//! One side of an order book
//!
//! An `OrderTree` owns the red-black price tree for its side (keys are
//! `side_slot + price`, values are encoded price-level items) and the side
//! totals. Order records themselves live at `book_slot + order_id`, which
//! doubles as the id lookup index: a record carries its price and its
//! containing-list key, so side + id + price is enough to find it.

use crate::book::order::{Order, OrderItem};
use crate::book::order_list::{OrderList, OrderListItem};
use persistence::{BatchStore, Codec, Tree};
use serde::{Deserialize, Serialize};
use types::errors::StoreError;
use types::keys::{Key, Slot};
use types::numeric::{Price, Quantity};
use types::quote::Quote;

/// Persisted side metadata; saved under the side slot's base key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTreeItem {
    /// Total quantity across every price level.
    pub volume: Quantity,
    #[serde(rename = "numOrders")]
    pub num_orders: u64,
    /// Number of distinct price levels.
    pub depth: u64,
    #[serde(rename = "priceTreeKey")]
    pub price_tree_root: Key,
    #[serde(rename = "priceTreeSize")]
    pub price_tree_size: u64,
}

impl Default for OrderTreeItem {
    fn default() -> Self {
        OrderTreeItem {
            volume: Quantity::ZERO,
            num_orders: 0,
            depth: 0,
            price_tree_root: Key::EMPTY,
            price_tree_size: 0,
        }
    }
}

/// One side (bids or asks) of an order book.
#[derive(Debug, Clone)]
pub struct OrderTree {
    key: Key,
    slot: Slot,
    order_slot: Slot,
    price_tree: Tree,
    pub item: OrderTreeItem,
}

impl OrderTree {
    /// `slot` namespaces this side's price levels and metadata;
    /// `order_slot` is the owning book's slot, where order records live.
    pub fn new(slot: Slot, order_slot: Slot) -> Self {
        OrderTree {
            key: slot.base_key(),
            slot,
            order_slot,
            price_tree: Tree::new(),
            item: OrderTreeItem::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.price_tree.is_empty()
    }

    fn price_key(&self, price: Price) -> Key {
        self.slot.key(price.to_u256())
    }

    fn price_of(&self, key: Key) -> Price {
        Price::new(self.slot.local(key))
    }

    fn order_key(&self, order_id: u64) -> Key {
        self.order_slot.key_for_id(order_id)
    }

    /// Snapshot the price-tree root into the metadata record and persist it.
    pub fn save<C: Codec>(&mut self, store: &mut BatchStore<C>) -> Result<(), StoreError> {
        self.item.price_tree_root = self.price_tree.root_key();
        self.item.price_tree_size = self.price_tree.size();
        store.put(self.key, self.item.clone())
    }

    /// Reload persisted metadata, if any, and re-root the price tree.
    pub fn restore<C: Codec>(&mut self, store: &mut BatchStore<C>) -> Result<(), StoreError> {
        if let Some(item) = store.get::<OrderTreeItem>(&self.key.clone())? {
            self.price_tree.set_root(item.price_tree_root, item.price_tree_size);
            self.item = item;
        }
        Ok(())
    }

    pub fn price_exist<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
        price: Price,
    ) -> Result<bool, StoreError> {
        self.price_tree.has(store, &self.price_key(price))
    }

    /// The price level at `price`, or `None` when the side has no such level.
    pub fn price_list<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
        price: Price,
    ) -> Result<Option<OrderList>, StoreError> {
        let key = self.price_key(price);
        match self.price_tree.get(store, &key)? {
            Some(bytes) => Ok(Some(OrderList {
                key,
                item: store.decode::<OrderListItem>(&bytes)?,
            })),
            None => Ok(None),
        }
    }

    /// Lowest price on this side, or zero when empty.
    pub fn min_price<C: Codec>(&self, store: &mut BatchStore<C>) -> Result<Price, StoreError> {
        match self.price_tree.left(store)? {
            Some(node) => Ok(self.price_of(node.key)),
            None => Ok(Price::ZERO),
        }
    }

    /// Highest price on this side, or zero when empty.
    pub fn max_price<C: Codec>(&self, store: &mut BatchStore<C>) -> Result<Price, StoreError> {
        match self.price_tree.right(store)? {
            Some(node) => Ok(self.price_of(node.key)),
            None => Ok(Price::ZERO),
        }
    }

    pub fn min_price_list<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
    ) -> Result<Option<OrderList>, StoreError> {
        match self.price_tree.left(store)? {
            Some(node) => Ok(Some(OrderList {
                key: node.key,
                item: store.decode::<OrderListItem>(&node.item.value)?,
            })),
            None => Ok(None),
        }
    }

    pub fn max_price_list<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
    ) -> Result<Option<OrderList>, StoreError> {
        match self.price_tree.right(store)? {
            Some(node) => Ok(Some(OrderList {
                key: node.key,
                item: store.decode::<OrderListItem>(&node.item.value)?,
            })),
            None => Ok(None),
        }
    }

    /// Every price level in ascending price order.
    pub fn price_levels<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
    ) -> Result<Vec<OrderList>, StoreError> {
        let entries: Vec<(Key, Vec<u8>)> =
            self.price_tree.iter(store).collect::<Result<_, _>>()?;
        entries
            .into_iter()
            .map(|(key, bytes)| {
                Ok(OrderList {
                    key,
                    item: store.decode::<OrderListItem>(&bytes)?,
                })
            })
            .collect()
    }

    fn save_order_list<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        list: &OrderList,
    ) -> Result<(), StoreError> {
        let value = store.encode(&list.item)?;
        self.price_tree.put(store, list.key, value)
    }

    /// Insert a new resting order, creating its price level if needed.
    pub fn insert_order<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        quote: &Quote,
        order_id: u64,
        timestamp: u64,
    ) -> Result<Order, StoreError> {
        let mut list = match self.price_list(store, quote.price)? {
            Some(list) => list,
            None => {
                self.item.depth += 1;
                OrderList::new(self.price_key(quote.price), quote.price)
            }
        };
        let mut order = Order::new(
            self.order_key(order_id),
            order_id,
            quote.quantity,
            quote.price,
            timestamp,
        );
        list.append_order(store, &mut order)?;
        self.save_order_list(store, &list)?;
        self.item.volume = self.item.volume + order.item.quantity;
        self.item.num_orders += 1;
        Ok(order)
    }

    /// Apply a quote update to an existing order: same price adjusts
    /// quantity in place, a new price migrates the order (losing priority).
    pub fn update_order<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        quote: &Quote,
        order: Order,
    ) -> Result<(), StoreError> {
        let timestamp = quote.timestamp.unwrap_or(order.item.timestamp);
        if quote.price == order.item.price {
            let mut order = order;
            self.update_order_quantity(store, &mut order, quote.quantity, timestamp)
        } else {
            let order_id = order.item.order_id;
            self.remove_order(store, &order)?;
            self.insert_order(store, quote, order_id, timestamp)?;
            Ok(())
        }
    }

    /// Set a resting order's quantity. Growing the order or changing its
    /// timestamp surrenders time priority (moves it to the tail); shrinking
    /// it in place keeps its position, which is how partial fills preserve
    /// the maker's priority.
    pub fn update_order_quantity<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        order: &mut Order,
        new_quantity: Quantity,
        new_timestamp: u64,
    ) -> Result<(), StoreError> {
        let old_quantity = order.item.quantity;
        let mut list = match self.price_list(store, order.item.price)? {
            Some(list) => list,
            None => panic!("price level missing for resting order {}", order.key),
        };
        if new_quantity > old_quantity || new_timestamp != order.item.timestamp {
            list.move_to_tail(store, order)?;
        }
        list.item.volume = list.item.volume - old_quantity + new_quantity;
        self.item.volume = self.item.volume - old_quantity + new_quantity;
        order.item.quantity = new_quantity;
        order.item.timestamp = new_timestamp;
        store.put(order.key, order.item.clone())?;
        self.save_order_list(store, &list)
    }

    /// Remove an order; drops its price level from the tree when it was the
    /// last order there.
    pub fn remove_order<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        order: &Order,
    ) -> Result<(), StoreError> {
        let mut list = match self.price_list(store, order.item.price)? {
            Some(list) => list,
            None => panic!("price level missing for resting order {}", order.key),
        };
        list.remove_order(store, order)?;
        if list.is_empty() {
            self.price_tree.remove(store, &list.key)?;
            self.item.depth -= 1;
        } else {
            self.save_order_list(store, &list)?;
        }
        self.item.volume = self.item.volume - order.item.quantity;
        self.item.num_orders -= 1;
        Ok(())
    }

    /// Fetch an order by id, verifying it actually rests at `price` on this
    /// side; `None` otherwise.
    pub fn get_order<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
        order_id: u64,
        price: Price,
    ) -> Result<Option<Order>, StoreError> {
        if !self.price_exist(store, price)? {
            return Ok(None);
        }
        let key = self.order_key(order_id);
        match store.get::<OrderItem>(&key)? {
            Some(item) if item.order_list == self.price_key(price) => {
                Ok(Some(Order { key, item }))
            }
            _ => Ok(None),
        }
    }

    pub fn order_exist<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
        order_id: u64,
        price: Price,
    ) -> Result<bool, StoreError> {
        Ok(self.get_order(store, order_id, price)?.is_some())
    }
}
