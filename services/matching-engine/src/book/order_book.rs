//! Order book and price-time-priority matching
//!
//! A book owns its two sides and the monotonic order-id counter. Matching
//! consumes the opposing side best-price-first, FIFO within a level; the
//! resting order is always the price maker. All mutations flow into the
//! shared store's pending buffer; `save` runs last so the book item is the
//! final write of every `process_order`.

use crate::book::order::{Order, OrderItem};
use crate::book::order_tree::OrderTree;
use persistence::{BatchStore, Codec};
use serde::{Deserialize, Serialize};
use tracing::debug;
use types::clock::Clock;
use types::errors::{BookError, StoreError};
use types::keys::{Key, Slot};
use types::numeric::{Price, Quantity};
use types::quote::{OrderKind, Quote, Side};
use types::trade::Trade;

/// Persisted book metadata, stored under the book slot's base key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookItem {
    #[serde(rename = "time")]
    pub timestamp: u64,
    #[serde(rename = "nextOrderID")]
    pub next_order_id: u64,
    #[serde(rename = "maxVolume")]
    pub max_price_point: u64,
    pub name: String,
}

/// A limit order book for one pair.
pub struct OrderBook {
    pub key: Key,
    slot: Slot,
    pub bids: OrderTree,
    pub asks: OrderTree,
    pub item: OrderBookItem,
}

impl OrderBook {
    /// Create a book for `name` (lowercased). The book slot is the SHA-256
    /// of the name; bids and asks take segments 1 and 2 of it.
    pub fn new(name: &str, max_price_point: u64) -> Self {
        let name = name.to_lowercase();
        let slot = Slot::from_name(&name);
        OrderBook {
            key: slot.base_key(),
            bids: OrderTree::new(slot.segment(1), slot),
            asks: OrderTree::new(slot.segment(2), slot),
            item: OrderBookItem {
                timestamp: 0,
                next_order_id: 0,
                max_price_point,
                name,
            },
            slot,
        }
    }

    pub fn name(&self) -> &str {
        &self.item.name
    }

    fn tree(&self, side: Side) -> &OrderTree {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn tree_mut(&mut self, side: Side) -> &mut OrderTree {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    pub fn update_time(&mut self, clock: &dyn Clock) {
        self.item.timestamp = clock.now();
    }

    /// Persist both sides and the book item (in that order).
    pub fn save<C: Codec>(&mut self, store: &mut BatchStore<C>) -> Result<(), StoreError> {
        self.asks.save(store)?;
        self.bids.save(store)?;
        store.put(self.key, self.item.clone())
    }

    /// Reload persisted sides and book item; missing records keep the fresh
    /// defaults.
    pub fn restore<C: Codec>(&mut self, store: &mut BatchStore<C>) -> Result<(), StoreError> {
        self.asks.restore(store)?;
        self.bids.restore(store)?;
        if let Some(item) = store.get::<OrderBookItem>(&self.key)? {
            self.item = item;
        }
        Ok(())
    }

    pub fn best_bid<C: Codec>(&self, store: &mut BatchStore<C>) -> Result<Price, StoreError> {
        self.bids.max_price(store)
    }

    pub fn best_ask<C: Codec>(&self, store: &mut BatchStore<C>) -> Result<Price, StoreError> {
        self.asks.min_price(store)
    }

    pub fn worst_bid<C: Codec>(&self, store: &mut BatchStore<C>) -> Result<Price, StoreError> {
        self.bids.min_price(store)
    }

    pub fn worst_ask<C: Codec>(&self, store: &mut BatchStore<C>) -> Result<Price, StoreError> {
        self.asks.max_price(store)
    }

    /// Resting volume at a price, or zero when the level does not exist.
    pub fn volume_at_price<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
        side: Side,
        price: Price,
    ) -> Result<Quantity, StoreError> {
        match self.tree(side).price_list(store, price)? {
            Some(list) => Ok(list.item.volume),
            None => Ok(Quantity::ZERO),
        }
    }

    /// Fetch an order record by id, regardless of side.
    pub fn order<C: Codec>(
        &self,
        store: &mut BatchStore<C>,
        order_id: u64,
    ) -> Result<Option<Order>, StoreError> {
        let key = self.slot.key_for_id(order_id);
        Ok(store.get::<OrderItem>(&key)?.map(|item| Order { key, item }))
    }

    /// Process an inbound quote: stamp the book time, assign the next order
    /// id, match, and save. Returns the trades in fill order plus the
    /// residual resting quote, if any.
    pub fn process_order<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        clock: &dyn Clock,
        quote: &Quote,
    ) -> Result<(Vec<Trade>, Option<Quote>), StoreError> {
        self.update_time(clock);
        self.item.next_order_id += 1;
        let assigned_id = self.item.next_order_id;

        let result = match quote.kind {
            OrderKind::Market => (self.process_market_order(store, quote)?, None),
            OrderKind::Limit => self.process_limit_order(store, quote, assigned_id)?,
        };

        self.save(store)?;
        Ok(result)
    }

    fn process_market_order<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        quote: &Quote,
    ) -> Result<Vec<Trade>, StoreError> {
        let mut remaining = quote.quantity;
        let mut trades = Vec::new();
        let opposing = quote.side.opposite();

        while !remaining.is_zero() && !self.tree(opposing).is_empty() {
            let best_price = match opposing {
                Side::Ask => self.asks.min_price(store)?,
                Side::Bid => self.bids.max_price(store)?,
            };
            let (left, mut new_trades) =
                self.process_order_list(store, opposing, best_price, remaining, quote)?;
            remaining = left;
            trades.append(&mut new_trades);
        }
        Ok(trades)
    }

    fn process_limit_order<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        quote: &Quote,
        assigned_id: u64,
    ) -> Result<(Vec<Trade>, Option<Quote>), StoreError> {
        let mut remaining = quote.quantity;
        let mut trades = Vec::new();
        let opposing = quote.side.opposite();

        while !remaining.is_zero() && !self.tree(opposing).is_empty() {
            let best_price = match opposing {
                Side::Ask => self.asks.min_price(store)?,
                Side::Bid => self.bids.max_price(store)?,
            };
            let crosses = match quote.side {
                Side::Bid => quote.price >= best_price,
                Side::Ask => quote.price <= best_price,
            };
            if !crosses {
                break;
            }
            let (left, mut new_trades) =
                self.process_order_list(store, opposing, best_price, remaining, quote)?;
            remaining = left;
            trades.append(&mut new_trades);
        }

        let mut order_in_book = None;
        if !remaining.is_zero() {
            let mut resting = quote.clone();
            resting.order_id = Some(assigned_id);
            resting.quantity = remaining;
            let timestamp = resting.timestamp.unwrap_or(self.item.timestamp);
            self.tree_mut(quote.side)
                .insert_order(store, &resting, assigned_id, timestamp)?;
            order_in_book = Some(resting);
        }
        Ok((trades, order_in_book))
    }

    // Consume the FIFO at one opposing price level while quantity remains.
    // The level is re-read every iteration: removals rewrite it in the
    // price tree, and a loaded list is a detached copy.
    fn process_order_list<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        opposing: Side,
        price: Price,
        mut remaining: Quantity,
        quote: &Quote,
    ) -> Result<(Quantity, Vec<Trade>), StoreError> {
        let mut trades = Vec::new();

        while !remaining.is_zero() {
            let Some(list) = self.tree(opposing).price_list(store, price)? else {
                break;
            };
            if list.is_empty() {
                break;
            }
            let mut head = match list.head_order(store)? {
                Some(head) => head,
                None => panic!("head order missing from non-empty price level {}", list.key),
            };

            let traded_price = head.item.price;
            let traded_quantity;
            if remaining < head.item.quantity {
                traded_quantity = remaining;
                // partial fill: keep the maker's timestamp so it holds its
                // queue position
                let new_quantity = head.item.quantity - remaining;
                let timestamp = head.item.timestamp;
                self.tree_mut(opposing)
                    .update_order_quantity(store, &mut head, new_quantity, timestamp)?;
                remaining = Quantity::ZERO;
            } else {
                traded_quantity = head.item.quantity;
                self.tree_mut(opposing).remove_order(store, &head)?;
                remaining = remaining - traded_quantity;
            }

            debug!(
                timestamp = self.item.timestamp,
                price = %traded_price,
                quantity = %traded_quantity,
                maker = head.item.order_id,
                "trade"
            );
            trades.push(Trade::new(
                self.item.timestamp,
                traded_price,
                traded_quantity,
                quote.trade_id,
            ));
        }
        Ok((remaining, trades))
    }

    /// Cancel by side, id and price; cancelling a missing order is a no-op.
    pub fn cancel_order<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        clock: &dyn Clock,
        side: Side,
        order_id: u64,
        price: Price,
    ) -> Result<(), StoreError> {
        self.update_time(clock);
        if let Some(order) = self.tree(side).get_order(store, order_id, price)? {
            self.tree_mut(side).remove_order(store, &order)?;
        }
        Ok(())
    }

    /// Update a resting order from a quote carrying its id. A no-op when no
    /// order with that id rests at the quoted side and price.
    pub fn update_order<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        clock: &dyn Clock,
        quote: &Quote,
    ) -> Result<(), BookError> {
        let Some(order_id) = quote.order_id else {
            return Err(BookError::InvalidInput("order update requires an order_id".into()));
        };
        self.update_time(clock);
        self.modify_order(store, quote, order_id, quote.price)?;
        Ok(())
    }

    /// Re-quote the order with `order_id` resting at `price` on the quote's
    /// side. A no-op when the order is not found there.
    pub fn modify_order<C: Codec>(
        &mut self,
        store: &mut BatchStore<C>,
        quote: &Quote,
        order_id: u64,
        price: Price,
    ) -> Result<(), StoreError> {
        let mut quote = quote.clone();
        quote.timestamp = Some(self.item.timestamp);
        if let Some(order) = self.tree(quote.side).get_order(store, order_id, price)? {
            self.tree_mut(quote.side).update_order(store, &quote, order)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::JsonCodec;
    use types::clock::ManualClock;

    const TS: u64 = 123452342343;

    fn setup() -> (OrderBook, BatchStore<JsonCodec>, ManualClock) {
        (
            OrderBook::new("TOMO/WETH", 100_000),
            BatchStore::in_memory(),
            ManualClock::new(TS),
        )
    }

    fn limit(side: Side, quantity: u64, price: u64) -> Quote {
        Quote {
            pair_name: "tomo/weth".into(),
            kind: OrderKind::Limit,
            side,
            quantity: Quantity::from_u64(quantity),
            price: Price::from_u64(price),
            order_id: None,
            timestamp: Some(TS),
            trade_id: None,
        }
    }

    fn market(side: Side, quantity: u64) -> Quote {
        Quote {
            kind: OrderKind::Market,
            price: Price::ZERO,
            ..limit(side, quantity, 0)
        }
    }

    fn seed_asks(book: &mut OrderBook, store: &mut BatchStore<JsonCodec>, clock: &ManualClock) {
        for quote in [
            limit(Side::Ask, 5, 101),
            limit(Side::Ask, 5, 103),
            limit(Side::Ask, 5, 101),
            limit(Side::Ask, 5, 101),
        ] {
            let (trades, resting) = book.process_order(store, clock, &quote).unwrap();
            assert!(trades.is_empty());
            assert!(resting.is_some());
        }
    }

    fn seed_bids(book: &mut OrderBook, store: &mut BatchStore<JsonCodec>, clock: &ManualClock) {
        for quote in [
            limit(Side::Bid, 5, 99),
            limit(Side::Bid, 5, 98),
            limit(Side::Bid, 5, 99),
            limit(Side::Bid, 5, 97),
        ] {
            book.process_order(store, clock, &quote).unwrap();
        }
    }

    fn px(value: u64) -> Price {
        Price::from_u64(value)
    }

    fn qty(value: u64) -> Quantity {
        Quantity::from_u64(value)
    }

    #[test]
    fn test_fresh_book_reports_zero_extremes() {
        let (book, mut store, _) = setup();
        assert_eq!(book.best_ask(&mut store).unwrap(), Price::ZERO);
        assert_eq!(book.best_bid(&mut store).unwrap(), Price::ZERO);
        assert_eq!(book.worst_ask(&mut store).unwrap(), Price::ZERO);
        assert_eq!(book.worst_bid(&mut store).unwrap(), Price::ZERO);
        assert_eq!(
            book.volume_at_price(&mut store, Side::Bid, Price::ZERO).unwrap(),
            Quantity::ZERO
        );
    }

    #[test]
    fn test_ask_aggregation_across_levels() {
        let (mut book, mut store, clock) = setup();
        seed_asks(&mut book, &mut store, &clock);

        assert_eq!(book.best_ask(&mut store).unwrap(), px(101));
        assert_eq!(book.worst_ask(&mut store).unwrap(), px(103));
        assert_eq!(
            book.volume_at_price(&mut store, Side::Ask, px(101)).unwrap(),
            qty(15)
        );
        assert_eq!(book.asks.item.num_orders, 4);
    }

    #[test]
    fn test_bid_pile_extremes() {
        let (mut book, mut store, clock) = setup();
        seed_bids(&mut book, &mut store, &clock);

        assert_eq!(book.best_bid(&mut store).unwrap(), px(99));
        assert_eq!(book.worst_bid(&mut store).unwrap(), px(97));
        assert_eq!(
            book.volume_at_price(&mut store, Side::Bid, px(99)).unwrap(),
            qty(10)
        );
    }

    #[test]
    fn test_small_crossing_limit_trades_at_maker_price() {
        let (mut book, mut store, clock) = setup();
        seed_asks(&mut book, &mut store, &clock);
        seed_bids(&mut book, &mut store, &clock);

        let (trades, resting) = book
            .process_order(&mut store, &clock, &limit(Side::Bid, 2, 102))
            .unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, px(101));
        assert_eq!(trades[0].quantity, qty(2));
        assert!(resting.is_none());
        // the partially filled head keeps its position and quantity shrinks
        assert_eq!(
            book.volume_at_price(&mut store, Side::Ask, px(101)).unwrap(),
            qty(13)
        );
    }

    #[test]
    fn test_large_crossing_limit_rests_residual() {
        let (mut book, mut store, clock) = setup();
        seed_asks(&mut book, &mut store, &clock);
        seed_bids(&mut book, &mut store, &clock);

        let (trades, resting) = book
            .process_order(&mut store, &clock, &limit(Side::Bid, 50, 102))
            .unwrap();

        // three heads at 101 are swept, then 103 does not cross 102
        assert_eq!(trades.len(), 3);
        assert!(trades.iter().all(|trade| trade.price == px(101)));
        let total: Quantity = trades
            .iter()
            .fold(Quantity::ZERO, |sum, trade| sum + trade.quantity);
        assert_eq!(total, qty(15));

        let resting = resting.unwrap();
        assert_eq!(resting.quantity, qty(35));
        assert_eq!(resting.price, px(102));
        assert_eq!(book.best_bid(&mut store).unwrap(), px(102));
        assert_eq!(book.best_ask(&mut store).unwrap(), px(103));
        assert!(!book.asks.price_exist(&mut store, px(101)).unwrap());
    }

    #[test]
    fn test_no_trade_crosses_the_limit_price() {
        let (mut book, mut store, clock) = setup();
        seed_asks(&mut book, &mut store, &clock);

        let (trades, _) = book
            .process_order(&mut store, &clock, &limit(Side::Bid, 50, 102))
            .unwrap();
        assert!(trades.iter().all(|trade| trade.price <= px(102)));
    }

    #[test]
    fn test_market_order_sweeps_multiple_levels() {
        let (mut book, mut store, clock) = setup();
        seed_asks(&mut book, &mut store, &clock);

        let (trades, resting) = book
            .process_order(&mut store, &clock, &market(Side::Bid, 17))
            .unwrap();
        assert!(resting.is_none());

        let fills: Vec<(Price, Quantity)> = trades
            .iter()
            .map(|trade| (trade.price, trade.quantity))
            .collect();
        assert_eq!(
            fills,
            vec![
                (px(101), qty(5)),
                (px(101), qty(5)),
                (px(101), qty(5)),
                (px(103), qty(2)),
            ]
        );
        assert_eq!(
            book.volume_at_price(&mut store, Side::Ask, px(103)).unwrap(),
            qty(3)
        );
        assert!(book.asks.price_exist(&mut store, px(103)).unwrap());
    }

    #[test]
    fn test_market_order_on_empty_book_does_nothing() {
        let (mut book, mut store, clock) = setup();
        let (trades, resting) = book
            .process_order(&mut store, &clock, &market(Side::Ask, 10))
            .unwrap();
        assert!(trades.is_empty());
        assert!(resting.is_none());
    }

    #[test]
    fn test_fifo_within_a_price_level() {
        let (mut book, mut store, clock) = setup();
        let (_, first) = book
            .process_order(&mut store, &clock, &limit(Side::Ask, 5, 101))
            .unwrap();
        let first_id = first.unwrap().order_id.unwrap();
        book.process_order(&mut store, &clock, &limit(Side::Ask, 5, 101))
            .unwrap();

        // consuming 5 must remove exactly the earliest order
        book.process_order(&mut store, &clock, &market(Side::Bid, 5))
            .unwrap();
        assert!(book.order(&mut store, first_id).unwrap().is_none());
        let list = book.asks.price_list(&mut store, px(101)).unwrap().unwrap();
        let head = list.head_order(&mut store).unwrap().unwrap();
        assert_eq!(head.item.order_id, first_id + 1);
    }

    #[test]
    fn test_order_ids_increase_monotonically() {
        let (mut book, mut store, clock) = setup();
        let mut last = 0;
        for price in [101u64, 102, 103, 104] {
            let (_, resting) = book
                .process_order(&mut store, &clock, &limit(Side::Ask, 5, price))
                .unwrap();
            let id = resting.unwrap().order_id.unwrap();
            assert!(id > last);
            last = id;
        }
        // even fully-matched quotes consume an id
        book.process_order(&mut store, &clock, &market(Side::Bid, 5))
            .unwrap();
        let (_, resting) = book
            .process_order(&mut store, &clock, &limit(Side::Ask, 5, 105))
            .unwrap();
        assert_eq!(resting.unwrap().order_id.unwrap(), last + 2);
    }

    #[test]
    fn test_cancel_order_shrinks_level_then_drops_it() {
        let (mut book, mut store, clock) = setup();
        let (_, resting) = book
            .process_order(&mut store, &clock, &limit(Side::Ask, 5, 101))
            .unwrap();
        let first_id = resting.unwrap().order_id.unwrap();
        book.process_order(&mut store, &clock, &limit(Side::Ask, 3, 101))
            .unwrap();
        let depth_before = book.asks.item.depth;

        book.cancel_order(&mut store, &clock, Side::Ask, first_id, px(101))
            .unwrap();
        assert_eq!(
            book.volume_at_price(&mut store, Side::Ask, px(101)).unwrap(),
            qty(3)
        );
        assert_eq!(book.asks.item.depth, depth_before);

        book.cancel_order(&mut store, &clock, Side::Ask, first_id + 1, px(101))
            .unwrap();
        assert!(!book.asks.price_exist(&mut store, px(101)).unwrap());
        assert_eq!(book.asks.item.depth, depth_before - 1);
    }

    #[test]
    fn test_cancel_missing_order_is_noop() {
        let (mut book, mut store, clock) = setup();
        book.process_order(&mut store, &clock, &limit(Side::Ask, 5, 101))
            .unwrap();
        book.cancel_order(&mut store, &clock, Side::Ask, 99, px(101))
            .unwrap();
        book.cancel_order(&mut store, &clock, Side::Bid, 1, px(101))
            .unwrap();
        assert_eq!(
            book.volume_at_price(&mut store, Side::Ask, px(101)).unwrap(),
            qty(5)
        );
    }

    #[test]
    fn test_update_order_changes_quantity_in_place() {
        let (mut book, mut store, clock) = setup();
        let (_, resting) = book
            .process_order(&mut store, &clock, &limit(Side::Ask, 5, 101))
            .unwrap();
        let id = resting.unwrap().order_id.unwrap();

        let mut update = limit(Side::Ask, 9, 101);
        update.order_id = Some(id);
        book.update_order(&mut store, &clock, &update).unwrap();
        assert_eq!(
            book.volume_at_price(&mut store, Side::Ask, px(101)).unwrap(),
            qty(9)
        );
    }

    #[test]
    fn test_update_order_migrates_to_new_price() {
        let (mut book, mut store, clock) = setup();
        let (_, resting) = book
            .process_order(&mut store, &clock, &limit(Side::Ask, 5, 101))
            .unwrap();
        let id = resting.unwrap().order_id.unwrap();

        // the caller names the current price; the quote carries the new one
        let mut update = limit(Side::Ask, 5, 105);
        update.order_id = Some(id);
        book.modify_order(&mut store, &update, id, px(101)).unwrap();
        assert!(!book.asks.price_exist(&mut store, px(101)).unwrap());
        assert_eq!(book.best_ask(&mut store).unwrap(), px(105));
    }

    #[test]
    fn test_update_missing_order_is_noop() {
        let (mut book, mut store, clock) = setup();
        let mut update = limit(Side::Ask, 9, 101);
        update.order_id = Some(40);
        book.update_order(&mut store, &clock, &update).unwrap();
        assert!(book.asks.is_empty());
    }

    #[test]
    fn test_save_restore_round_trip() {
        let (mut book, mut store, clock) = setup();
        seed_asks(&mut book, &mut store, &clock);
        seed_bids(&mut book, &mut store, &clock);
        book.save(&mut store).unwrap();

        let mut restored = OrderBook::new("tomo/weth", 100_000);
        restored.restore(&mut store).unwrap();
        assert_eq!(restored.item, book.item);
        assert_eq!(restored.best_ask(&mut store).unwrap(), px(101));
        assert_eq!(restored.best_bid(&mut store).unwrap(), px(99));
        assert_eq!(
            restored.volume_at_price(&mut store, Side::Ask, px(101)).unwrap(),
            qty(15)
        );

        // the restored handle keeps matching correctly
        let (trades, _) = restored
            .process_order(&mut store, &clock, &limit(Side::Bid, 2, 102))
            .unwrap();
        assert_eq!(trades[0].price, px(101));
    }

    #[test]
    fn test_trade_records_carry_book_time_and_trade_id() {
        let (mut book, mut store, clock) = setup();
        clock.set(999);
        book.process_order(&mut store, &clock, &limit(Side::Ask, 5, 101))
            .unwrap();

        clock.set(1_000);
        let mut taker = limit(Side::Bid, 5, 101);
        taker.trade_id = Some(77);
        let (trades, _) = book.process_order(&mut store, &clock, &taker).unwrap();
        assert_eq!(trades[0].timestamp, 1_000);
        assert_eq!(trades[0].trade_id, Some(77));
    }
}
