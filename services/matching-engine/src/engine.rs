//! Multi-pair engine
//!
//! Owns the shared write-back store and a lazily-created order book per
//! allowed pair. Books are keyed by lowercased pair name and restored from
//! the store on first access, so an engine reopened over the same database
//! resumes where the last commit left off.

use crate::book::order::Order;
use crate::book::order_book::OrderBook;
use persistence::{BatchStore, Codec, JsonCodec};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};
use types::clock::{Clock, SystemClock};
use types::errors::{BookError, StoreError};
use types::numeric::{Price, Quantity};
use types::quote::{Quote, QuoteInput, Side};
use types::trade::Trade;

/// Order-matching engine over one shared store.
pub struct Engine<C: Codec = JsonCodec> {
    store: BatchStore<C>,
    books: HashMap<String, OrderBook>,
    /// Allowed pair names (lowercased) with their max price point.
    allowed_pairs: HashMap<String, u64>,
    clock: Box<dyn Clock>,
}

impl Engine<JsonCodec> {
    /// Engine over a sled database at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        allowed_pairs: HashMap<String, u64>,
    ) -> Result<Self, StoreError> {
        Ok(Self::with_store(
            BatchStore::open(path)?,
            allowed_pairs,
            Box::new(SystemClock),
        ))
    }

    /// Engine over an in-memory store, for tests and simulations.
    pub fn in_memory(allowed_pairs: HashMap<String, u64>) -> Self {
        Self::with_store(BatchStore::in_memory(), allowed_pairs, Box::new(SystemClock))
    }
}

impl<C: Codec> Engine<C> {
    pub fn with_store(
        store: BatchStore<C>,
        allowed_pairs: HashMap<String, u64>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let allowed_pairs = allowed_pairs
            .into_iter()
            .map(|(name, max)| (name.to_lowercase(), max))
            .collect();
        Engine {
            store,
            books: HashMap::new(),
            allowed_pairs,
            clock,
        }
    }

    pub fn has_order_book(&self, pair: &str) -> bool {
        self.books.contains_key(&pair.to_lowercase())
    }

    /// Get the book for a pair, creating and restoring it on first access.
    /// Pairs outside the allowed set are rejected.
    pub fn order_book(&mut self, pair: &str) -> Result<&mut OrderBook, BookError> {
        let name = pair.to_lowercase();
        if !self.books.contains_key(&name) {
            let Some(&max_price_point) = self.allowed_pairs.get(&name) else {
                return Err(BookError::UnknownPair(pair.to_string()));
            };
            let mut book = OrderBook::new(&name, max_price_point);
            book.restore(&mut self.store)?;
            self.books.insert(name.clone(), book);
        }
        Ok(self.books.get_mut(&name).unwrap())
    }

    /// Submit a quote. A zero order id processes it as a new order; a
    /// nonzero id routes to the update path (which never produces trades).
    /// Unknown pairs yield an empty result rather than an error.
    pub fn process_order(
        &mut self,
        input: QuoteInput,
    ) -> Result<(Vec<Trade>, Option<Quote>), BookError> {
        let quote = Quote::parse(input)?;
        match self.order_book(&quote.pair_name) {
            Err(BookError::UnknownPair(pair)) => {
                debug!(pair = %pair, "no order book for pair");
                return Ok((Vec::new(), None));
            }
            Err(err) => return Err(err),
            Ok(_) => {}
        }

        let Self { books, store, clock, .. } = self;
        let book = books.get_mut(&quote.pair_name).unwrap();
        if quote.order_id.is_none() {
            debug!(pair = %quote.pair_name, side = ?quote.side, "process order");
            Ok(book.process_order(store, clock.as_ref(), &quote)?)
        } else {
            debug!(pair = %quote.pair_name, order_id = ?quote.order_id, "update order");
            if let Err(err) = book.update_order(store, clock.as_ref(), &quote) {
                warn!(%err, "order update failed");
            }
            Ok((Vec::new(), None))
        }
    }

    /// Cancel the order named by the quote's side, id and price. Unlike
    /// `process_order`, an unknown pair here is an error.
    pub fn cancel_order(&mut self, input: QuoteInput) -> Result<(), BookError> {
        let quote = Quote::parse(input)?;
        let Some(order_id) = quote.order_id else {
            return Err(BookError::InvalidInput("cancel requires a nonzero order_id".into()));
        };
        self.order_book(&quote.pair_name)?;

        let Self { books, store, clock, .. } = self;
        let book = books.get_mut(&quote.pair_name).unwrap();
        book.cancel_order(store, clock.as_ref(), quote.side, order_id, quote.price)?;
        Ok(())
    }

    /// Fetch an order record by pair and id.
    pub fn get_order(&mut self, pair: &str, order_id: u64) -> Result<Option<Order>, BookError> {
        self.order_book(pair)?;
        let Self { books, store, .. } = self;
        let book = books.get_mut(&pair.to_lowercase()).unwrap();
        Ok(book.order(store, order_id)?)
    }

    /// Resting volume at a price on one side of a pair's book.
    pub fn volume_at_price(
        &mut self,
        pair: &str,
        side: Side,
        price: Price,
    ) -> Result<Quantity, BookError> {
        self.order_book(pair)?;
        let Self { books, store, .. } = self;
        let book = books.get_mut(&pair.to_lowercase()).unwrap();
        Ok(book.volume_at_price(store, side, price)?)
    }

    /// Flush the shared store for every book.
    pub fn commit(&mut self) -> Result<(), BookError> {
        self.store.commit()?;
        Ok(())
    }

    /// Release the backing database. Pending writes since the last commit
    /// are dropped.
    pub fn close(mut self) -> Result<(), BookError> {
        self.store.close()?;
        Ok(())
    }

    pub fn store_mut(&mut self) -> &mut BatchStore<C> {
        &mut self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use types::quote::OrderKind;

    fn pairs() -> HashMap<String, u64> {
        HashMap::from([("TOMO/WETH".to_string(), 100_000)])
    }

    fn input(side: Side, quantity: &str, price: &str, order_id: u64) -> QuoteInput {
        QuoteInput {
            pair_name: "TOMO/WETH".into(),
            kind: OrderKind::Limit,
            side,
            quantity: quantity.into(),
            price: Some(price.into()),
            order_id,
            timestamp: Some(123452342343),
            trade_id: None,
        }
    }

    #[test]
    fn test_engine_routes_and_matches() {
        let mut engine = Engine::in_memory(pairs());
        let (trades, resting) = engine.process_order(input(Side::Ask, "5", "101", 0)).unwrap();
        assert!(trades.is_empty());
        assert!(resting.is_some());

        let (trades, resting) = engine.process_order(input(Side::Bid, "2", "102", 0)).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, Price::from_u64(101));
        assert_eq!(trades[0].quantity, Quantity::from_u64(2));
        assert!(resting.is_none());
    }

    #[test]
    fn test_unknown_pair_process_is_empty_result() {
        let mut engine = Engine::in_memory(pairs());
        let mut quote = input(Side::Ask, "5", "101", 0);
        quote.pair_name = "BTC/USDT".into();
        let (trades, resting) = engine.process_order(quote).unwrap();
        assert!(trades.is_empty());
        assert!(resting.is_none());
        assert!(!engine.has_order_book("BTC/USDT"));
    }

    #[test]
    fn test_unknown_pair_cancel_is_error() {
        let mut engine = Engine::in_memory(pairs());
        let mut quote = input(Side::Ask, "5", "101", 1);
        quote.pair_name = "BTC/USDT".into();
        let err = engine.cancel_order(quote).unwrap_err();
        assert!(matches!(err, BookError::UnknownPair(_)));
    }

    #[test]
    fn test_pair_names_are_case_insensitive() {
        let mut engine = Engine::in_memory(pairs());
        engine.process_order(input(Side::Ask, "5", "101", 0)).unwrap();
        let mut quote = input(Side::Bid, "5", "101", 0);
        quote.pair_name = "tomo/weth".into();
        let (trades, _) = engine.process_order(quote).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(engine.books.len(), 1);
    }

    #[test]
    fn test_invalid_price_is_invalid_input() {
        let mut engine = Engine::in_memory(pairs());
        let err = engine
            .process_order(input(Side::Ask, "5", "10x1", 0))
            .unwrap_err();
        assert!(matches!(err, BookError::InvalidInput(_)));
    }

    #[test]
    fn test_update_path_changes_resting_order() {
        let mut engine = Engine::in_memory(pairs());
        let (_, resting) = engine.process_order(input(Side::Ask, "5", "101", 0)).unwrap();
        let id = resting.unwrap().order_id.unwrap();

        let (trades, resting) = engine
            .process_order(input(Side::Ask, "9", "101", id))
            .unwrap();
        assert!(trades.is_empty());
        assert!(resting.is_none());
        assert_eq!(
            engine
                .volume_at_price("TOMO/WETH", Side::Ask, Price::from_u64(101))
                .unwrap(),
            Quantity::from_u64(9)
        );
    }

    #[test]
    fn test_cancel_then_get_order() {
        let mut engine = Engine::in_memory(pairs());
        let (_, resting) = engine.process_order(input(Side::Ask, "5", "101", 0)).unwrap();
        let id = resting.unwrap().order_id.unwrap();
        assert!(engine.get_order("TOMO/WETH", id).unwrap().is_some());

        engine.cancel_order(input(Side::Ask, "5", "101", id)).unwrap();
        assert!(engine.get_order("TOMO/WETH", id).unwrap().is_none());
        assert_eq!(
            engine
                .volume_at_price("TOMO/WETH", Side::Ask, Price::from_u64(101))
                .unwrap(),
            Quantity::ZERO
        );
    }

    #[test]
    fn test_commit_and_reopen_restores_books() {
        let tmp = TempDir::new().unwrap();
        {
            let mut engine = Engine::open(tmp.path(), pairs()).unwrap();
            engine.process_order(input(Side::Ask, "5", "101", 0)).unwrap();
            engine.process_order(input(Side::Ask, "5", "103", 0)).unwrap();
            engine.process_order(input(Side::Bid, "5", "99", 0)).unwrap();
            engine.commit().unwrap();
            engine.close().unwrap();
        }

        let mut engine = Engine::open(tmp.path(), pairs()).unwrap();
        assert_eq!(
            engine
                .volume_at_price("TOMO/WETH", Side::Ask, Price::from_u64(101))
                .unwrap(),
            Quantity::from_u64(5)
        );

        // matching continues against restored state with fresh ids
        let (trades, resting) = engine.process_order(input(Side::Bid, "7", "101", 0)).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, Quantity::from_u64(5));
        assert_eq!(resting.as_ref().unwrap().order_id.unwrap(), 4);
        assert_eq!(resting.unwrap().quantity, Quantity::from_u64(2));
    }

    #[test]
    fn test_multiple_books_share_one_store() {
        let allowed = HashMap::from([
            ("TOMO/WETH".to_string(), 100_000),
            ("BTC/USDT".to_string(), 1_000_000),
        ]);
        let mut engine = Engine::in_memory(allowed);
        engine.process_order(input(Side::Ask, "5", "101", 0)).unwrap();
        let mut other = input(Side::Ask, "7", "101", 0);
        other.pair_name = "BTC/USDT".into();
        engine.process_order(other).unwrap();

        assert_eq!(
            engine
                .volume_at_price("TOMO/WETH", Side::Ask, Price::from_u64(101))
                .unwrap(),
            Quantity::from_u64(5)
        );
        assert_eq!(
            engine
                .volume_at_price("BTC/USDT", Side::Ask, Price::from_u64(101))
                .unwrap(),
            Quantity::from_u64(7)
        );
    }
}
