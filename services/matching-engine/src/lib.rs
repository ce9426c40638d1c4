//! Persistent order-book matching engine
//!
//! Price-time-priority matching over disk-backed books. Every book, side,
//! price level and order is a record in one shared write-back store, keyed
//! inside hash-derived namespaces; price ordering comes from a persistent
//! red-black tree per side.
//!
//! **Key invariants:**
//! - Price-time priority strictly enforced; partial fills keep the maker's
//!   queue position
//! - No trade crosses the taker's limit price
//! - Order ids per book are strictly monotonic
//! - Side totals equal the sum of their price levels at all times

pub mod book;
pub mod engine;

pub use book::{Order, OrderBook, OrderList, OrderTree};
pub use engine::Engine;
