//! Persistence layer for the order book
//!
//! A two-tier write-back store over a pluggable key-value backend, plus the
//! persistent red-black tree that gives ordered access to keys inside a
//! namespace. All higher-level state (books, sides, price levels, orders)
//! flows through [`BatchStore`] as typed puts and is flushed in atomic
//! batches by `commit`.

pub mod backend;
pub mod codec;
pub mod store;
pub mod tree;

pub use backend::{KvBackend, MemoryBackend, SledBackend};
pub use codec::{Codec, JsonCodec};
pub use store::{BatchStore, StoreConfig, DEFAULT_CACHE_LIMIT, DEFAULT_MAX_PENDING};
pub use tree::{bytes_compare, Color, Node, NodeItem, Tree};
