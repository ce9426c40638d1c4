//! Book-side data structures
//!
//! Orders, FIFO price levels, one-sided order trees, and the order book
//! that pairs them with the matching algorithm.

pub mod order;
pub mod order_book;
pub mod order_list;
pub mod order_tree;

pub use order::{Order, OrderItem};
pub use order_book::{OrderBook, OrderBookItem};
pub use order_list::{OrderList, OrderListItem};
pub use order_tree::{OrderTree, OrderTreeItem};
