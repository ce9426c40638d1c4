//! Trade records produced by matching

use crate::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// One fill against a resting order.
///
/// The price is always the resting order's price (the incoming order is the
/// price taker); the timestamp is the book's clock at processing time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: u64,
    pub price: Price,
    pub quantity: Quantity,
    /// Taker-supplied correlation id, echoed through when present.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trade_id: Option<u64>,
}

impl Trade {
    pub fn new(timestamp: u64, price: Price, quantity: Quantity, trade_id: Option<u64>) -> Self {
        Trade {
            timestamp,
            price,
            quantity,
            trade_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_serialization() {
        let trade = Trade::new(123452342343, Price::from_u64(101), Quantity::from_u64(2), None);
        let json = serde_json::to_string(&trade).unwrap();
        assert_eq!(
            json,
            r#"{"timestamp":123452342343,"price":"101","quantity":"2"}"#
        );
        let back: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(back, trade);
    }

    #[test]
    fn test_trade_id_is_echoed() {
        let trade = Trade::new(1, Price::from_u64(101), Quantity::from_u64(2), Some(9));
        let json = serde_json::to_string(&trade).unwrap();
        assert!(json.contains("\"trade_id\":9"));
    }
}
