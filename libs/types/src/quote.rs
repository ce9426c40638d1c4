//! Inbound order submissions
//!
//! The wire shape ([`QuoteInput`]) carries decimal strings and a zero
//! sentinel for "no order id"; [`Quote`] is the parsed, strongly typed form
//! the engine and books operate on.

use crate::errors::BookError;
use crate::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// Book side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

/// Matching strategy requested by a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Market,
    Limit,
}

impl Default for OrderKind {
    fn default() -> Self {
        OrderKind::Limit
    }
}

/// Raw quote as submitted by an external caller.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteInput {
    pub pair_name: String,
    #[serde(rename = "type", default)]
    pub kind: OrderKind,
    pub side: Side,
    pub quantity: String,
    /// Decimal price string; ignored for market orders.
    #[serde(default)]
    pub price: Option<String>,
    /// Zero means "new order"; nonzero routes to the update path.
    #[serde(default)]
    pub order_id: u64,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub trade_id: Option<u64>,
}

/// Parsed quote with the pair name lowercased and amounts decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub pair_name: String,
    pub kind: OrderKind,
    pub side: Side,
    pub quantity: Quantity,
    pub price: Price,
    pub order_id: Option<u64>,
    pub timestamp: Option<u64>,
    pub trade_id: Option<u64>,
}

impl Quote {
    pub fn parse(input: QuoteInput) -> Result<Quote, BookError> {
        let quantity = Quantity::from_dec_str(&input.quantity)
            .map_err(|_| BookError::InvalidInput(format!("quantity is not correct: {}", input.quantity)))?;
        let price = match (input.kind, input.price.as_deref()) {
            (OrderKind::Market, _) => Price::ZERO,
            (OrderKind::Limit, Some(text)) => Price::from_dec_str(text)
                .map_err(|_| BookError::InvalidInput(format!("price is not correct: {text}")))?,
            (OrderKind::Limit, None) => {
                return Err(BookError::InvalidInput("limit order requires a price".into()))
            }
        };
        Ok(Quote {
            pair_name: input.pair_name.to_lowercase(),
            kind: input.kind,
            side: input.side,
            quantity,
            price,
            order_id: (input.order_id != 0).then_some(input.order_id),
            timestamp: input.timestamp,
            trade_id: input.trade_id,
        })
    }
}
