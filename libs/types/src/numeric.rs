//! Arbitrary-precision price and quantity types
//!
//! Prices and quantities are unsigned 256-bit integers (pairs quote in the
//! smallest unit, e.g. wei-scaled), so byte-key derivation preserves numeric
//! order. Both serialize as decimal strings to keep the textual encoding
//! free of number-precision loss.

use primitive_types::U256;
use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Sub};
use thiserror::Error;

/// Failure to parse a decimal amount string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid decimal string: {0}")]
pub struct AmountParseError(String);

fn parse_u256(value: &str) -> Result<U256, AmountParseError> {
    U256::from_dec_str(value).map_err(|err| AmountParseError(format!("{value} ({err})")))
}

/// Price of one unit, in quote-asset smallest units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price(U256);

impl Price {
    pub const ZERO: Price = Price(U256::zero());

    pub fn new(value: U256) -> Self {
        Price(value)
    }

    /// Parse from a decimal string, the wire form used by quotes.
    pub fn from_dec_str(value: &str) -> Result<Self, AmountParseError> {
        Ok(Price(parse_u256(value)?))
    }

    pub fn from_u64(value: u64) -> Self {
        Price(U256::from(value))
    }

    pub fn to_u256(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Base-asset quantity in smallest units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Quantity(U256);

impl Quantity {
    pub const ZERO: Quantity = Quantity(U256::zero());

    pub fn new(value: U256) -> Self {
        Quantity(value)
    }

    /// Parse from a decimal string, the wire form used by quotes.
    pub fn from_dec_str(value: &str) -> Result<Self, AmountParseError> {
        Ok(Quantity(parse_u256(value)?))
    }

    pub fn from_u64(value: u64) -> Self {
        Quantity(U256::from(value))
    }

    pub fn to_u256(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl Add for Quantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Quantity(self.0 + rhs.0)
    }
}

impl Sub for Quantity {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        assert!(self.0 >= rhs.0, "quantity subtraction would go negative");
        Quantity(self.0 - rhs.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Decimal-string serialization for both types; JSON numbers cannot carry
// 256-bit values.
macro_rules! string_serde {
    ($ty:ident) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.0.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let text = String::deserialize(deserializer)?;
                let value = U256::from_dec_str(&text).map_err(de::Error::custom)?;
                Ok($ty(value))
            }
        }
    };
}

string_serde!(Price);
string_serde!(Quantity);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_parse_and_order() {
        let low = Price::from_dec_str("101").unwrap();
        let high = Price::from_dec_str("103").unwrap();
        assert!(low < high);
        assert_eq!(low, Price::from_u64(101));
    }

    #[test]
    fn test_price_parse_rejects_non_numeric() {
        assert!(Price::from_dec_str("101a").is_err());
        assert!(Price::from_dec_str("").is_err());
    }

    #[test]
    fn test_quantity_arithmetic() {
        let a = Quantity::from_u64(15);
        let b = Quantity::from_u64(5);
        assert_eq!(a + b, Quantity::from_u64(20));
        assert_eq!(a - b, Quantity::from_u64(10));
    }

    #[test]
    #[should_panic(expected = "quantity subtraction would go negative")]
    fn test_quantity_underflow_panics() {
        let _ = Quantity::from_u64(1) - Quantity::from_u64(2);
    }

    #[test]
    fn test_serialization_is_decimal_string() {
        let qty = Quantity::from_dec_str("200000").unwrap();
        let json = serde_json::to_string(&qty).unwrap();
        assert_eq!(json, "\"200000\"");
        let back: Quantity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, qty);
    }

    #[test]
    fn test_large_values_round_trip() {
        let text = "1000000000000000000000000000000";
        let price = Price::from_dec_str(text).unwrap();
        let json = serde_json::to_string(&price).unwrap();
        let back: Price = serde_json::from_str(&json).unwrap();
        assert_eq!(back, price);
        assert_eq!(back.to_string(), text);
    }
}
