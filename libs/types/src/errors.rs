//! Error taxonomy for the store and the engine
//!
//! Absence on a plain store read is a value-level signal (`Option`), not an
//! error; `StoreError::NotFound` is reserved for reads where the caller
//! requires presence. Corrupted structure (a missing tree node mid-fixup, a
//! dangling list head) is fatal and panics rather than erroring: the
//! process must not keep mutating a corrupted tree.

use crate::keys::Key;
use crate::numeric::AmountParseError;
use thiserror::Error;

/// Errors surfaced by the write-back store and its backends.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(Key),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors surfaced to callers of the engine.
#[derive(Error, Debug)]
pub enum BookError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("orderbook not found for pair: {0}")]
    UnknownPair(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<AmountParseError> for BookError {
    fn from(err: AmountParseError) -> Self {
        BookError::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::Price;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NotFound(Key::from_u64(7));
        assert!(err.to_string().starts_with("key not found: 0x"));
    }

    #[test]
    fn test_book_error_wraps_store_error() {
        let err: BookError = StoreError::Backend("disk full".into()).into();
        assert!(matches!(err, BookError::Store(_)));
        assert_eq!(err.to_string(), "backend error: disk full");
    }

    #[test]
    fn test_parse_error_becomes_invalid_input() {
        let err: BookError = Price::from_dec_str("abc").unwrap_err().into();
        assert!(matches!(err, BookError::InvalidInput(_)));
    }
}
