//! Value encoding for the write-back store
//!
//! Persisted items are plain serde types; the codec decides the byte format.
//! The default is JSON: self-describing and debuggable with standard tools.
//! A compact binary codec can be swapped in without touching any other
//! component.

use serde::de::DeserializeOwned;
use serde::Serialize;
use types::errors::StoreError;

/// Byte format for persisted values.
pub trait Codec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, StoreError>;
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, StoreError>;
}

/// Self-describing textual encoding (the default).
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(value).map_err(|err| StoreError::Codec(err.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, StoreError> {
        serde_json::from_slice(bytes).map_err(|err| StoreError::Codec(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u64,
    }

    #[test]
    fn test_json_round_trip() {
        let codec = JsonCodec;
        let value = Sample {
            name: "tomo/weth".into(),
            count: 3,
        };
        let bytes = codec.encode(&value).unwrap();
        let back: Sample = codec.decode(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_decode_failure_is_codec_error() {
        let codec = JsonCodec;
        let err = codec.decode::<Sample>(b"not json").unwrap_err();
        assert!(matches!(err, StoreError::Codec(_)));
    }
}
