//! Byte keys and namespace slots
//!
//! Every persisted entity is addressed by a fixed-width byte key: the
//! big-endian form of an unsigned 256-bit integer, zero-padded so that
//! lexicographic byte order equals numeric order. Logical namespaces (an
//! order book, each side of a book) own disjoint key ranges derived from the
//! SHA-256 of the namespace name; every key inside a namespace is
//! `slot + local_id` with wrapping 256-bit arithmetic.

use primitive_types::U256;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Width in bytes of every persisted key.
pub const KEY_WIDTH: usize = 32;

/// Bit shift that places a segment index in the most significant key byte.
pub const SEGMENT_SHIFT: usize = 8 * (KEY_WIDTH - 1);

/// Fixed-width byte key addressing one persisted entity.
///
/// The all-zero key is the "absent" sentinel; see [`Key::EMPTY`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Key([u8; KEY_WIDTH]);

impl Key {
    /// The all-zero key, treated everywhere as "absent".
    pub const EMPTY: Key = Key([0u8; KEY_WIDTH]);

    pub fn from_bytes(bytes: [u8; KEY_WIDTH]) -> Self {
        Key(bytes)
    }

    pub fn from_u256(value: U256) -> Self {
        let mut bytes = [0u8; KEY_WIDTH];
        value.to_big_endian(&mut bytes);
        Key(bytes)
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_u256(U256::from(value))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// True for the all-zero key.
    pub fn is_empty(&self) -> bool {
        *self == Key::EMPTY
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// Keys appear inside persisted records (list links, tree pointers), so they
// serialize as 0x-prefixed hex strings to keep the encoding self-describing.
impl Serialize for Key {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = Key;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a 0x-prefixed {}-byte hex string", KEY_WIDTH)
            }

            fn visit_str<E>(self, value: &str) -> Result<Key, E>
            where
                E: de::Error,
            {
                let hex = value.strip_prefix("0x").unwrap_or(value);
                if hex.len() != KEY_WIDTH * 2 {
                    return Err(E::custom(format!("key must be {} hex chars", KEY_WIDTH * 2)));
                }
                let mut bytes = [0u8; KEY_WIDTH];
                for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
                    let pair = std::str::from_utf8(chunk).map_err(E::custom)?;
                    bytes[i] = u8::from_str_radix(pair, 16).map_err(E::custom)?;
                }
                Ok(Key(bytes))
            }
        }

        deserializer.deserialize_str(KeyVisitor)
    }
}

/// Namespace offset derived from a hashed name.
///
/// A slot is a 256-bit integer; all keys generated inside the namespace are
/// `slot + local_id` (wrapping), which keeps distinct namespaces in disjoint
/// key ranges of the shared store without any prefix scheme.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Slot(U256);

impl Slot {
    /// Derive the slot for a namespace name. Callers are expected to
    /// lowercase pair names first so hex and checksummed spellings of the
    /// same pair land in the same namespace.
    pub fn from_name(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        Slot(U256::from_big_endian(&digest))
    }

    pub fn from_u256(value: U256) -> Self {
        Slot(value)
    }

    /// Sub-namespace `index`, offset in the most significant key byte so two
    /// hashes would need a 31-byte common prefix to collide.
    pub fn segment(&self, index: u8) -> Slot {
        let offset = U256::from(index) << SEGMENT_SHIFT;
        Slot(self.0.overflowing_add(offset).0)
    }

    /// Key for a local 256-bit id inside this namespace.
    pub fn key(&self, local: U256) -> Key {
        Key::from_u256(self.0.overflowing_add(local).0)
    }

    /// Key for a local integer id inside this namespace.
    pub fn key_for_id(&self, id: u64) -> Key {
        self.key(U256::from(id))
    }

    /// Key of the namespace itself (local id 0).
    pub fn base_key(&self) -> Key {
        self.key(U256::zero())
    }

    /// Recover the local id from a key generated by this slot.
    pub fn local(&self, key: Key) -> U256 {
        key.to_u256().overflowing_sub(self.0).0
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }
}
