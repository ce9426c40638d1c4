//! Write-back batched store
//!
//! [`BatchStore`] layers two tiers above the backend: a pending buffer of
//! typed values awaiting commit, and a read-through LRU cache of decoded
//! values. Reads hit pending first, then the cache, then decode from the
//! backend; writes land only in the pending buffer until `commit` flushes
//! them as one atomic batch. The cache is never populated by writes.

use crate::backend::{KvBackend, MemoryBackend, SledBackend};
use crate::codec::{Codec, JsonCodec};
use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};
use types::errors::StoreError;
use types::keys::Key;

pub const DEFAULT_CACHE_LIMIT: usize = 1024;
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Capacity bounds for the two in-memory tiers.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// Read-cache entries before recency eviction kicks in.
    pub cache_limit: usize,
    /// Pending writes that trigger an automatic commit.
    pub max_pending: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            cache_limit: DEFAULT_CACHE_LIMIT,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

// Pending entries keep both the live value (for reads) and its encoding
// (for the commit batch); values are owned, so nothing can mutate them
// between put and commit.
struct PendingItem {
    value: Arc<dyn Any + Send + Sync>,
    encoded: Vec<u8>,
}

/// Write-back store over a key-value backend.
pub struct BatchStore<C: Codec = JsonCodec> {
    backend: Box<dyn KvBackend>,
    codec: C,
    max_pending: usize,
    pending: HashMap<Key, PendingItem>,
    cache: LruCache<Key, Arc<dyn Any + Send + Sync>>,
}

impl BatchStore<JsonCodec> {
    /// Store over a sled database at `path`, JSON codec, default limits.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::with_config(
            Box::new(SledBackend::open(path)?),
            JsonCodec,
            StoreConfig::default(),
        ))
    }

    /// In-memory store for tests and throwaway books.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::new()))
    }

    pub fn new(backend: Box<dyn KvBackend>) -> Self {
        Self::with_config(backend, JsonCodec, StoreConfig::default())
    }
}

impl<C: Codec> BatchStore<C> {
    pub fn with_config(backend: Box<dyn KvBackend>, codec: C, config: StoreConfig) -> Self {
        let cache_limit =
            NonZeroUsize::new(config.cache_limit).unwrap_or(NonZeroUsize::new(DEFAULT_CACHE_LIMIT).unwrap());
        BatchStore {
            backend,
            codec,
            max_pending: config.max_pending.max(1),
            pending: HashMap::new(),
            cache: LruCache::new(cache_limit),
        }
    }

    /// True iff the key is the "absent" sentinel.
    pub fn is_empty_key(&self, key: &Key) -> bool {
        key.is_empty()
    }

    /// Encode a value with the store's codec (for callers that nest encoded
    /// payloads inside other records, e.g. tree node values).
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, StoreError> {
        self.codec.encode(value)
    }

    /// Decode bytes with the store's codec.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, StoreError> {
        self.codec.decode(bytes)
    }

    pub fn has(&self, key: &Key) -> Result<bool, StoreError> {
        if key.is_empty() {
            return Ok(false);
        }
        if self.pending.contains_key(key) {
            return Ok(true);
        }
        if self.cache.contains(key) {
            return Ok(true);
        }
        self.backend.has(key)
    }

    /// Read a value: pending buffer first, then cache, then backend. A
    /// backend hit decodes and populates the cache. Absence is `Ok(None)`.
    pub fn get<T>(&mut self, key: &Key) -> Result<Option<T>, StoreError>
    where
        T: Clone + DeserializeOwned + Send + Sync + 'static,
    {
        if key.is_empty() {
            return Ok(None);
        }
        if let Some(item) = self.pending.get(key) {
            let value = item
                .value
                .downcast_ref::<T>()
                .cloned()
                .ok_or_else(|| StoreError::Codec(format!("pending value type mismatch for {key}")))?;
            return Ok(Some(value));
        }
        if let Some(cached) = self.cache.get(key) {
            let value = cached
                .downcast_ref::<T>()
                .cloned()
                .ok_or_else(|| StoreError::Codec(format!("cached value type mismatch for {key}")))?;
            trace!(%key, "read cache hit");
            return Ok(Some(value));
        }
        match self.backend.get(key)? {
            None => Ok(None),
            Some(bytes) => {
                let value: T = self.codec.decode(&bytes)?;
                self.cache.put(*key, Arc::new(value.clone()));
                Ok(Some(value))
            }
        }
    }

    /// Read a value the caller requires to be present.
    pub fn get_existing<T>(&mut self, key: &Key) -> Result<T, StoreError>
    where
        T: Clone + DeserializeOwned + Send + Sync + 'static,
    {
        self.get(key)?.ok_or(StoreError::NotFound(*key))
    }

    /// Stage a write in the pending buffer. Auto-commits when the buffer
    /// reaches `max_pending`. The cache is not touched.
    pub fn put<T>(&mut self, key: Key, value: T) -> Result<(), StoreError>
    where
        T: Serialize + Send + Sync + 'static,
    {
        let encoded = self.codec.encode(&value)?;
        self.pending.insert(
            key,
            PendingItem {
                value: Arc::new(value),
                encoded,
            },
        );
        if self.pending.len() >= self.max_pending {
            return self.commit();
        }
        Ok(())
    }

    /// Remove a key. `force` drops it from every tier unconditionally; a
    /// plain delete only clears the in-memory tiers when the key was still
    /// pending, and always deletes from the backend.
    pub fn delete(&mut self, key: &Key, force: bool) -> Result<(), StoreError> {
        if force {
            self.pending.remove(key);
            self.cache.pop(key);
        } else if self.pending.remove(key).is_some() {
            self.cache.pop(key);
        }
        self.backend.delete(key)
    }

    /// Flush every pending write as one atomic batch. A no-op on an empty
    /// buffer; on backend failure the buffer is preserved for retry. The
    /// read cache stays valid: pending values were never cached, and cached
    /// values were decoded from committed state.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pairs: Vec<(Key, Vec<u8>)> = self
            .pending
            .iter()
            .map(|(key, item)| (*key, item.encoded.clone()))
            .collect();
        self.backend.write_batch(&pairs)?;
        debug!(entries = pairs.len(), "committed pending batch");
        self.pending.clear();
        Ok(())
    }

    /// Release the backend. Pending writes are not flushed; durability is
    /// only promised up to the last `commit`.
    pub fn close(&mut self) -> Result<(), StoreError> {
        self.backend.close()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
