//! Underlying key-value backends
//!
//! The write-back store talks to disk through the [`KvBackend`] trait. The
//! default persistent backend is sled; [`MemoryBackend`] backs tests and
//! throwaway books.

use std::collections::HashMap;
use std::path::Path;
use types::errors::StoreError;
use types::keys::Key;

/// Flat key-value storage shared by every logical tree and book.
pub trait KvBackend: Send {
    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&mut self, key: &Key, value: &[u8]) -> Result<(), StoreError>;
    fn delete(&mut self, key: &Key) -> Result<(), StoreError>;
    fn has(&self, key: &Key) -> Result<bool, StoreError>;
    /// Write all pairs as a single atomic batch.
    fn write_batch(&mut self, pairs: &[(Key, Vec<u8>)]) -> Result<(), StoreError>;
    fn close(&mut self) -> Result<(), StoreError>;
}

/// sled-backed persistent storage.
pub struct SledBackend {
    db: sled::Db,
}

impl SledBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(backend_err)?;
        Ok(SledBackend { db })
    }
}

fn backend_err(err: sled::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl KvBackend for SledBackend {
    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self.db.get(key.as_bytes()).map_err(backend_err)?;
        Ok(value.map(|ivec| ivec.to_vec()))
    }

    fn put(&mut self, key: &Key, value: &[u8]) -> Result<(), StoreError> {
        self.db.insert(key.as_bytes(), value).map_err(backend_err)?;
        Ok(())
    }

    fn delete(&mut self, key: &Key) -> Result<(), StoreError> {
        self.db.remove(key.as_bytes()).map_err(backend_err)?;
        Ok(())
    }

    fn has(&self, key: &Key) -> Result<bool, StoreError> {
        self.db.contains_key(key.as_bytes()).map_err(backend_err)
    }

    fn write_batch(&mut self, pairs: &[(Key, Vec<u8>)]) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for (key, value) in pairs {
            batch.insert(key.as_bytes(), value.as_slice());
        }
        self.db.apply_batch(batch).map_err(backend_err)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.db.flush().map_err(backend_err)?;
        Ok(())
    }
}

/// In-memory backend for tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: HashMap<Key, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &Key, value: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(*key, value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &Key) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn has(&self, key: &Key) -> Result<bool, StoreError> {
        Ok(self.entries.contains_key(key))
    }

    fn write_batch(&mut self, pairs: &[(Key, Vec<u8>)]) -> Result<(), StoreError> {
        for (key, value) in pairs {
            self.entries.insert(*key, value.clone());
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(backend: &mut dyn KvBackend) {
        let key = Key::from_u64(1);
        assert!(!backend.has(&key).unwrap());
        backend.put(&key, b"alpha").unwrap();
        assert!(backend.has(&key).unwrap());
        assert_eq!(backend.get(&key).unwrap().unwrap(), b"alpha");

        backend
            .write_batch(&[
                (Key::from_u64(2), b"beta".to_vec()),
                (Key::from_u64(3), b"gamma".to_vec()),
            ])
            .unwrap();
        assert_eq!(backend.get(&Key::from_u64(3)).unwrap().unwrap(), b"gamma");

        backend.delete(&key).unwrap();
        assert!(backend.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_memory_backend() {
        let mut backend = MemoryBackend::new();
        exercise(&mut backend);
    }

    #[test]
    fn test_sled_backend() {
        let tmp = TempDir::new().unwrap();
        let mut backend = SledBackend::open(tmp.path()).unwrap();
        exercise(&mut backend);
    }

    #[test]
    fn test_sled_backend_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let mut backend = SledBackend::open(tmp.path()).unwrap();
            backend.put(&Key::from_u64(9), b"persisted").unwrap();
            backend.close().unwrap();
        }
        let backend = SledBackend::open(tmp.path()).unwrap();
        assert_eq!(backend.get(&Key::from_u64(9)).unwrap().unwrap(), b"persisted");
    }
}
