use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::StorageError;
use crate::traits::{KvPairs, KvStore};

/// A write-overlay on top of a parent store.
///
/// Reads fall through to the parent unless the overlay holds a newer write
/// or a deletion marker. Nothing reaches the parent until `commit`; dropping
/// the store discards the overlay. This is the building block of the
/// cache-context discipline used for sub-call isolation.
pub struct CacheStore {
    parent: Arc<dyn KvStore>,
    overlay: RwLock<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl CacheStore {
    pub fn new(parent: Arc<dyn KvStore>) -> Self {
        Self {
            parent,
            overlay: RwLock::new(BTreeMap::new()),
        }
    }

    /// Flush every overlay entry into the parent store.
    pub fn commit(&self) -> Result<(), StorageError> {
        let mut overlay = self.overlay.write().map_err(|e| StorageError::CommitError {
            reason: e.to_string(),
        })?;
        for (key, entry) in overlay.iter() {
            match entry {
                Some(value) => self.parent.put(key, value)?,
                None => self.parent.delete(key)?,
            }
        }
        overlay.clear();
        Ok(())
    }

    /// Number of pending overlay entries, including deletion markers.
    pub fn pending_writes(&self) -> usize {
        self.overlay.read().map(|o| o.len()).unwrap_or(0)
    }
}

impl KvStore for CacheStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let overlay = self.overlay.read().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        match overlay.get(key) {
            Some(Some(value)) => Ok(Some(value.clone())),
            Some(None) => Ok(None),
            None => self.parent.get(key),
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut overlay = self.overlay.write().map_err(|e| StorageError::WriteError {
            reason: e.to_string(),
        })?;
        overlay.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        let mut overlay = self.overlay.write().map_err(|e| StorageError::WriteError {
            reason: e.to_string(),
        })?;
        overlay.insert(key.to_vec(), None);
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.parent.prefix_scan(prefix)?.into_iter().collect();
        let overlay = self.overlay.read().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        for (key, entry) in overlay
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match entry {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}
