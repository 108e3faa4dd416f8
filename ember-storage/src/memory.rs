use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::StorageError;
use crate::traits::{KvPairs, KvStore};

/// In-memory key-value store backed by a BTreeMap.
/// Uses BTreeMap so that prefix_scan can leverage ordered iteration.
pub struct MemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.read().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        Ok(data.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut data = self.data.write().map_err(|e| StorageError::WriteError {
            reason: e.to_string(),
        })?;
        data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        let mut data = self.data.write().map_err(|e| StorageError::WriteError {
            reason: e.to_string(),
        })?;
        data.remove(key);
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        let data = self.data.read().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        Ok(data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError> {
        let data = self.data.read().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        let results: KvPairs = data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_crud() {
        let store = MemoryStore::new();
        let key = b"test_key";
        let value = b"test_value";

        store.put(key, value).unwrap();
        assert_eq!(store.get(key).unwrap(), Some(value.to_vec()));

        assert!(store.exists(key).unwrap());
        assert!(!store.exists(b"nonexistent").unwrap());

        store.delete(key).unwrap();
        assert_eq!(store.get(key).unwrap(), None);
        assert!(!store.exists(key).unwrap());
    }

    #[test]
    fn test_overwrite() {
        let store = MemoryStore::new();
        let key = b"key";
        store.put(key, b"value1").unwrap();
        store.put(key, b"value2").unwrap();
        assert_eq!(store.get(key).unwrap(), Some(b"value2".to_vec()));
    }

    #[test]
    fn test_prefix_scan_ordered() {
        let store = MemoryStore::new();
        store.put(b"code:b", b"2").unwrap();
        store.put(b"code:a", b"1").unwrap();
        store.put(b"code:c", b"3").unwrap();
        store.put(b"other:d", b"4").unwrap();

        let results = store.prefix_scan(b"code:").unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, b"code:a".to_vec());
        assert_eq!(results[1].0, b"code:b".to_vec());
        assert_eq!(results[2].0, b"code:c".to_vec());
    }

    #[test]
    fn test_delete_nonexistent() {
        let store = MemoryStore::new();
        store.delete(b"no_such_key").unwrap();
    }
}
