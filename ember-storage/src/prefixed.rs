use std::sync::Arc;

use crate::error::StorageError;
use crate::traits::{KvPairs, KvStore};

/// A view of a parent store with every key namespaced under a fixed prefix.
///
/// Contract storage is always accessed through one of these, keyed by the
/// contract's store prefix, so a contract can never read or write outside its
/// own key space.
#[derive(Clone)]
pub struct PrefixedStore {
    inner: Arc<dyn KvStore>,
    prefix: Vec<u8>,
}

impl PrefixedStore {
    pub fn new(inner: Arc<dyn KvStore>, prefix: Vec<u8>) -> Self {
        Self { inner, prefix }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }
}

impl KvStore for PrefixedStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(&self.full_key(key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.inner.put(&self.full_key(key), value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.inner.delete(&self.full_key(key))
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        self.inner.exists(&self.full_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError> {
        let results = self.inner.prefix_scan(&self.full_key(prefix))?;
        Ok(results
            .into_iter()
            .map(|(k, v)| (k[self.prefix.len()..].to_vec(), v))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn test_prefix_isolation() {
        let base: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let a = PrefixedStore::new(base.clone(), b"a/".to_vec());
        let b = PrefixedStore::new(base.clone(), b"b/".to_vec());

        a.put(b"key", b"from-a").unwrap();
        b.put(b"key", b"from-b").unwrap();

        assert_eq!(a.get(b"key").unwrap(), Some(b"from-a".to_vec()));
        assert_eq!(b.get(b"key").unwrap(), Some(b"from-b".to_vec()));
        assert_eq!(base.get(b"a/key").unwrap(), Some(b"from-a".to_vec()));
    }

    #[test]
    fn test_prefix_scan_strips_prefix() {
        let base: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let store = PrefixedStore::new(base, b"contract/".to_vec());
        store.put(b"k1", b"1").unwrap();
        store.put(b"k2", b"2").unwrap();

        let results = store.prefix_scan(b"k").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, b"k1".to_vec());
    }
}
