use std::sync::Arc;

use crate::cache::CacheStore;
use crate::error::StorageError;
use crate::memory::MemoryStore;
use crate::traits::KvStore;

/// The five physical key spaces a contract's storage may be bound to.
///
/// Which space backs a given contract is fixed at instantiation time via
/// `ContractStorageType` and never changes.
#[derive(Clone)]
pub struct StoreSpaces {
    pub core: Arc<dyn KvStore>,
    pub meta: Arc<dyn KvStore>,
    pub single: Arc<dyn KvStore>,
    pub transient: Arc<dyn KvStore>,
    pub memory: Arc<dyn KvStore>,
}

impl StoreSpaces {
    /// All spaces backed by fresh in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            core: Arc::new(MemoryStore::new()),
            meta: Arc::new(MemoryStore::new()),
            single: Arc::new(MemoryStore::new()),
            transient: Arc::new(MemoryStore::new()),
            memory: Arc::new(MemoryStore::new()),
        }
    }

    /// Wrap every space in a write-overlay cache.
    ///
    /// Returns the overlaid spaces plus the cache handles needed to commit
    /// them; dropping the handles without committing discards all writes.
    pub fn cached(&self) -> (StoreSpaces, SpaceCaches) {
        let core = Arc::new(CacheStore::new(self.core.clone()));
        let meta = Arc::new(CacheStore::new(self.meta.clone()));
        let single = Arc::new(CacheStore::new(self.single.clone()));
        let transient = Arc::new(CacheStore::new(self.transient.clone()));
        let memory = Arc::new(CacheStore::new(self.memory.clone()));
        let spaces = StoreSpaces {
            core: core.clone(),
            meta: meta.clone(),
            single: single.clone(),
            transient: transient.clone(),
            memory: memory.clone(),
        };
        let caches = SpaceCaches {
            caches: vec![core, meta, single, transient, memory],
        };
        (spaces, caches)
    }
}

/// Commit handles for a set of overlaid spaces.
pub struct SpaceCaches {
    caches: Vec<Arc<CacheStore>>,
}

impl SpaceCaches {
    /// Flush every space's overlay into its parent.
    pub fn commit(&self) -> Result<(), StorageError> {
        for cache in &self.caches {
            cache.commit()?;
        }
        Ok(())
    }
}
