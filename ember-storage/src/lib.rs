//! Key-value storage abstraction for the Ember contract engine.
//!
//! Provides the `KvStore` trait, an ordered in-memory store, prefixed views
//! for per-contract key spaces, and a write-overlay cache store implementing
//! the snapshot/commit discipline used for sub-call isolation.

pub mod cache;
pub mod error;
pub mod memory;
pub mod prefixed;
pub mod spaces;
pub mod traits;

pub use cache::CacheStore;
pub use error::StorageError;
pub use memory::MemoryStore;
pub use prefixed::PrefixedStore;
pub use spaces::StoreSpaces;
pub use traits::{KvPairs, KvStore};
