//! Per-transaction execution context: storage spaces, gas meter, and event
//! manager, with the snapshot/commit discipline for sub-calls.

use std::sync::{Arc, Mutex, MutexGuard};

use ember_storage::spaces::SpaceCaches;
use ember_storage::{KvStore, PrefixedStore, StoreSpaces};
use ember_types::contract::ContractStorageType;
use ember_types::env::{BlockInfo, TransactionInfo};
use ember_types::primitives::{Address, Gas};
use ember_types::response::Event;

use crate::error::KilnError;
use crate::gas::LedgerGasMeter;

/// Maximum nesting of cross-contract calls and sub-message dispatch.
pub const MAX_CALL_DEPTH: u32 = 32;

/// Key-space prefixes inside each storage space.
pub const CONTRACT_STORE_PREFIX: u8 = 0x03;
pub const ACCOUNT_STORE_PREFIX: u8 = 0x04;
pub const BALANCE_STORE_PREFIX: u8 = 0x05;

/// Collects events emitted during one context's lifetime, in order.
#[derive(Debug, Default)]
pub struct EventManager {
    events: Vec<Event>,
}

impl EventManager {
    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn emit_many(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.extend(events);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn take(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

/// Recover a mutex guard even if a writer panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The per-call execution context.
///
/// Cheap to clone; clones share the same meter, event manager and spaces.
/// Isolation comes from `child`, which overlays every space with a cache
/// store that commits upward only on success.
#[derive(Clone)]
pub struct TxContext {
    pub block: BlockInfo,
    pub tx: Option<TransactionInfo>,
    pub spaces: StoreSpaces,
    gas: Arc<Mutex<LedgerGasMeter>>,
    events: Arc<Mutex<EventManager>>,
    depth: u32,
}

impl TxContext {
    pub fn new(
        spaces: StoreSpaces,
        block: BlockInfo,
        tx: Option<TransactionInfo>,
        gas_limit: Gas,
    ) -> Self {
        Self {
            block,
            tx,
            spaces,
            gas: Arc::new(Mutex::new(LedgerGasMeter::new(gas_limit))),
            events: Arc::new(Mutex::new(EventManager::default())),
            depth: 0,
        }
    }

    /// Nesting level of this context: 0 at the transaction boundary, +1 per
    /// sub-call sandbox.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn consume_gas(&self, amount: Gas, descriptor: &str) -> Result<(), KilnError> {
        lock(&self.gas).consume(amount, descriptor)
    }

    pub fn gas_consumed(&self) -> Gas {
        lock(&self.gas).consumed()
    }

    pub fn gas_limit(&self) -> Gas {
        lock(&self.gas).limit()
    }

    pub fn gas_remaining(&self) -> Gas {
        lock(&self.gas).remaining()
    }

    pub fn is_out_of_gas(&self) -> bool {
        lock(&self.gas).is_out_of_gas()
    }

    pub fn emit_event(&self, event: Event) {
        lock(&self.events).emit(event);
    }

    pub fn emit_events(&self, events: impl IntoIterator<Item = Event>) {
        lock(&self.events).emit_many(events);
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.events).events().to_vec()
    }

    /// A child context sharing this context's gas meter, with overlaid
    /// storage and its own event manager.
    pub fn child(&self) -> ChildContext {
        let (spaces, caches) = self.spaces.cached();
        ChildContext {
            ctx: TxContext {
                block: self.block.clone(),
                tx: self.tx.clone(),
                spaces,
                gas: self.gas.clone(),
                events: Arc::new(Mutex::new(EventManager::default())),
                depth: self.depth + 1,
            },
            caches,
        }
    }

    /// A child context with its own gas meter capped at `gas_limit`, used to
    /// bound the blast radius of one sub-call. The caller must charge the
    /// parent for whatever the child consumed.
    pub fn child_with_gas(&self, gas_limit: Gas) -> ChildContext {
        let mut child = self.child();
        child.ctx.gas = Arc::new(Mutex::new(LedgerGasMeter::new(gas_limit)));
        child
    }

    /// The store backing a contract's storage type, with the contract's
    /// key-space prefix applied.
    pub fn contract_store(
        &self,
        storage_type: ContractStorageType,
        prefix: Vec<u8>,
    ) -> PrefixedStore {
        let space: Arc<dyn KvStore> = match storage_type {
            ContractStorageType::CoreConsensus => self.spaces.core.clone(),
            ContractStorageType::MetaConsensus => self.spaces.meta.clone(),
            ContractStorageType::SingleConsensus => self.spaces.single.clone(),
            ContractStorageType::Transient => self.spaces.transient.clone(),
            ContractStorageType::Memory => self.spaces.memory.clone(),
        };
        PrefixedStore::new(space, prefix)
    }
}

/// Storage prefix for a contract's own key space.
pub fn contract_store_prefix(addr: &Address) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(21);
    prefix.push(CONTRACT_STORE_PREFIX);
    prefix.extend_from_slice(addr);
    prefix
}

/// A snapshot context produced by `TxContext::child`.
///
/// Commit merges writes upward and re-emits the child's events after the
/// parent's; dropping without commit discards both.
pub struct ChildContext {
    pub ctx: TxContext,
    caches: SpaceCaches,
}

impl ChildContext {
    pub fn commit(self, parent: &TxContext) -> Result<(), KilnError> {
        self.caches.commit()?;
        parent.emit_events(self.ctx.events());
        Ok(())
    }

    /// Commit variant for read-only sub-calls: events survive, writes never
    /// merge upward.
    pub fn commit_events_only(self, parent: &TxContext) {
        parent.emit_events(self.ctx.events());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ctx(gas_limit: Gas) -> TxContext {
        TxContext::new(
            StoreSpaces::in_memory(),
            BlockInfo {
                height: 1,
                timestamp: 1_700_000_000_000_000_000,
                gas_limit: 30_000_000,
                hash: vec![],
                proposer: [0u8; 20],
            },
            None,
            gas_limit,
        )
    }

    #[test]
    fn test_child_commit_merges_writes_and_events() {
        let parent = test_ctx(0);
        parent.emit_event(Event::new("before"));

        let child = parent.child();
        child.ctx.spaces.core.put(b"k", b"v").unwrap();
        child.ctx.emit_event(Event::new("inner"));
        child.commit(&parent).unwrap();

        parent.emit_event(Event::new("after"));

        assert_eq!(parent.spaces.core.get(b"k").unwrap(), Some(b"v".to_vec()));
        let types: Vec<String> = parent.events().iter().map(|e| e.ty.clone()).collect();
        assert_eq!(types, vec!["before", "inner", "after"]);
    }

    #[test]
    fn test_child_discard() {
        let parent = test_ctx(0);
        {
            let child = parent.child();
            child.ctx.spaces.core.put(b"k", b"v").unwrap();
            child.ctx.emit_event(Event::new("inner"));
        }
        assert_eq!(parent.spaces.core.get(b"k").unwrap(), None);
        assert!(parent.events().is_empty());
    }

    #[test]
    fn test_child_shares_parent_meter() {
        let parent = test_ctx(1000);
        let child = parent.child();
        child.ctx.consume_gas(400, "test").unwrap();
        assert_eq!(parent.gas_consumed(), 400);
    }

    #[test]
    fn test_child_with_own_meter() {
        let parent = test_ctx(1000);
        let child = parent.child_with_gas(100);
        assert!(child.ctx.consume_gas(101, "over").is_err());
        // Parent is only charged what the caller forwards explicitly.
        assert_eq!(parent.gas_consumed(), 0);
    }

    #[test]
    fn test_read_only_commit_keeps_events_drops_writes() {
        let parent = test_ctx(0);
        let child = parent.child();
        child.ctx.spaces.core.put(b"k", b"v").unwrap();
        child.ctx.emit_event(Event::new("seen"));
        child.commit_events_only(&parent);

        assert_eq!(parent.spaces.core.get(b"k").unwrap(), None);
        assert_eq!(parent.events().len(), 1);
    }

    #[test]
    fn test_contract_store_prefix_isolates_spaces() {
        let ctx = test_ctx(0);
        let a = ctx.contract_store(ContractStorageType::CoreConsensus, vec![1]);
        let b = ctx.contract_store(ContractStorageType::Transient, vec![1]);
        a.put(b"k", b"core").unwrap();
        b.put(b"k", b"transient").unwrap();
        assert_eq!(a.get(b"k").unwrap(), Some(b"core".to_vec()));
        assert_eq!(b.get(b"k").unwrap(), Some(b"transient".to_vec()));
    }
}
