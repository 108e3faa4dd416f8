//! The Ember contract engine: lifecycle keeper, metered execution engine,
//! content-addressed code store, metadata registry and capability resolver.
//!
//! A `Kiln` coordinates untrusted bytecode execution across interchangeable
//! WebAssembly backends, bridging the ledger's gas unit and the VM's
//! internal unit at every boundary crossing.

pub mod accounts;
pub mod bank;
pub mod compress;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod gas;
pub mod host;
pub mod keeper;
pub mod registry;
pub mod resolver;
pub mod roles;
pub mod snapshot;
pub mod store;
pub mod submsg;

pub use context::{ChildContext, EventManager, TxContext};
pub use error::KilnError;
pub use gas::{GasConfig, GasRegister, LedgerGasMeter};
pub use host::HostCtx;
pub use keeper::{Bootstrap, Kiln, KilnConfig};
pub use store::CodeStore;
