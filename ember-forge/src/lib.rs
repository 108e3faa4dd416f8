//! Backend-agnostic WebAssembly execution for the Ember contract engine.
//!
//! Two concrete backends sit behind the same sealed `RuntimeBackend` /
//! `VmInstance` traits: a wasmtime/cranelift compiler backend (throughput,
//! ahead-of-time artifacts for pinned code) and a wasmi interpreter backend
//! (zero warm-up for cold contracts). Selecting one over the other must never
//! change observable results.

pub mod backend;
pub mod error;
pub mod host;
pub mod memory;
pub mod value;
pub mod wasmi_backend;
pub mod wasmtime_backend;

pub use backend::{InstanceOptions, ModuleCode, RuntimeBackend, VmInstance};
pub use error::ForgeError;
pub use host::{HostFnDesc, HostModule, HostState};
pub use memory::{Memory, SliceMemory};
pub use value::{ValKind, WasmVal};
pub use wasmi_backend::WasmiBackend;
pub use wasmtime_backend::WasmtimeBackend;
