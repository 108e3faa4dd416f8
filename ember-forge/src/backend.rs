//! The sealed runtime-backend abstraction.
//!
//! Exactly two implementers exist, selected at process construction time:
//! the wasmtime compiler backend and the wasmi interpreter backend. Both are
//! drop-in substitutable for the same module.

use std::path::Path;

use crate::error::ForgeError;
use crate::host::{HostModule, HostState};
use crate::memory::SliceMemory;
use crate::value::WasmVal;

/// Where a module's code comes from.
#[derive(Debug, Clone, Copy)]
pub enum ModuleCode<'a> {
    /// Raw WebAssembly bytes.
    Raw(&'a [u8]),
    /// A pinned ahead-of-time artifact produced by `RuntimeBackend::precompile`.
    Precompiled(&'a Path),
}

/// Per-instance execution limits.
#[derive(Debug, Clone, Copy)]
pub struct InstanceOptions {
    /// Engine fuel granted to the instance. Fuel bounds runaway execution;
    /// deterministic gas accounting happens at the host-function boundary.
    pub fuel: u64,
    /// Linear memory cap in bytes.
    pub memory_limit: usize,
}

/// Default linear memory cap: 16 MB.
pub const DEFAULT_MEMORY_LIMIT: usize = 16 * 1024 * 1024;

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            fuel: u64::MAX,
            memory_limit: DEFAULT_MEMORY_LIMIT,
        }
    }
}

/// A WebAssembly execution backend.
pub trait RuntimeBackend<T: HostState>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compile-time validation of raw bytecode, without instantiating.
    fn validate(&self, bytecode: &[u8]) -> Result<(), ForgeError>;

    /// Load a module, register the host modules, and instantiate it with the
    /// given host state and limits.
    fn instantiate_module(
        &self,
        code: ModuleCode<'_>,
        host: T,
        modules: &[HostModule<T>],
        opts: InstanceOptions,
    ) -> Result<Box<dyn VmInstance<T>>, ForgeError>;

    /// Produce an ahead-of-time artifact for pinning.
    ///
    /// The interpreter backend has no compiled form and reports
    /// `Unsupported`; callers fall back to a raw copy.
    fn precompile(&self, bytecode: &[u8]) -> Result<Vec<u8>, ForgeError>;
}

/// A live, instantiated module.
pub trait VmInstance<T: HostState> {
    /// Call an exported function by name with typed arguments.
    fn call(&mut self, function: &str, args: &[WasmVal]) -> Result<Vec<WasmVal>, ForgeError>;

    /// Whether the module exports the named function.
    fn has_export(&mut self, function: &str) -> bool;

    /// The instance's linear memory.
    fn memory(&mut self) -> Result<SliceMemory<'_>, ForgeError>;

    /// Engine fuel burned so far.
    fn fuel_used(&mut self) -> u64;

    fn host(&mut self) -> &mut T;

    /// Consume the instance and recover the host state.
    fn into_host(self: Box<Self>) -> T;
}
