//! Declarative host-function tables.
//!
//! A host module is a static list of function descriptors; both backends
//! register the same table through a thin per-backend shim, so adding a host
//! function never touches backend code.

use crate::error::ForgeError;
use crate::memory::SliceMemory;
use crate::value::{ValKind, WasmVal};

/// State owned by the store and visible to host functions.
///
/// The failure sink carries a typed error out of a trapped host call; the
/// backend surfaces it in place of the opaque trap after the call unwinds.
pub trait HostState: 'static {
    /// Charge VM-unit gas for one host-function invocation.
    fn charge(&mut self, gas: u64) -> Result<(), ForgeError>;
    fn set_failure(&mut self, err: ForgeError);
    fn take_failure(&mut self) -> Option<ForgeError>;
}

/// Callback signature for one host function.
pub type HostFn<T> =
    fn(&mut T, &mut SliceMemory<'_>, &[WasmVal]) -> Result<Vec<WasmVal>, ForgeError>;

/// One entry of a host-function table.
pub struct HostFnDesc<T: HostState> {
    pub name: &'static str,
    pub params: &'static [ValKind],
    pub results: &'static [ValKind],
    /// Flat VM-unit gas charged before the callback runs.
    pub gas: u64,
    pub call: HostFn<T>,
}

impl<T: HostState> Clone for HostFnDesc<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: HostState> Copy for HostFnDesc<T> {}

/// A named importable group of host functions.
pub struct HostModule<T: HostState> {
    /// The import module name contracts link against.
    pub name: &'static str,
    pub functions: Vec<HostFnDesc<T>>,
}
