use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::capability::{self, Capability, Dialect};
use crate::primitives::{Address, Checksum, CodeId};

/// Free-form descriptive metadata attached to stored code.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct CodeMetadata {
    pub name: String,
    pub categories: Vec<String>,
    pub author: String,
    pub site: String,
    pub abi: String,
}

/// Descriptor for one piece of stored bytecode, keyed by code id.
///
/// Immutable after creation except `pinned` and the interpreted-bytecode
/// fields; the latter are filled in once, after first instantiation, to
/// capture runtime bytecode distinct from deployment bytecode.
#[derive(
    Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct CodeInfo {
    pub code_hash: Checksum,
    pub creator: Address,
    pub deps: Vec<Capability>,
    pub pinned: bool,
    pub metering_off: bool,
    pub metadata: CodeMetadata,
    /// Constructor bytecode for interpreted dialects (empty for native wasm).
    pub interpreted_bytecode_deployment: Vec<u8>,
    /// Runtime bytecode for interpreted dialects, set after instantiation.
    pub interpreted_bytecode_runtime: Vec<u8>,
    pub runtime_hash: Option<Checksum>,
}

impl CodeInfo {
    pub fn new(
        code_hash: Checksum,
        creator: Address,
        deps: Vec<Capability>,
        metadata: CodeMetadata,
        pinned: bool,
        metering_off: bool,
    ) -> Self {
        Self {
            code_hash,
            creator,
            deps,
            pinned,
            metering_off,
            metadata,
            interpreted_bytecode_deployment: Vec::new(),
            interpreted_bytecode_runtime: Vec::new(),
            runtime_hash: None,
        }
    }

    /// The utf8 source dialect declared by this code, if any.
    pub fn utf8_dialect(&self) -> Option<Dialect> {
        capability::utf8_dialect(&self.deps)
    }

    /// Any interpreter dialect declared by this code.
    pub fn interpreter_dialect(&self) -> Option<Dialect> {
        capability::interpreter_dialect(&self.deps)
    }

    /// Whether calls to this code dispatch through the interpreted path.
    pub fn is_interpreted(&self) -> bool {
        !self.interpreted_bytecode_deployment.is_empty()
            || !self.interpreted_bytecode_runtime.is_empty()
            || self.interpreter_dialect().is_some()
    }

    /// Whether any capability requires system-contract privileges.
    pub fn requires_system_address(&self) -> bool {
        self.deps.iter().any(Capability::is_system_interface)
    }
}

/// Which physical key space backs a contract's storage.
///
/// Fixed at instantiation, never changed afterwards.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum ContractStorageType {
    #[default]
    CoreConsensus,
    MetaConsensus,
    SingleConsensus,
    Transient,
    Memory,
}

/// Descriptor for one contract instance, keyed by contract address.
#[derive(
    Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct ContractInfo {
    pub code_id: CodeId,
    pub creator: Address,
    /// Originating deployer in a multi-hop deployment, when distinct from
    /// the immediate creator.
    pub provenance: Option<Address>,
    pub init_message: Vec<u8>,
    pub label: String,
    pub storage_type: ContractStorageType,
    pub ibc_port_id: Option<String>,
}

impl ContractInfo {
    pub fn new(
        code_id: CodeId,
        creator: Address,
        provenance: Option<Address>,
        init_message: Vec<u8>,
        label: String,
    ) -> Self {
        Self {
            code_id,
            creator,
            provenance,
            init_message,
            label,
            storage_type: ContractStorageType::CoreConsensus,
            ibc_port_id: None,
        }
    }
}
