use serde::{Deserialize, Serialize};

use crate::contract::ContractStorageType;
use crate::primitives::{Address, Amount, Checksum, CodeId, Gas, Timestamp};

/// The state of the chain environment a contract runs in.
///
/// Constructed fresh per entry-point invocation and owned by it; json-encoded
/// when handed to interpreted dialects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Env {
    pub chain: ChainInfo,
    pub block: BlockInfo,
    pub transaction: Option<TransactionInfo>,
    pub contract: EnvContractInfo,
    #[serde(rename = "currentCall")]
    pub current_call: MessageInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub denom: String,
    #[serde(rename = "chainId")]
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    /// Nanoseconds since the unix epoch.
    pub timestamp: Timestamp,
    #[serde(rename = "gasLimit")]
    pub gas_limit: Gas,
    pub hash: Vec<u8>,
    pub proposer: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    /// Position of this transaction in the block, starting at 0.
    pub index: u32,
    #[serde(rename = "gasPrice")]
    pub gas_price: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvContractInfo {
    pub address: Address,
    #[serde(rename = "codeHash")]
    pub code_hash: Checksum,
    #[serde(rename = "codeId")]
    pub code_id: CodeId,
    /// Raw capability tags, as declared at create time.
    pub deps: Vec<String>,
    /// For interpreted dialects: the bytecode the interpreter must run.
    /// Deployment bytecode during instantiate, runtime bytecode afterwards.
    pub bytecode: Vec<u8>,
}

/// Call-scoped message details.
///
/// `origin` and `sender` differ only for delegated execution on behalf of an
/// aliased account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub origin: Address,
    pub sender: Address,
    pub funds: Amount,
    #[serde(rename = "isQuery")]
    pub is_query: bool,
    #[serde(rename = "readOnly")]
    pub read_only: bool,
}

impl MessageInfo {
    pub fn new(origin: Address, sender: Address, funds: Amount) -> Self {
        Self {
            origin,
            sender,
            funds,
            is_query: false,
            read_only: false,
        }
    }
}

/// Resolved view of one contract dependency; recomputed per call, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDependency {
    pub address: Address,
    pub role: Option<String>,
    pub label: String,
    pub code_id: CodeId,
    pub code_hash: Checksum,
    pub store_prefix: Vec<u8>,
    pub storage_type: ContractStorageType,
    /// Path of the raw bytecode or source artifact; empty for bytecode held
    /// inside CodeInfo.
    pub code_file_path: String,
    /// Path of the ahead-of-time artifact when the code is pinned.
    pub aot_file_path: String,
    pub pinned: bool,
    pub metering_off: bool,
    /// The dependency's own resolved dependencies.
    pub system_deps: Vec<SystemDep>,
}

/// A host-interface or role-level dependency resolved from a capability tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemDep {
    pub role: String,
    pub label: String,
    pub code_file_path: String,
    pub aot_file_path: String,
    pub pinned: bool,
    pub deps: Vec<SystemDep>,
}
