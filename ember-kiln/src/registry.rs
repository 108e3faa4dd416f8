//! The code/contract metadata registry system contract.
//!
//! All CodeInfo/ContractInfo reads and writes route through this contract's
//! JSON message protocol rather than raw key-value access, so the metadata
//! schema can evolve independently of the ledger layout and enumeration for
//! snapshotting goes through one audited path. The contract is native
//! (host-implemented) but addressed and dispatched like any other system
//! contract.

use borsh::BorshDeserialize;
use serde::{Deserialize, Serialize};

use ember_storage::KvStore;
use ember_types::contract::{CodeInfo, ContractInfo};
use ember_types::primitives::{Address, CodeId};

use crate::error::KilnError;

const CODE_KEY_PREFIX: u8 = 0x01;
const CONTRACT_KEY_PREFIX: u8 = 0x02;
const LAST_CODE_ID_KEY: &[u8] = &[0x03];

#[derive(Debug, Serialize, Deserialize)]
pub enum RegistryExecuteMsg {
    NewCodeInfo { code_info: CodeInfo },
    SetCodeInfo { code_id: CodeId, code_info: CodeInfo },
    SetContractInfo { address: Address, contract_info: ContractInfo },
}

#[derive(Debug, Serialize, Deserialize)]
pub enum RegistryQueryMsg {
    GetLastCodeId {},
    GetCodeInfo { code_id: CodeId },
    GetContractInfo { address: Address },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LastCodeIdResponse {
    pub code_id: CodeId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CodeInfoResponse {
    pub code_info: Option<CodeInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContractInfoResponse {
    pub contract_info: Option<ContractInfo>,
}

fn code_key(code_id: CodeId) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(CODE_KEY_PREFIX);
    key.extend_from_slice(&code_id.to_be_bytes());
    key
}

fn check_fill_once(existing: &[u8], new: &[u8], what: &str) -> Result<(), KilnError> {
    if !existing.is_empty() && !new.is_empty() && existing != new {
        return Err(KilnError::Invalid(format!("conflicting {what}")));
    }
    Ok(())
}

fn contract_key(addr: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(CONTRACT_KEY_PREFIX);
    key.extend_from_slice(addr);
    key
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, KilnError> {
    serde_json::to_vec(value).map_err(|e| KilnError::Serialization(e.to_string()))
}

fn from_json<'a, T: Deserialize<'a>>(raw: &'a [u8]) -> Result<T, KilnError> {
    serde_json::from_slice(raw).map_err(|e| KilnError::Serialization(e.to_string()))
}

fn to_borsh<T: borsh::BorshSerialize>(value: &T) -> Result<Vec<u8>, KilnError> {
    borsh::to_vec(value).map_err(|e| KilnError::Serialization(e.to_string()))
}

/// The native registry contract. Stateless; all state lives in the prefixed
/// store handed in per call.
pub struct CodeRegistry;

impl CodeRegistry {
    pub fn execute(store: &dyn KvStore, msg: &[u8]) -> Result<Vec<u8>, KilnError> {
        match from_json::<RegistryExecuteMsg>(msg)? {
            RegistryExecuteMsg::NewCodeInfo { code_info } => {
                let code_id = Self::last_code_id(store)? + 1;
                store.put(&code_key(code_id), &to_borsh(&code_info)?)?;
                store.put(LAST_CODE_ID_KEY, &code_id.to_be_bytes())?;
                to_json(&LastCodeIdResponse { code_id })
            }
            RegistryExecuteMsg::SetCodeInfo { code_id, code_info } => {
                let Some(raw) = store.get(&code_key(code_id))? else {
                    return Err(KilnError::NotFound(format!("code {code_id}")));
                };
                let existing = CodeInfo::try_from_slice(&raw)
                    .map_err(|e| KilnError::Serialization(e.to_string()))?;
                // Interpreted-bytecode fields are fill-in-once: overwriting
                // them with conflicting values is a hard error.
                check_fill_once(
                    &existing.interpreted_bytecode_deployment,
                    &code_info.interpreted_bytecode_deployment,
                    "interpreted deployment bytecode",
                )?;
                check_fill_once(
                    &existing.interpreted_bytecode_runtime,
                    &code_info.interpreted_bytecode_runtime,
                    "interpreted runtime bytecode",
                )?;
                store.put(&code_key(code_id), &to_borsh(&code_info)?)?;
                Ok(Vec::new())
            }
            RegistryExecuteMsg::SetContractInfo {
                address,
                contract_info,
            } => {
                let key = contract_key(&address);
                if store.exists(&key)? {
                    return Err(KilnError::Duplicate(
                        "instance with this contract address already exists".to_string(),
                    ));
                }
                store.put(&key, &to_borsh(&contract_info)?)?;
                Ok(Vec::new())
            }
        }
    }

    pub fn query(store: &dyn KvStore, msg: &[u8]) -> Result<Vec<u8>, KilnError> {
        match from_json::<RegistryQueryMsg>(msg)? {
            RegistryQueryMsg::GetLastCodeId {} => to_json(&LastCodeIdResponse {
                code_id: Self::last_code_id(store)?,
            }),
            RegistryQueryMsg::GetCodeInfo { code_id } => {
                let code_info = store
                    .get(&code_key(code_id))?
                    .map(|raw| {
                        CodeInfo::try_from_slice(&raw)
                            .map_err(|e| KilnError::Serialization(e.to_string()))
                    })
                    .transpose()?;
                to_json(&CodeInfoResponse { code_info })
            }
            RegistryQueryMsg::GetContractInfo { address } => {
                let contract_info = store
                    .get(&contract_key(&address))?
                    .map(|raw| {
                        ContractInfo::try_from_slice(&raw)
                            .map_err(|e| KilnError::Serialization(e.to_string()))
                    })
                    .transpose()?;
                to_json(&ContractInfoResponse { contract_info })
            }
        }
    }

    fn last_code_id(store: &dyn KvStore) -> Result<CodeId, KilnError> {
        let Some(raw) = store.get(LAST_CODE_ID_KEY)? else {
            return Ok(0);
        };
        let bytes: [u8; 8] = raw
            .try_into()
            .map_err(|_| KilnError::Serialization("malformed code id record".to_string()))?;
        Ok(CodeId::from_be_bytes(bytes))
    }

    /// Walk all stored CodeInfo records in code-id order. The callback
    /// returns true to stop early.
    pub fn iterate_code_infos(
        store: &dyn KvStore,
        mut cb: impl FnMut(CodeId, CodeInfo) -> bool,
    ) -> Result<(), KilnError> {
        for (key, raw) in store.prefix_scan(&[CODE_KEY_PREFIX])? {
            let id_bytes: [u8; 8] = key[1..]
                .try_into()
                .map_err(|_| KilnError::Serialization("malformed code key".to_string()))?;
            let info = CodeInfo::try_from_slice(&raw)
                .map_err(|e| KilnError::Serialization(e.to_string()))?;
            if cb(CodeId::from_be_bytes(id_bytes), info) {
                break;
            }
        }
        Ok(())
    }

    /// Walk all stored ContractInfo records in address order.
    pub fn iterate_contract_infos(
        store: &dyn KvStore,
        mut cb: impl FnMut(Address, ContractInfo) -> bool,
    ) -> Result<(), KilnError> {
        for (key, raw) in store.prefix_scan(&[CONTRACT_KEY_PREFIX])? {
            let addr: Address = key[1..]
                .try_into()
                .map_err(|_| KilnError::Serialization("malformed contract key".to_string()))?;
            let info = ContractInfo::try_from_slice(&raw)
                .map_err(|e| KilnError::Serialization(e.to_string()))?;
            if cb(addr, info) {
                break;
            }
        }
        Ok(())
    }
}
