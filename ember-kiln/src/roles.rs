//! The role registry system contract: human-readable role labels resolved to
//! contract addresses. Native, like the code registry; seeded at startup and
//! updated through the same dispatch path as any other system contract.

use serde::{Deserialize, Serialize};

use ember_storage::KvStore;
use ember_types::primitives::Address;

use crate::error::KilnError;

const ROLE_KEY_PREFIX: u8 = 0x01;

#[derive(Debug, Serialize, Deserialize)]
pub enum RolesExecuteMsg {
    SetRole { label: String, address: Address },
}

#[derive(Debug, Serialize, Deserialize)]
pub enum RolesQueryMsg {
    GetRoleByLabel { label: String },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoleResponse {
    pub address: Option<Address>,
}

fn role_key(label: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + label.len());
    key.push(ROLE_KEY_PREFIX);
    key.extend_from_slice(label.as_bytes());
    key
}

pub struct RoleRegistry;

impl RoleRegistry {
    pub fn execute(store: &dyn KvStore, msg: &[u8]) -> Result<Vec<u8>, KilnError> {
        let msg: RolesExecuteMsg =
            serde_json::from_slice(msg).map_err(|e| KilnError::Serialization(e.to_string()))?;
        match msg {
            RolesExecuteMsg::SetRole { label, address } => {
                store.put(&role_key(&label), &address)?;
                Ok(Vec::new())
            }
        }
    }

    pub fn query(store: &dyn KvStore, msg: &[u8]) -> Result<Vec<u8>, KilnError> {
        let msg: RolesQueryMsg =
            serde_json::from_slice(msg).map_err(|e| KilnError::Serialization(e.to_string()))?;
        match msg {
            RolesQueryMsg::GetRoleByLabel { label } => {
                let address = store
                    .get(&role_key(&label))?
                    .map(|raw| {
                        Address::try_from(raw.as_slice()).map_err(|_| {
                            KilnError::Serialization("malformed role record".to_string())
                        })
                    })
                    .transpose()?;
                serde_json::to_vec(&RoleResponse { address })
                    .map_err(|e| KilnError::Serialization(e.to_string()))
            }
        }
    }
}
