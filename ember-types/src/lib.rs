//! Shared type definitions for the Ember contract engine.
//!
//! Everything that crosses a crate boundary lives here: primitive aliases,
//! code/contract metadata, capability tags, the per-call execution
//! environment, contract responses and events.

pub mod capability;
pub mod coin;
pub mod contract;
pub mod env;
pub mod error;
pub mod primitives;
pub mod response;
pub mod system;

#[cfg(test)]
mod tests {
    use borsh::{BorshDeserialize, BorshSerialize};

    /// Helper: borsh round-trip test.
    fn borsh_roundtrip<T: BorshSerialize + BorshDeserialize + PartialEq + std::fmt::Debug>(
        value: &T,
    ) {
        let encoded = borsh::to_vec(value).expect("borsh serialize failed");
        let decoded = T::try_from_slice(&encoded).expect("borsh deserialize failed");
        assert_eq!(*value, decoded);
    }

    #[test]
    fn test_code_info_roundtrip() {
        use crate::capability::Capability;
        use crate::contract::{CodeInfo, CodeMetadata};
        let info = CodeInfo {
            code_hash: [7u8; 32],
            creator: [1u8; 20],
            deps: vec![
                Capability::HostInterface("ember_env_1".to_string()),
                Capability::ContractAddress {
                    address: [2u8; 20],
                    role: Some("bank".to_string()),
                },
            ],
            pinned: true,
            metering_off: false,
            metadata: CodeMetadata::default(),
            interpreted_bytecode_deployment: vec![],
            interpreted_bytecode_runtime: vec![0xfe, 0xed],
            runtime_hash: Some([9u8; 32]),
        };
        borsh_roundtrip(&info);
    }

    #[test]
    fn test_contract_info_roundtrip() {
        use crate::contract::{ContractInfo, ContractStorageType};
        let info = ContractInfo {
            code_id: 3,
            creator: [1u8; 20],
            provenance: None,
            init_message: vec![1, 2, 3],
            label: "counter".to_string(),
            storage_type: ContractStorageType::CoreConsensus,
            ibc_port_id: None,
        };
        borsh_roundtrip(&info);
    }

    #[test]
    fn test_sub_msg_roundtrip() {
        use crate::coin::Coin;
        use crate::response::{ReplyOn, SubMsg, SubMsgKind};
        let msg = SubMsg {
            id: 9,
            msg: SubMsgKind::Bank {
                to: [4u8; 20],
                amount: vec![Coin::new(100, "ember")],
            },
            gas_limit: Some(50_000),
            reply_on: ReplyOn::Error,
        };
        borsh_roundtrip(&msg);
    }
}
