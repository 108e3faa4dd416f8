use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::coin::Coins;
use crate::primitives::{Address, CodeId, Gas};

/// One key/value attribute on an event.
#[derive(
    Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

impl EventAttribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Bytes counted against the event-cost free tier.
    pub fn stored_len(&self) -> u64 {
        (self.key.len() + self.value.len()) as u64
    }
}

/// A typed event emitted by a contract or by the keeper itself.
#[derive(
    Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Event {
    #[serde(rename = "type")]
    pub ty: String,
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    pub fn new(ty: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(EventAttribute::new(key, value));
        self
    }
}

/// When a sub-message's completion is reported back to the contract.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum ReplyOn {
    Always,
    Success,
    Error,
    Never,
}

/// A message a contract asks the keeper to dispatch after its own call
/// completes.
#[derive(
    Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct SubMsg {
    pub id: u64,
    pub msg: SubMsgKind,
    /// Optional gas cap for the sub-call, in host units.
    pub gas_limit: Option<Gas>,
    pub reply_on: ReplyOn,
}

#[derive(
    Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum SubMsgKind {
    Bank {
        to: Address,
        amount: Coins,
    },
    Execute {
        contract: Address,
        msg: Vec<u8>,
        funds: Coins,
    },
    Instantiate {
        code_id: CodeId,
        msg: Vec<u8>,
        funds: Coins,
        label: String,
    },
}

/// The value a contract invocation produces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractResponse {
    pub data: Vec<u8>,
    /// Attributes attached to the module event for this invocation.
    pub attributes: Vec<EventAttribute>,
    /// Contract-defined custom events.
    pub events: Vec<Event>,
    pub sub_messages: Vec<SubMsg>,
    pub error_message: Option<String>,
    /// Full linear-memory snapshot; populated only by debug queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_snapshot: Option<Vec<u8>>,
}

/// The outcome of a completed sub-message, fed to the `reply` entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub id: u64,
    pub result: SubMsgResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubMsgResult {
    Ok(SubMsgResponse),
    Err(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubMsgResponse {
    pub events: Vec<Event>,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_builder() {
        let event = Event::new("transfer").attr("from", "a").attr("to", "b");
        assert_eq!(event.ty, "transfer");
        assert_eq!(event.attributes.len(), 2);
        assert_eq!(event.attributes[0].stored_len(), 5);
    }

    #[test]
    fn test_reply_json_roundtrip() {
        let reply = Reply {
            id: 4,
            result: SubMsgResult::Err("codespace: kiln, code: 5".to_string()),
        };
        let encoded = serde_json::to_vec(&reply).unwrap();
        let decoded: Reply = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn test_contract_response_default_is_empty() {
        let res = ContractResponse::default();
        assert!(res.data.is_empty());
        assert!(res.events.is_empty());
        assert!(res.sub_messages.is_empty());
        assert!(res.memory_snapshot.is_none());
    }
}
