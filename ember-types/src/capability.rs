use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::error::TypesError;
use crate::primitives::{address_display, address_from_hex, Address};
use crate::system;

/// A bytecode dialect executed through the interpreted path.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum Dialect {
    /// Ethereum-style bytecode, run by the EVM-in-WebAssembly interpreter.
    EvmShanghai,
    /// JavaScript source, run by the JavaScript interpreter contract.
    JavaScript,
    /// Python source, run by the Python interpreter contract.
    Python,
}

impl Dialect {
    /// The capability tag naming this dialect.
    pub fn tag(&self) -> &'static str {
        match self {
            Dialect::EvmShanghai => system::INTERPRETER_EVM_SHANGHAI,
            Dialect::JavaScript => system::INTERPRETER_JAVASCRIPT,
            Dialect::Python => system::INTERPRETER_PYTHON,
        }
    }

    /// File extension for utf8 source dialects; `None` for bytecode dialects,
    /// which are stored inside CodeInfo rather than on disk.
    pub fn source_extension(&self) -> Option<&'static str> {
        match self {
            Dialect::EvmShanghai => None,
            Dialect::JavaScript => Some("js"),
            Dialect::Python => Some("py"),
        }
    }

    /// Whether the deployed artifact is utf8 source text.
    pub fn is_utf8_source(&self) -> bool {
        self.source_extension().is_some()
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            system::INTERPRETER_EVM_SHANGHAI => Some(Dialect::EvmShanghai),
            system::INTERPRETER_JAVASCRIPT => Some(Dialect::JavaScript),
            system::INTERPRETER_PYTHON => Some(Dialect::Python),
            _ => None,
        }
    }
}

/// A parsed capability tag from CodeInfo.
///
/// Tags arrive as free-form strings at `create` time and are parsed exactly
/// once into this union; nothing downstream re-sniffs prefixes.
#[derive(
    Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum Capability {
    /// A built-in host interface the contract imports (fixed supported set).
    HostInterface(String),
    /// An interpreter dialect marker.
    Interpreter(Dialect),
    /// A direct dependency on another contract, optionally with a role label.
    ContractAddress {
        address: Address,
        role: Option<String>,
    },
    /// A role label resolved through the roles registry.
    RoleLabel(String),
}

impl Capability {
    /// Parse one raw tag.
    ///
    /// `0x`-prefixed tags are contract addresses with an optional `:role`
    /// suffix; names in the supported host-interface set are host interfaces;
    /// interpreter markers select a dialect; everything else is a role label.
    pub fn parse(tag: &str) -> Result<Self, TypesError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(TypesError::EmptyCapability);
        }
        if let Some(addr_part) = tag.strip_prefix("0x") {
            let (addr_str, role) = match addr_part.split_once(':') {
                Some((a, r)) => (a, Some(r.to_string())),
                None => (addr_part, None),
            };
            let address = address_from_hex(&format!("0x{addr_str}"))
                .ok_or_else(|| TypesError::InvalidCapability(tag.to_string()))?;
            return Ok(Capability::ContractAddress { address, role });
        }
        if let Some(dialect) = Dialect::from_tag(tag) {
            return Ok(Capability::Interpreter(dialect));
        }
        if system::is_supported_host_interface(tag) {
            return Ok(Capability::HostInterface(tag.to_string()));
        }
        Ok(Capability::RoleLabel(tag.to_string()))
    }

    /// Parse a whole tag list, deduplicating while preserving order.
    pub fn parse_all(tags: &[String]) -> Result<Vec<Capability>, TypesError> {
        let mut out: Vec<Capability> = Vec::with_capacity(tags.len());
        for tag in tags {
            let cap = Capability::parse(tag)?;
            if !out.contains(&cap) {
                out.push(cap);
            }
        }
        Ok(out)
    }

    pub fn as_interpreter(&self) -> Option<Dialect> {
        match self {
            Capability::Interpreter(d) => Some(*d),
            _ => None,
        }
    }

    /// Whether this tag marks code whose on-disk artifact is utf8 source.
    pub fn is_utf8_source(&self) -> bool {
        matches!(self, Capability::Interpreter(d) if d.is_utf8_source())
    }

    /// Whether this tag requires system-contract privileges at runtime.
    pub fn is_system_interface(&self) -> bool {
        matches!(self, Capability::HostInterface(name) if system::is_system_only_interface(name))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::HostInterface(name) => write!(f, "{name}"),
            Capability::Interpreter(dialect) => write!(f, "{}", dialect.tag()),
            Capability::ContractAddress { address, role } => match role {
                Some(role) => write!(f, "{}:{role}", address_display(address)),
                None => write!(f, "{}", address_display(address)),
            },
            Capability::RoleLabel(label) => write!(f, "{label}"),
        }
    }
}

/// Find the utf8 source dialect in a capability list, if any.
pub fn utf8_dialect(caps: &[Capability]) -> Option<Dialect> {
    caps.iter()
        .filter_map(Capability::as_interpreter)
        .find(|d| d.is_utf8_source())
}

/// Find any interpreter dialect in a capability list.
pub fn interpreter_dialect(caps: &[Capability]) -> Option<Dialect> {
    caps.iter().filter_map(Capability::as_interpreter).next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_interface() {
        let cap = Capability::parse(system::EMBER_ENV_1).unwrap();
        assert_eq!(cap, Capability::HostInterface(system::EMBER_ENV_1.to_string()));
    }

    #[test]
    fn test_parse_contract_address_with_role() {
        let cap = Capability::parse("0x0000000000000000000000000000000000000012:bank").unwrap();
        match cap {
            Capability::ContractAddress { address, role } => {
                assert_eq!(address[19], 0x12);
                assert_eq!(role.as_deref(), Some("bank"));
            }
            other => panic!("unexpected capability: {other:?}"),
        }
    }

    #[test]
    fn test_parse_dialect() {
        let cap = Capability::parse(system::INTERPRETER_JAVASCRIPT).unwrap();
        assert_eq!(cap, Capability::Interpreter(Dialect::JavaScript));
        assert!(cap.is_utf8_source());

        let cap = Capability::parse(system::INTERPRETER_EVM_SHANGHAI).unwrap();
        assert_eq!(cap, Capability::Interpreter(Dialect::EvmShanghai));
        assert!(!cap.is_utf8_source());
    }

    #[test]
    fn test_parse_role_label() {
        let cap = Capability::parse("staking").unwrap();
        assert_eq!(cap, Capability::RoleLabel("staking".to_string()));
    }

    #[test]
    fn test_parse_rejects_malformed_address() {
        assert!(Capability::parse("0x1234").is_err());
        assert!(Capability::parse("").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for tag in [
            system::EMBER_ENV_1,
            system::INTERPRETER_PYTHON,
            "0x0000000000000000000000000000000000000012:bank",
            "roles",
        ] {
            let cap = Capability::parse(tag).unwrap();
            assert_eq!(cap.to_string(), tag);
        }
    }

    #[test]
    fn test_parse_all_dedupes() {
        let tags = vec!["bank".to_string(), "bank".to_string(), "roles".to_string()];
        let caps = Capability::parse_all(&tags).unwrap();
        assert_eq!(caps.len(), 2);
    }
}
