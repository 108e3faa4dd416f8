//! Reserved system addresses, role labels, host interface names and the
//! entry points a loaded module must export.

use crate::primitives::Address;

// ─── Host interfaces ────────────────────────────────────────────────────────

/// The default host interface every contract may import.
pub const EMBER_ENV_1: &str = "ember_env_1";
/// Extended host interface reserved for system contracts (consensus plumbing).
pub const EMBER_ENV_CORE_1: &str = "ember_env_core_1";
/// Non-deterministic system interface, reachable only from debug queries.
pub const SYS_ENV_1: &str = "sys_env_1";

/// Interpreter dialect markers.
pub const INTERPRETER_EVM_SHANGHAI: &str = "interpreter_evm_shanghai";
pub const INTERPRETER_JAVASCRIPT: &str = "interpreter_javascript";
pub const INTERPRETER_PYTHON: &str = "interpreter_python";

const SUPPORTED_HOST_INTERFACES: &[&str] = &[EMBER_ENV_1, EMBER_ENV_CORE_1, SYS_ENV_1];

/// Bare tags outside this set are not host interfaces.
pub fn is_supported_host_interface(name: &str) -> bool {
    SUPPORTED_HOST_INTERFACES.contains(&name)
}

/// Interfaces only system contracts may carry.
pub fn is_system_only_interface(name: &str) -> bool {
    name == EMBER_ENV_CORE_1 || name == SYS_ENV_1
}

// ─── Entry points ───────────────────────────────────────────────────────────

pub const ENTRY_POINT_INSTANTIATE: &str = "instantiate";
pub const ENTRY_POINT_EXECUTE: &str = "execute";
pub const ENTRY_POINT_QUERY: &str = "query";
pub const ENTRY_POINT_REPLY: &str = "reply";

// ─── System addresses ───────────────────────────────────────────────────────

/// Addresses with 18 leading zero bytes form the privileged system range.
/// Cross-calls into this range are restricted (see the resolver).
pub fn is_system_address(addr: &Address) -> bool {
    addr[..18].iter().all(|b| *b == 0) && addr[18..] != [0u8; 2]
}

/// Build a system address from its reserved index.
pub const fn system_address(index: u16) -> Address {
    let mut addr = [0u8; 20];
    addr[18] = (index >> 8) as u8;
    addr[19] = (index & 0xff) as u8;
    addr
}

/// The code/contract metadata registry system contract.
pub const ADDR_CODE_REGISTRY: Address = system_address(0x10);
/// The role registry system contract.
pub const ADDR_ROLES: Address = system_address(0x11);
/// The bank system contract.
pub const ADDR_BANK: Address = system_address(0x12);
/// Interpreter contracts, one per dialect.
pub const ADDR_INTERPRETER_EVM: Address = system_address(0x20);
pub const ADDR_INTERPRETER_JS: Address = system_address(0x21);
pub const ADDR_INTERPRETER_PY: Address = system_address(0x22);

// ─── Role labels ────────────────────────────────────────────────────────────

pub const ROLE_STORAGE_CONTRACTS: &str = "storage_contracts";
pub const ROLE_ROLES: &str = "roles";
pub const ROLE_BANK: &str = "bank";
pub const ROLE_INTERPRETER: &str = "interpreter";

// ─── Events ─────────────────────────────────────────────────────────────────

/// The module event type emitted once per contract invocation.
pub const MODULE_EVENT_TYPE: &str = "ember";
/// Namespace prefix applied to contract-defined event types.
pub const CUSTOM_EVENT_PREFIX: &str = "ember-";

pub const EVENT_TYPE_STORE_CODE: &str = "store_code";
pub const EVENT_TYPE_INSTANTIATE: &str = "instantiate";
pub const EVENT_TYPE_EXECUTE: &str = "execute";
pub const EVENT_TYPE_REPLY: &str = "reply";
pub const EVENT_TYPE_DEPLOY: &str = "deploy";
pub const EVENT_TYPE_PIN_CODE: &str = "pin_code";
pub const EVENT_TYPE_UNPIN_CODE: &str = "unpin_code";

pub const ATTR_KEY_CHECKSUM: &str = "checksum";
pub const ATTR_KEY_CODE_ID: &str = "code_id";
pub const ATTR_KEY_CONTRACT_ADDR: &str = "_contract_address";
pub const ATTR_KEY_REQUIRED_CAPABILITY: &str = "required_capability";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_address_range() {
        assert!(is_system_address(&ADDR_CODE_REGISTRY));
        assert!(is_system_address(&ADDR_INTERPRETER_EVM));
        assert!(!is_system_address(&[0u8; 20]));
        assert!(!is_system_address(&[7u8; 20]));

        let mut almost = [0u8; 20];
        almost[17] = 1;
        almost[19] = 1;
        assert!(!is_system_address(&almost));
    }

    #[test]
    fn test_system_address_index() {
        assert_eq!(ADDR_CODE_REGISTRY[19], 0x10);
        assert_eq!(system_address(0x1234)[18], 0x12);
        assert_eq!(system_address(0x1234)[19], 0x34);
    }
}
