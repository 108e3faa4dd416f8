//! Capability/dependency resolution and the system-address policy.
//!
//! A contract's capability tags resolve to built-in host interfaces, other
//! contracts (recursively, with their own dependencies), or role labels
//! looked up through the role registry. The system-address checks here are a
//! security invariant evaluated before every execute/query dispatch.

use ember_types::capability::{Capability, Dialect};
use ember_types::env::{ContractDependency, SystemDep};
use ember_types::primitives::{address_display, Address};
use ember_types::system::{self, is_system_address};

use crate::context::{contract_store_prefix, TxContext};
use crate::error::KilnError;
use crate::keeper::Kiln;
use crate::roles::{RoleResponse, RolesQueryMsg};

/// Resolution recursion bound. Dependency chains are cycle-free by
/// construction (a `create` chain referencing itself fails earlier), so this
/// only guards against corrupted state.
const MAX_DEPENDENCY_DEPTH: usize = 8;

/// Code carrying a system-only host interface may only live at a system
/// address.
pub fn require_not_system_contract(
    contract: &Address,
    deps: &[Capability],
) -> Result<(), KilnError> {
    for dep in deps {
        if dep.is_system_interface() && !is_system_address(contract) {
            return Err(KilnError::UnauthorizedAddress(
                "invalid address for system contracts".to_string(),
            ));
        }
    }
    Ok(())
}

impl Kiln {
    /// Whether `caller` may target a contract in the privileged system
    /// range: allowed for non-contract accounts and for system contracts
    /// themselves.
    pub fn can_call_system_contract(&self, ctx: &TxContext, caller: &Address) -> bool {
        match self.has_contract_info(ctx, caller) {
            Ok(false) => true,
            _ => is_system_address(caller),
        }
    }

    /// The interpreter system contract serving a dialect.
    pub fn interpreter_address(&self, dialect: Dialect) -> Address {
        match dialect {
            Dialect::EvmShanghai => system::ADDR_INTERPRETER_EVM,
            Dialect::JavaScript => system::ADDR_INTERPRETER_JS,
            Dialect::Python => system::ADDR_INTERPRETER_PY,
        }
    }

    /// Resolve a role label to a contract address through the role registry.
    pub fn role_address(&self, ctx: &TxContext, label: &str) -> Result<Option<Address>, KilnError> {
        let msg = serde_json::to_vec(&RolesQueryMsg::GetRoleByLabel {
            label: label.to_string(),
        })
        .map_err(|e| KilnError::Serialization(e.to_string()))?;
        let raw = self.internal_query(ctx, &self.bootstrap.roles_address, &msg)?;
        let parsed: RoleResponse =
            serde_json::from_slice(&raw).map_err(|e| KilnError::Serialization(e.to_string()))?;
        Ok(parsed.address)
    }

    /// Resolve the contract-address capabilities of a tag list into full
    /// dependencies, failing when any referenced contract is missing.
    pub fn contract_deps_from_code_deps(
        &self,
        ctx: &TxContext,
        deps: &[Capability],
    ) -> Result<Vec<ContractDependency>, KilnError> {
        let mut out = Vec::new();
        for dep in deps {
            let Capability::ContractAddress { address, role } = dep else {
                continue;
            };
            let mut resolved = self.get_contract_dependency(ctx, address)?;
            resolved.role = role.clone();
            out.push(resolved);
        }
        Ok(out)
    }

    /// Resolve one contract address to its full dependency view, including
    /// its own transitively resolved dependencies.
    pub fn get_contract_dependency(
        &self,
        ctx: &TxContext,
        addr: &Address,
    ) -> Result<ContractDependency, KilnError> {
        self.contract_dependency_at_depth(ctx, addr, 0)
    }

    fn contract_dependency_at_depth(
        &self,
        ctx: &TxContext,
        addr: &Address,
        depth: usize,
    ) -> Result<ContractDependency, KilnError> {
        if depth > MAX_DEPENDENCY_DEPTH {
            return Err(KilnError::Invalid(format!(
                "dependency chain too deep at {}",
                address_display(addr)
            )));
        }
        let Some((contract_info, code_info)) = self.contract_instance(ctx, addr)? else {
            return Err(KilnError::NotFound(format!(
                "contract dependency {}",
                address_display(addr)
            )));
        };
        let aot_file_path = if code_info.pinned {
            self.code_store
                .pinned_path(&code_info.code_hash)
                .display()
                .to_string()
        } else {
            String::new()
        };
        Ok(ContractDependency {
            address: *addr,
            role: None,
            label: contract_info.label.clone(),
            code_id: contract_info.code_id,
            code_hash: code_info.code_hash,
            store_prefix: contract_store_prefix(addr),
            storage_type: contract_info.storage_type,
            code_file_path: self.code_store.code_file_path(&code_info),
            aot_file_path,
            pinned: code_info.pinned,
            metering_off: code_info.metering_off,
            system_deps: self.system_deps_at_depth(ctx, &code_info.deps, depth + 1),
        })
    }

    /// Resolve the non-address capabilities of a tag list: host interfaces
    /// stay as bare labels, role labels resolve through the role registry to
    /// the backing contract's code paths.
    pub fn system_deps_from_code_deps(
        &self,
        ctx: &TxContext,
        deps: &[Capability],
    ) -> Vec<SystemDep> {
        self.system_deps_at_depth(ctx, deps, 0)
    }

    fn system_deps_at_depth(
        &self,
        ctx: &TxContext,
        deps: &[Capability],
        depth: usize,
    ) -> Vec<SystemDep> {
        let mut out = Vec::new();
        for dep in deps {
            match dep {
                Capability::HostInterface(name) => {
                    // Supported host interfaces are not roles; they resolve
                    // to themselves.
                    out.push(SystemDep {
                        role: name.clone(),
                        label: name.clone(),
                        ..SystemDep::default()
                    });
                }
                Capability::Interpreter(dialect) => {
                    let label = dialect.tag().to_string();
                    match self.system_dep_from_address(
                        ctx,
                        &self.interpreter_address(*dialect),
                        &label,
                        depth,
                    ) {
                        Ok(resolved) => out.push(resolved),
                        Err(_) => out.push(SystemDep {
                            role: system::ROLE_INTERPRETER.to_string(),
                            label,
                            ..SystemDep::default()
                        }),
                    }
                }
                Capability::RoleLabel(label) => {
                    let resolved = self
                        .role_address(ctx, label)
                        .ok()
                        .flatten()
                        .and_then(|addr| {
                            self.system_dep_from_address(ctx, &addr, label, depth).ok()
                        });
                    out.push(resolved.unwrap_or_else(|| SystemDep {
                        role: label.clone(),
                        label: label.clone(),
                        ..SystemDep::default()
                    }));
                }
                Capability::ContractAddress { .. } => {}
            }
        }
        out
    }

    fn system_dep_from_address(
        &self,
        ctx: &TxContext,
        addr: &Address,
        label: &str,
        depth: usize,
    ) -> Result<SystemDep, KilnError> {
        if depth > MAX_DEPENDENCY_DEPTH {
            return Err(KilnError::Invalid("dependency chain too deep".to_string()));
        }
        let Some((contract_info, code_info)) = self.contract_instance(ctx, addr)? else {
            return Err(KilnError::NotFound(format!(
                "role contract {}",
                address_display(addr)
            )));
        };
        let aot_file_path = if code_info.pinned {
            self.code_store
                .pinned_path(&code_info.code_hash)
                .display()
                .to_string()
        } else {
            String::new()
        };
        Ok(SystemDep {
            role: contract_info.label.clone(),
            label: label.to_string(),
            code_file_path: self.code_store.code_file_path(&code_info),
            aot_file_path,
            pinned: code_info.pinned,
            deps: self.system_deps_at_depth(ctx, &code_info.deps, depth + 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_types::system::EMBER_ENV_CORE_1;

    #[test]
    fn test_system_interface_requires_system_address() {
        let deps = vec![Capability::HostInterface(EMBER_ENV_CORE_1.to_string())];
        let user_addr = [9u8; 20];
        assert!(matches!(
            require_not_system_contract(&user_addr, &deps),
            Err(KilnError::UnauthorizedAddress(_))
        ));
        assert!(require_not_system_contract(&system::ADDR_BANK, &deps).is_ok());
    }

    #[test]
    fn test_plain_interface_allowed_anywhere() {
        let deps = vec![Capability::HostInterface(
            system::EMBER_ENV_1.to_string(),
        )];
        assert!(require_not_system_contract(&[9u8; 20], &deps).is_ok());
    }
}
