//! The execution engine: builds the per-call environment, selects the
//! native or interpreted dispatch path, grants the backend its gas budget,
//! and translates consumption back into ledger units at the boundary.

use tracing::debug;

use ember_forge::{ForgeError, InstanceOptions, Memory, ModuleCode, RuntimeBackend, VmInstance};
use ember_types::contract::{CodeInfo, ContractStorageType};
use ember_types::env::{ChainInfo, Env, EnvContractInfo, MessageInfo};
use ember_types::primitives::{Address, CodeId};
use ember_types::response::ContractResponse;
use ember_types::system::ENTRY_POINT_INSTANTIATE;

use crate::context::{contract_store_prefix, TxContext};
use crate::error::KilnError;
use crate::host::{host_modules, HostCtx};
use crate::keeper::Kiln;

impl Kiln {
    /// How much VM gas the contract may use, given the ledger meter's
    /// remaining budget: zero when already exhausted, the maximum
    /// representable value when the meter is unlimited.
    pub(crate) fn runtime_gas_for_contract(&self, ctx: &TxContext) -> Result<u64, KilnError> {
        if ctx.is_out_of_gas() {
            return Ok(0);
        }
        if ctx.gas_limit() == 0 {
            return Ok(u64::MAX);
        }
        self.gas.to_vm_gas(ctx.gas_remaining())
    }

    /// Translate VM gas spent into ledger units and consume it, escalating
    /// exhaustion into the fatal out-of-gas signal.
    pub(crate) fn consume_runtime_gas(&self, ctx: &TxContext, vm_gas: u64) -> Result<(), KilnError> {
        let consumed = self.gas.from_vm_gas(vm_gas);
        ctx.consume_gas(consumed, "wasm contract")?;
        if ctx.is_out_of_gas() {
            return Err(KilnError::out_of_gas("contract execution"));
        }
        Ok(())
    }

    /// Run one entry point of a contract.
    ///
    /// Both the native and interpreted paths converge on the same backend
    /// contract; they differ only in which module is loaded and what the
    /// environment's bytecode field carries.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn engine_call(
        &self,
        ctx: &TxContext,
        entry: &str,
        code_id: CodeId,
        code_info: &CodeInfo,
        storage_type: ContractStorageType,
        contract_address: &Address,
        msg: &[u8],
        info: MessageInfo,
        debug_snapshot: bool,
        read_only: bool,
    ) -> Result<ContractResponse, KilnError> {
        let (module_bytes, pinned_module_path, env_bytecode) =
            self.select_module(ctx, entry, code_info)?;

        let env = Env {
            chain: ChainInfo {
                denom: self.config.denom.clone(),
                chain_id: self.config.chain_id,
            },
            block: ctx.block.clone(),
            transaction: ctx.tx.clone(),
            contract: EnvContractInfo {
                address: *contract_address,
                code_hash: code_info.code_hash,
                code_id,
                deps: code_info.deps.iter().map(ToString::to_string).collect(),
                bytecode: env_bytecode,
            },
            current_call: info,
        };

        let budget = self.runtime_gas_for_contract(ctx)?;
        let fuel = if code_info.metering_off {
            u64::MAX
        } else {
            crate::gas::fuel_for_budget(budget)
        };

        let storage = ctx.contract_store(storage_type, contract_store_prefix(contract_address));
        let host = HostCtx::new(
            self.clone(),
            ctx.clone(),
            env,
            msg.to_vec(),
            storage,
            budget,
            read_only,
        );

        let code = match &pinned_module_path {
            Some(path) => ModuleCode::Precompiled(path.as_path()),
            None => ModuleCode::Raw(&module_bytes),
        };
        let mut instance = self
            .vm
            .instantiate_module(
                code,
                host,
                &host_modules(),
                InstanceOptions {
                    fuel,
                    memory_limit: self.config.memory_limit,
                },
            )
            .map_err(|e| KilnError::ExecuteFailed(e.to_string()))?;

        let outcome = instance.call(entry, &[]);
        debug!(
            entry,
            backend = self.vm.name(),
            fuel_used = instance.fuel_used(),
            success = outcome.is_ok(),
            "contract call finished"
        );

        let snapshot = if debug_snapshot {
            instance
                .memory()
                .ok()
                .map(|mem| mem.read(0, mem.size() as u32).unwrap_or_default())
        } else {
            None
        };

        let host = instance.into_host();
        let vm_gas_used = host.meter.used();

        match outcome {
            Ok(_) | Err(ForgeError::Halted) => {
                self.consume_runtime_gas(ctx, vm_gas_used)?;
                let mut response = host.into_response();
                response.memory_snapshot = snapshot;
                Ok(response)
            }
            Err(ForgeError::OutOfGas) => {
                // Charge the whole granted budget; the backend ran past it.
                self.consume_runtime_gas(ctx, host.meter.limit())?;
                Err(KilnError::out_of_gas(format!("contract {entry}")))
            }
            Err(ForgeError::Reverted { data }) => {
                self.consume_runtime_gas(ctx, vm_gas_used)?;
                Err(KilnError::ExecuteFailed(format!(
                    "revert: {}",
                    revert_payload_display(&data)
                )))
            }
            Err(err) => {
                self.consume_runtime_gas(ctx, vm_gas_used)?;
                Err(KilnError::ExecuteFailed(err.to_string()))
            }
        }
    }

    /// Select the module to load and the bytecode travelling in the
    /// environment. Interpreted code loads the dialect interpreter's module
    /// instead of its own artifact.
    fn select_module(
        &self,
        ctx: &TxContext,
        entry: &str,
        code_info: &CodeInfo,
    ) -> Result<(Vec<u8>, Option<std::path::PathBuf>, Vec<u8>), KilnError> {
        if code_info.is_interpreted() {
            let dialect = code_info.interpreter_dialect().ok_or_else(|| {
                KilnError::Invalid("interpreted bytecode without a dialect tag".to_string())
            })?;
            let env_bytecode = if let Some(extension) =
                code_info.utf8_dialect().and_then(|d| d.source_extension())
            {
                self.code_store
                    .load_source(&code_info.code_hash, extension)?
            } else if entry == ENTRY_POINT_INSTANTIATE {
                code_info.interpreted_bytecode_deployment.clone()
            } else {
                code_info.interpreted_bytecode_runtime.clone()
            };

            let interpreter_address = self.interpreter_address(dialect);
            let Some((_, interpreter_code)) =
                self.contract_instance(ctx, &interpreter_address)?
            else {
                return Err(KilnError::NotFound(format!(
                    "interpreter contract for dialect {}",
                    dialect.tag()
                )));
            };
            let (bytes, pinned) = self.module_source(&interpreter_code)?;
            return Ok((bytes, pinned, env_bytecode));
        }

        let (bytes, pinned) = self.module_source(code_info)?;
        Ok((bytes, pinned, Vec::new()))
    }

    /// Raw bytes or pinned artifact path for a native module.
    fn module_source(
        &self,
        code_info: &CodeInfo,
    ) -> Result<(Vec<u8>, Option<std::path::PathBuf>), KilnError> {
        if code_info.pinned && self.code_store.has_pinned_artifact(&code_info.code_hash) {
            return Ok((Vec::new(), Some(self.code_store.pinned_path(&code_info.code_hash))));
        }
        Ok((self.code_store.load_native(&code_info.code_hash)?, None))
    }
}

/// Revert payloads are user data: shown as utf8 when printable, hex
/// otherwise.
fn revert_payload_display(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) if text.chars().all(|c| !c.is_control()) => text.to_string(),
        _ => format!("0x{}", hex::encode(data)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_payload_display() {
        assert_eq!(revert_payload_display(b"bad input"), "bad input");
        assert_eq!(revert_payload_display(&[0x00, 0xff]), "0x00ff");
        assert_eq!(revert_payload_display(b""), "");
    }
}
