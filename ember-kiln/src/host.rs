//! The host-function boundary: the per-call host context owned by the VM
//! store, and the declarative function tables registered into every module.
//!
//! One table drives both backends. Gas for host work is charged in VM units
//! against the call's runtime meter; the keeper converts the total back to
//! ledger units after the call.

use ember_forge::{
    memory, ForgeError, HostFnDesc, HostModule, HostState, Memory, SliceMemory, ValKind, WasmVal,
};
use ember_storage::{KvStore, PrefixedStore};
use ember_types::coin::Coin;
use ember_types::env::Env;
use ember_types::primitives::Address;
use ember_types::response::{ContractResponse, Event, EventAttribute, SubMsg};

use crate::context::TxContext;
use crate::error::KilnError;
use crate::gas::RuntimeGasMeter;
use crate::keeper::Kiln;

/// VM-unit costs per host function. One ledger gas point is
/// `gas_multiplier` VM points; storage access dominates.
pub const HOST_GAS_BASE: u64 = 14_000_000;
pub const HOST_GAS_STORAGE_LOAD: u64 = 140_000_000;
pub const HOST_GAS_STORAGE_STORE: u64 = 280_000_000;
pub const HOST_GAS_EMIT: u64 = 28_000_000;
pub const HOST_GAS_CALL: u64 = 1_400_000_000;

/// Import module names. A contract declares these as capability tags.
pub const ENV_MODULE: &str = "ember_env_1";
pub const SYS_MODULE: &str = "sys_env_1";

/// Per-call host state handed to the VM store.
pub struct HostCtx {
    pub kiln: Kiln,
    pub ctx: TxContext,
    pub env: Env,
    pub calldata: Vec<u8>,
    /// The contract's own prefixed key space.
    pub storage: PrefixedStore,
    /// VM-unit budget for this call.
    pub meter: RuntimeGasMeter,
    pub read_only: bool,

    pub finish_data: Vec<u8>,
    pub attributes: Vec<EventAttribute>,
    pub events: Vec<Event>,
    pub sub_messages: Vec<SubMsg>,
    /// Return data of the most recent cross-contract call.
    pub return_data: Vec<u8>,
    failure: Option<ForgeError>,
}

impl HostCtx {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kiln: Kiln,
        ctx: TxContext,
        env: Env,
        calldata: Vec<u8>,
        storage: PrefixedStore,
        vm_budget: u64,
        read_only: bool,
    ) -> Self {
        Self {
            kiln,
            ctx,
            env,
            calldata,
            storage,
            meter: RuntimeGasMeter::new(vm_budget),
            read_only,
            finish_data: Vec::new(),
            attributes: Vec::new(),
            events: Vec::new(),
            sub_messages: Vec::new(),
            return_data: Vec::new(),
            failure: None,
        }
    }

    /// Assemble the accumulated call effects into a ContractResponse.
    pub fn into_response(self) -> ContractResponse {
        ContractResponse {
            data: self.finish_data,
            attributes: self.attributes,
            events: self.events,
            sub_messages: self.sub_messages,
            error_message: None,
            memory_snapshot: None,
        }
    }
}

impl HostState for HostCtx {
    fn charge(&mut self, gas: u64) -> Result<(), ForgeError> {
        self.meter.consume(gas)
    }

    fn set_failure(&mut self, err: ForgeError) {
        self.failure = Some(err);
    }

    fn take_failure(&mut self) -> Option<ForgeError> {
        self.failure.take()
    }
}

fn host_err(reason: impl Into<String>) -> ForgeError {
    ForgeError::HostFunction {
        reason: reason.into(),
    }
}

fn storage_err(err: KilnError) -> ForgeError {
    host_err(format!("storage: {err}"))
}

fn read_address(mem: &SliceMemory<'_>, ptr: u32) -> Result<Address, ForgeError> {
    let raw = mem.read(ptr, 20)?;
    Ok(raw.as_slice().try_into().unwrap_or([0u8; 20]))
}

fn read_utf8(mem: &SliceMemory<'_>, ptr: u32, len: u32) -> Result<String, ForgeError> {
    String::from_utf8(mem.read(ptr, len)?).map_err(|_| host_err("invalid utf8"))
}

// ─── ember_env_1 ────────────────────────────────────────────────────────────

fn calldata_length(
    host: &mut HostCtx,
    _mem: &mut SliceMemory<'_>,
    _args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    Ok(vec![WasmVal::I32(host.calldata.len() as i32)])
}

fn calldata_copy(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    let dst = args[0].as_ptr();
    let offset = args[1].as_ptr() as usize;
    let len = args[2].as_ptr() as usize;
    if len > mem.size() {
        return Err(ForgeError::OutOfBounds {
            offset: dst as u64,
            len: len as u64,
            size: mem.size() as u64,
        });
    }
    // Past-the-end reads are zero-padded, matching CALLDATACOPY.
    let mut chunk = vec![0u8; len];
    if offset < host.calldata.len() {
        let available = (host.calldata.len() - offset).min(len);
        chunk[..available].copy_from_slice(&host.calldata[offset..offset + available]);
    }
    mem.write(dst, &chunk)?;
    Ok(vec![])
}

/// `storage_load(key_ptr, key_len, out_ptr, out_max) -> i32`
///
/// Returns the value length, writing the value at `out_ptr` unless it is 0
/// (probe mode). -1 when the key is missing, -2 when the buffer is too
/// small.
fn storage_load(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    let key = mem.read(args[0].as_ptr(), args[1].as_ptr())?;
    let value = host.storage.get(&key).map_err(|e| storage_err(e.into()))?;
    let Some(value) = value else {
        return Ok(vec![WasmVal::I32(-1)]);
    };
    let out_ptr = args[2].as_ptr();
    let out_max = args[3].as_ptr() as usize;
    if out_ptr == 0 {
        return Ok(vec![WasmVal::I32(value.len() as i32)]);
    }
    if out_max < value.len() {
        return Ok(vec![WasmVal::I32(-2)]);
    }
    mem.write(out_ptr, &value)?;
    Ok(vec![WasmVal::I32(value.len() as i32)])
}

fn storage_store(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    let key = mem.read(args[0].as_ptr(), args[1].as_ptr())?;
    let value = mem.read(args[2].as_ptr(), args[3].as_ptr())?;
    host.storage
        .put(&key, &value)
        .map_err(|e| storage_err(e.into()))?;
    Ok(vec![])
}

fn storage_delete(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    let key = mem.read(args[0].as_ptr(), args[1].as_ptr())?;
    host.storage
        .delete(&key)
        .map_err(|e| storage_err(e.into()))?;
    Ok(vec![])
}

fn get_caller(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    mem.write(args[0].as_ptr(), &host.env.current_call.sender)?;
    Ok(vec![])
}

fn get_origin(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    mem.write(args[0].as_ptr(), &host.env.current_call.origin)?;
    Ok(vec![])
}

fn get_address(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    mem.write(args[0].as_ptr(), &host.env.contract.address)?;
    Ok(vec![])
}

/// Writes the call's funds as a 32-byte big-endian word.
fn get_funds(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    let word = memory::pad_left_32(&host.env.current_call.funds.to_be_bytes());
    mem.write(args[0].as_ptr(), &word)?;
    Ok(vec![])
}

fn block_height(
    host: &mut HostCtx,
    _mem: &mut SliceMemory<'_>,
    _args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    Ok(vec![WasmVal::I64(host.env.block.height as i64)])
}

fn block_timestamp(
    host: &mut HostCtx,
    _mem: &mut SliceMemory<'_>,
    _args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    Ok(vec![WasmVal::I64(host.env.block.timestamp as i64)])
}

fn chain_id(
    host: &mut HostCtx,
    _mem: &mut SliceMemory<'_>,
    _args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    Ok(vec![WasmVal::I64(host.env.chain.chain_id as i64)])
}

fn bytecode_length(
    host: &mut HostCtx,
    _mem: &mut SliceMemory<'_>,
    _args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    Ok(vec![WasmVal::I32(host.env.contract.bytecode.len() as i32)])
}

fn bytecode_copy(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    let dst = args[0].as_ptr();
    let offset = args[1].as_ptr() as usize;
    let len = args[2].as_ptr() as usize;
    if len > mem.size() {
        return Err(ForgeError::OutOfBounds {
            offset: dst as u64,
            len: len as u64,
            size: mem.size() as u64,
        });
    }
    let mut chunk = vec![0u8; len];
    let bytecode = &host.env.contract.bytecode;
    if offset < bytecode.len() {
        let available = (bytecode.len() - offset).min(len);
        chunk[..available].copy_from_slice(&bytecode[offset..offset + available]);
    }
    mem.write(dst, &chunk)?;
    Ok(vec![])
}

/// Sets the success payload and halts execution.
fn finish(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    host.finish_data = mem.read(args[0].as_ptr(), args[1].as_ptr())?;
    Err(ForgeError::Halted)
}

/// Aborts the call, propagating the payload as the error value.
fn revert(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    let data = mem.read(args[0].as_ptr(), args[1].as_ptr())?;
    host.finish_data.clear();
    Err(ForgeError::Reverted { data })
}

fn emit_attribute(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    let key = read_utf8(mem, args[0].as_ptr(), args[1].as_ptr())?;
    let value = read_utf8(mem, args[2].as_ptr(), args[3].as_ptr())?;
    host.attributes.push(EventAttribute::new(key, value));
    Ok(vec![])
}

/// `emit_event(type_ptr, type_len, attrs_ptr, attrs_len)` where the
/// attributes are a JSON array of `[key, value]` pairs.
fn emit_event(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    let ty = read_utf8(mem, args[0].as_ptr(), args[1].as_ptr())?;
    let raw = mem.read(args[2].as_ptr(), args[3].as_ptr())?;
    let pairs: Vec<(String, String)> =
        serde_json::from_slice(&raw).map_err(|e| host_err(format!("invalid attributes: {e}")))?;
    host.events.push(Event {
        ty,
        attributes: pairs
            .into_iter()
            .map(|(k, v)| EventAttribute::new(k, v))
            .collect(),
    });
    Ok(vec![])
}

/// EVM-style `log(data, topics)`: `topic_count` 32-byte words at
/// `topics_ptr`.
fn emit_log(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    let data = mem.read(args[0].as_ptr(), args[1].as_ptr())?;
    let topics_ptr = args[2].as_ptr();
    let topic_count = args[3].as_ptr();
    if topic_count > 4 {
        return Err(host_err("at most 4 log topics"));
    }
    let mut event = Event::new("log").attr("data", hex::encode(&data));
    for i in 0..topic_count {
        let topic = mem.read(topics_ptr + i * 32, 32)?;
        event = event.attr(format!("topic{i}"), hex::encode(topic));
    }
    host.events.push(event);
    Ok(vec![])
}

/// Queue a sub-message (JSON-encoded `SubMsg`) for dispatch after this call
/// returns.
fn submit_msg(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    let raw = mem.read(args[0].as_ptr(), args[1].as_ptr())?;
    let msg: SubMsg =
        serde_json::from_slice(&raw).map_err(|e| host_err(format!("invalid sub-message: {e}")))?;
    host.sub_messages.push(msg);
    Ok(vec![])
}

/// Synchronous cross-contract call:
/// `call(gas_limit, addr_ptr, value_ptr, calldata_ptr, calldata_len) -> i32`.
///
/// The value is a 32-byte big-endian word of the native denomination.
/// Returns 1 on success, 0 on failure; return data is fetched through
/// `returndata_*`. A parent-level gas exhaustion propagates as the fatal
/// out-of-gas signal instead of a 0 result.
fn call(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    let gas_limit = args[0].as_i64();
    let target = read_address(mem, args[1].as_ptr())?;
    let value_word = mem.read(args[2].as_ptr(), 32)?;
    let amount_bytes: [u8; 16] = value_word[16..32].try_into().unwrap_or([0u8; 16]);
    let amount = u128::from_be_bytes(amount_bytes);
    let calldata = mem.read(args[3].as_ptr(), args[4].as_ptr())?;

    let caller = host.env.contract.address;
    let funds = if amount == 0 {
        vec![]
    } else {
        vec![Coin::new(amount, host.kiln.denom())]
    };
    let gas_cap = if gas_limit > 0 {
        Some(gas_limit as u64)
    } else {
        None
    };

    let result = host.kiln.call_from_contract(
        &host.ctx,
        caller,
        target,
        &calldata,
        funds,
        gas_cap,
        host.read_only,
    );
    match result {
        Ok(data) => {
            host.return_data = data;
            Ok(vec![WasmVal::I32(1)])
        }
        Err(err) => {
            if host.ctx.is_out_of_gas() {
                return Err(ForgeError::OutOfGas);
            }
            tracing::debug!(error = %err, "cross-contract call failed");
            host.return_data.clear();
            Ok(vec![WasmVal::I32(0)])
        }
    }
}

fn returndata_length(
    host: &mut HostCtx,
    _mem: &mut SliceMemory<'_>,
    _args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    Ok(vec![WasmVal::I32(host.return_data.len() as i32)])
}

fn returndata_copy(
    host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    let dst = args[0].as_ptr();
    let offset = args[1].as_ptr() as usize;
    let len = args[2].as_ptr() as usize;
    if len > mem.size() {
        return Err(ForgeError::OutOfBounds {
            offset: dst as u64,
            len: len as u64,
            size: mem.size() as u64,
        });
    }
    let mut chunk = vec![0u8; len];
    if offset < host.return_data.len() {
        let available = (host.return_data.len() - offset).min(len);
        chunk[..available].copy_from_slice(&host.return_data[offset..offset + available]);
    }
    mem.write(dst, &chunk)?;
    Ok(vec![])
}

// ─── sys_env_1 (non-deterministic, debug queries only) ──────────────────────

fn debug_log(
    _host: &mut HostCtx,
    mem: &mut SliceMemory<'_>,
    args: &[WasmVal],
) -> Result<Vec<WasmVal>, ForgeError> {
    let msg = read_utf8(mem, args[0].as_ptr(), args[1].as_ptr())?;
    tracing::debug!(target: "contract", "{msg}");
    Ok(vec![])
}

use ValKind::{I32, I64};

/// The default host interface table.
pub fn ember_env_module() -> HostModule<HostCtx> {
    HostModule {
        name: ENV_MODULE,
        functions: vec![
            HostFnDesc {
                name: "calldata_length",
                params: &[],
                results: &[I32],
                gas: HOST_GAS_BASE,
                call: calldata_length,
            },
            HostFnDesc {
                name: "calldata_copy",
                params: &[I32, I32, I32],
                results: &[],
                gas: HOST_GAS_BASE,
                call: calldata_copy,
            },
            HostFnDesc {
                name: "storage_load",
                params: &[I32, I32, I32, I32],
                results: &[I32],
                gas: HOST_GAS_STORAGE_LOAD,
                call: storage_load,
            },
            HostFnDesc {
                name: "storage_store",
                params: &[I32, I32, I32, I32],
                results: &[],
                gas: HOST_GAS_STORAGE_STORE,
                call: storage_store,
            },
            HostFnDesc {
                name: "storage_delete",
                params: &[I32, I32],
                results: &[],
                gas: HOST_GAS_STORAGE_STORE,
                call: storage_delete,
            },
            HostFnDesc {
                name: "get_caller",
                params: &[I32],
                results: &[],
                gas: HOST_GAS_BASE,
                call: get_caller,
            },
            HostFnDesc {
                name: "get_origin",
                params: &[I32],
                results: &[],
                gas: HOST_GAS_BASE,
                call: get_origin,
            },
            HostFnDesc {
                name: "get_address",
                params: &[I32],
                results: &[],
                gas: HOST_GAS_BASE,
                call: get_address,
            },
            HostFnDesc {
                name: "get_funds",
                params: &[I32],
                results: &[],
                gas: HOST_GAS_BASE,
                call: get_funds,
            },
            HostFnDesc {
                name: "block_height",
                params: &[],
                results: &[I64],
                gas: HOST_GAS_BASE,
                call: block_height,
            },
            HostFnDesc {
                name: "block_timestamp",
                params: &[],
                results: &[I64],
                gas: HOST_GAS_BASE,
                call: block_timestamp,
            },
            HostFnDesc {
                name: "chain_id",
                params: &[],
                results: &[I64],
                gas: HOST_GAS_BASE,
                call: chain_id,
            },
            HostFnDesc {
                name: "bytecode_length",
                params: &[],
                results: &[I32],
                gas: HOST_GAS_BASE,
                call: bytecode_length,
            },
            HostFnDesc {
                name: "bytecode_copy",
                params: &[I32, I32, I32],
                results: &[],
                gas: HOST_GAS_BASE,
                call: bytecode_copy,
            },
            HostFnDesc {
                name: "finish",
                params: &[I32, I32],
                results: &[],
                gas: HOST_GAS_BASE,
                call: finish,
            },
            HostFnDesc {
                name: "revert",
                params: &[I32, I32],
                results: &[],
                gas: HOST_GAS_BASE,
                call: revert,
            },
            HostFnDesc {
                name: "emit_attribute",
                params: &[I32, I32, I32, I32],
                results: &[],
                gas: HOST_GAS_EMIT,
                call: emit_attribute,
            },
            HostFnDesc {
                name: "emit_event",
                params: &[I32, I32, I32, I32],
                results: &[],
                gas: HOST_GAS_EMIT,
                call: emit_event,
            },
            HostFnDesc {
                name: "emit_log",
                params: &[I32, I32, I32, I32],
                results: &[],
                gas: HOST_GAS_EMIT,
                call: emit_log,
            },
            HostFnDesc {
                name: "submit_msg",
                params: &[I32, I32],
                results: &[],
                gas: HOST_GAS_EMIT,
                call: submit_msg,
            },
            HostFnDesc {
                name: "call",
                params: &[I64, I32, I32, I32, I32],
                results: &[I32],
                gas: HOST_GAS_CALL,
                call: call,
            },
            HostFnDesc {
                name: "returndata_length",
                params: &[],
                results: &[I32],
                gas: HOST_GAS_BASE,
                call: returndata_length,
            },
            HostFnDesc {
                name: "returndata_copy",
                params: &[I32, I32, I32],
                results: &[],
                gas: HOST_GAS_BASE,
                call: returndata_copy,
            },
        ],
    }
}

/// The restricted system interface table.
pub fn sys_env_module() -> HostModule<HostCtx> {
    HostModule {
        name: SYS_MODULE,
        functions: vec![HostFnDesc {
            name: "debug_log",
            params: &[I32, I32],
            results: &[],
            gas: HOST_GAS_BASE,
            call: debug_log,
        }],
    }
}

/// All host modules registered into every instance. Authorization for the
/// restricted interface happens at create/dispatch time through capability
/// checks, not at link time.
pub fn host_modules() -> Vec<HostModule<HostCtx>> {
    vec![ember_env_module(), sys_env_module()]
}
