//! The interpreter backend: wasmi.
//!
//! Trades throughput for zero warm-up cost, which suits cold, rarely called
//! contracts. It has no compiled artifact form; pinned code is re-read from
//! raw bytes.

use wasmi::core::{TrapCode, ValType};
use wasmi::{
    Caller, Config, Engine, Instance, Linker, Module, Store, StoreLimits, StoreLimitsBuilder, Val,
};

use crate::backend::{InstanceOptions, ModuleCode, RuntimeBackend, VmInstance};
use crate::error::ForgeError;
use crate::host::{HostModule, HostState};
use crate::memory::SliceMemory;
use crate::value::{ValKind, WasmVal};

/// The wasmi execution backend.
pub struct WasmiBackend {
    engine: Engine,
}

/// Store data: the caller's host state plus the memory limiter.
struct Shell<T> {
    host: T,
    limits: StoreLimits,
}

struct WasmiInstance<T> {
    store: Store<Shell<T>>,
    instance: Instance,
    fuel_granted: u64,
}

impl WasmiBackend {
    /// Create a new backend with fuel metering enabled.
    pub fn new() -> Result<Self, ForgeError> {
        let mut config = Config::default();
        config.consume_fuel(true);
        let engine = Engine::new(&config);
        Ok(Self { engine })
    }
}

fn val_type(kind: &ValKind) -> ValType {
    match kind {
        ValKind::I32 => ValType::I32,
        ValKind::I64 => ValType::I64,
    }
}

fn from_val(val: &Val) -> Result<WasmVal, wasmi::Error> {
    match val {
        Val::I32(v) => Ok(WasmVal::I32(*v)),
        Val::I64(v) => Ok(WasmVal::I64(*v)),
        other => Err(wasmi::Error::new(format!(
            "unsupported value type: {other:?}"
        ))),
    }
}

fn to_val(val: &WasmVal) -> Val {
    match val {
        WasmVal::I32(v) => Val::I32(*v),
        WasmVal::I64(v) => Val::I64(*v),
    }
}

/// Register every descriptor of every host module into the linker.
///
/// Mirrors the wasmtime shim; the table itself is backend-neutral.
fn register_host_modules<T: HostState>(
    linker: &mut Linker<Shell<T>>,
    modules: &[HostModule<T>],
) -> Result<(), ForgeError> {
    for module in modules {
        for desc in &module.functions {
            let desc = *desc;
            let ty = wasmi::FuncType::new(
                desc.params.iter().map(val_type),
                desc.results.iter().map(val_type),
            );
            linker
                .func_new(
                    module.name,
                    desc.name,
                    ty,
                    move |mut caller: Caller<'_, Shell<T>>,
                          params: &[Val],
                          results: &mut [Val]|
                          -> Result<(), wasmi::Error> {
                        let memory = caller
                            .get_export("memory")
                            .and_then(|e| e.into_memory())
                            .ok_or_else(|| wasmi::Error::new("missing memory export"))?;
                        let (data, shell) = memory.data_and_store_mut(&mut caller);
                        let mut mem = SliceMemory::new(data);
                        let args = params
                            .iter()
                            .map(from_val)
                            .collect::<Result<Vec<_>, _>>()?;
                        if let Err(err) = shell.host.charge(desc.gas) {
                            shell.host.set_failure(err);
                            return Err(wasmi::Error::new("host gas exhausted"));
                        }
                        match (desc.call)(&mut shell.host, &mut mem, &args) {
                            Ok(rets) => {
                                for (slot, ret) in results.iter_mut().zip(rets.iter()) {
                                    *slot = to_val(ret);
                                }
                                Ok(())
                            }
                            Err(err) => {
                                let reason = err.to_string();
                                shell.host.set_failure(err);
                                Err(wasmi::Error::new(reason))
                            }
                        }
                    },
                )
                .map_err(|e| ForgeError::Instantiate {
                    reason: format!("failed to register {}::{}: {e}", module.name, desc.name),
                })?;
        }
    }
    Ok(())
}

impl<T: HostState> RuntimeBackend<T> for WasmiBackend {
    fn name(&self) -> &'static str {
        "wasmi"
    }

    fn validate(&self, bytecode: &[u8]) -> Result<(), ForgeError> {
        Module::validate(&self.engine, bytecode).map_err(|e| ForgeError::Validate {
            reason: format!("wasm validation failed: {e}"),
        })
    }

    fn instantiate_module(
        &self,
        code: ModuleCode<'_>,
        host: T,
        modules: &[HostModule<T>],
        opts: InstanceOptions,
    ) -> Result<Box<dyn VmInstance<T>>, ForgeError> {
        let module = match code {
            ModuleCode::Raw(bytes) => {
                Module::validate(&self.engine, bytes).map_err(|e| ForgeError::Validate {
                    reason: format!("wasm validation failed: {e}"),
                })?;
                Module::new(&self.engine, bytes).map_err(|e| ForgeError::Validate {
                    reason: format!("failed to compile wasm module: {e}"),
                })?
            }
            // The interpreter's "pinned" artifact is a raw copy of the
            // bytecode; load it like any other module.
            ModuleCode::Precompiled(path) => {
                let bytes = std::fs::read(path).map_err(|e| ForgeError::Load {
                    reason: format!("failed to read pinned module: {e}"),
                })?;
                Module::new(&self.engine, &bytes).map_err(|e| ForgeError::Validate {
                    reason: format!("failed to compile wasm module: {e}"),
                })?
            }
        };

        let shell = Shell {
            host,
            limits: StoreLimitsBuilder::new()
                .memory_size(opts.memory_limit)
                .build(),
        };
        let mut store = Store::new(&self.engine, shell);
        store.limiter(|shell| &mut shell.limits);
        store.set_fuel(opts.fuel).map_err(|e| ForgeError::Runtime {
            reason: format!("failed to set fuel: {e}"),
        })?;

        let mut linker: Linker<Shell<T>> = Linker::new(&self.engine);
        register_host_modules(&mut linker, modules)?;

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| ForgeError::Instantiate {
                reason: format!("failed to instantiate module: {e}"),
            })?
            .start(&mut store)
            .map_err(|e| ForgeError::Instantiate {
                reason: format!("failed to start module: {e}"),
            })?;
        tracing::trace!(fuel = opts.fuel, "instantiated module on wasmi");

        Ok(Box::new(WasmiInstance {
            store,
            instance,
            fuel_granted: opts.fuel,
        }))
    }

    fn precompile(&self, _bytecode: &[u8]) -> Result<Vec<u8>, ForgeError> {
        Err(ForgeError::Unsupported {
            reason: "the interpreter backend has no ahead-of-time artifact form".to_string(),
        })
    }
}

impl<T: HostState> WasmiInstance<T> {
    fn map_call_error(&mut self, err: wasmi::Error) -> ForgeError {
        if let Some(failure) = self.store.data_mut().host.take_failure() {
            return failure;
        }
        if err.as_trap_code() == Some(TrapCode::OutOfFuel) {
            return ForgeError::OutOfGas;
        }
        ForgeError::Runtime {
            reason: format!("call failed: {err}"),
        }
    }
}

impl<T: HostState> VmInstance<T> for WasmiInstance<T> {
    fn call(&mut self, function: &str, args: &[WasmVal]) -> Result<Vec<WasmVal>, ForgeError> {
        let func = self
            .instance
            .get_func(&self.store, function)
            .ok_or_else(|| ForgeError::FunctionNotFound {
                name: function.to_string(),
            })?;
        let n_results = func.ty(&self.store).results().len();
        let params: Vec<Val> = args.iter().map(to_val).collect();
        let mut results = vec![Val::I32(0); n_results];
        if let Err(err) = func.call(&mut self.store, &params, &mut results) {
            return Err(self.map_call_error(err));
        }
        results
            .iter()
            .map(|v| {
                from_val(v).map_err(|e| ForgeError::Runtime {
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    fn has_export(&mut self, function: &str) -> bool {
        self.instance.get_func(&self.store, function).is_some()
    }

    fn memory(&mut self) -> Result<SliceMemory<'_>, ForgeError> {
        let memory = self
            .instance
            .get_export(&self.store, "memory")
            .and_then(|e| e.into_memory())
            .ok_or_else(|| ForgeError::Runtime {
                reason: "missing memory export".to_string(),
            })?;
        Ok(SliceMemory::new(memory.data_mut(&mut self.store)))
    }

    fn fuel_used(&mut self) -> u64 {
        self.fuel_granted
            .saturating_sub(self.store.get_fuel().unwrap_or(0))
    }

    fn host(&mut self) -> &mut T {
        &mut self.store.data_mut().host
    }

    fn into_host(self: Box<Self>) -> T {
        self.store.into_data().host
    }
}
