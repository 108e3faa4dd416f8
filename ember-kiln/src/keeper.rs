//! The contract lifecycle keeper: store code, instantiate, execute, query,
//! reply, pin/unpin. Owns address derivation, funds-transfer ordering and
//! event emission; everything else is delegated to the engine, the registry
//! system contract and the resolver.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use ember_crypto::address::{build_contract_address_classic, build_contract_address_salted};
use ember_crypto::hash::{checksum, checksum_hex};
use ember_forge::RuntimeBackend;
use ember_storage::PrefixedStore;
use ember_types::capability::Capability;
use ember_types::coin::{coins_amount_of, coins_are_zero, Coins};
use ember_types::contract::{CodeInfo, CodeMetadata, ContractInfo, ContractStorageType};
use ember_types::env::MessageInfo;
use ember_types::primitives::{
    address_display, Address, Checksum, CodeId, Gas, MAX_INTERPRETED_SIZE, MAX_WASM_SIZE,
};
use ember_types::response::{Event, Reply};
use ember_types::system::{
    self, ATTR_KEY_CHECKSUM, ATTR_KEY_CODE_ID, ATTR_KEY_CONTRACT_ADDR,
    ATTR_KEY_REQUIRED_CAPABILITY, ENTRY_POINT_EXECUTE, ENTRY_POINT_INSTANTIATE, ENTRY_POINT_QUERY,
    ENTRY_POINT_REPLY, EVENT_TYPE_EXECUTE, EVENT_TYPE_INSTANTIATE, EVENT_TYPE_PIN_CODE,
    EVENT_TYPE_REPLY, EVENT_TYPE_STORE_CODE, EVENT_TYPE_UNPIN_CODE,
};

use crate::accounts;
use crate::bank;
use crate::compress::{gunzip, is_gzip};
use crate::context::{contract_store_prefix, TxContext};
use crate::error::KilnError;
use crate::gas::GasRegister;
use crate::host::HostCtx;
use crate::registry::{
    CodeInfoResponse, CodeRegistry, ContractInfoResponse, LastCodeIdResponse, RegistryExecuteMsg,
    RegistryQueryMsg,
};
use crate::resolver::require_not_system_contract;
use crate::roles::{RoleRegistry, RolesExecuteMsg};

const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];

/// Native system contracts get code ids far outside the registry-allocated
/// range so user code ids start at 1.
const BOOTSTRAP_CODE_ID_BASE: CodeId = 1 << 62;
pub const REGISTRY_CODE_ID: CodeId = BOOTSTRAP_CODE_ID_BASE + 1;
pub const ROLES_CODE_ID: CodeId = BOOTSTRAP_CODE_ID_BASE + 2;

fn is_wasm(code: &[u8]) -> bool {
    code.len() >= 4 && code[..4] == WASM_MAGIC
}

/// Engine configuration, constructed once at startup.
#[derive(Debug, Clone)]
pub struct KilnConfig {
    pub home: PathBuf,
    pub denom: String,
    pub chain_id: u64,
    pub memory_limit: usize,
    /// Optional shared compiled-artifact cache consulted before AOT
    /// compiling on pin.
    pub shared_aot_cache: Option<PathBuf>,
}

impl KilnConfig {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            denom: "ember".to_string(),
            chain_id: 7000,
            memory_limit: ember_forge::backend::DEFAULT_MEMORY_LIMIT,
            shared_aot_cache: None,
        }
    }
}

/// Startup-time cache of the registry contracts' own metadata, so the
/// registry can describe itself without querying itself.
pub struct Bootstrap {
    pub registry_address: Address,
    pub registry_code_info: CodeInfo,
    pub registry_contract_info: ContractInfo,
    pub roles_address: Address,
    pub roles_code_info: CodeInfo,
    pub roles_contract_info: ContractInfo,
}

impl Bootstrap {
    fn new() -> Self {
        let core_dep = vec![Capability::HostInterface(
            system::EMBER_ENV_CORE_1.to_string(),
        )];
        let registry_code_info = CodeInfo::new(
            checksum(b"ember/native/code-registry"),
            [0u8; 20],
            core_dep.clone(),
            CodeMetadata::default(),
            false,
            true,
        );
        let roles_code_info = CodeInfo::new(
            checksum(b"ember/native/roles"),
            [0u8; 20],
            core_dep,
            CodeMetadata::default(),
            false,
            true,
        );
        Self {
            registry_address: system::ADDR_CODE_REGISTRY,
            registry_contract_info: ContractInfo::new(
                REGISTRY_CODE_ID,
                [0u8; 20],
                None,
                Vec::new(),
                system::ROLE_STORAGE_CONTRACTS.to_string(),
            ),
            registry_code_info,
            roles_address: system::ADDR_ROLES,
            roles_contract_info: ContractInfo::new(
                ROLES_CODE_ID,
                [0u8; 20],
                None,
                Vec::new(),
                system::ROLE_ROLES.to_string(),
            ),
            roles_code_info,
        }
    }
}

/// The keeper. Cheap to clone; all state is shared behind `Arc`s, and every
/// call threads its own `TxContext`.
#[derive(Clone)]
pub struct Kiln {
    pub(crate) vm: Arc<dyn RuntimeBackend<HostCtx>>,
    pub code_store: crate::store::CodeStore,
    pub gas: GasRegister,
    pub(crate) bootstrap: Arc<Bootstrap>,
    pub(crate) config: Arc<KilnConfig>,
}

impl Kiln {
    pub fn new(
        vm: Arc<dyn RuntimeBackend<HostCtx>>,
        config: KilnConfig,
        gas: GasRegister,
    ) -> Result<Self, KilnError> {
        let code_store = crate::store::CodeStore::new(&config.home)?;
        Ok(Self {
            vm,
            code_store,
            gas,
            bootstrap: Arc::new(Bootstrap::new()),
            config: Arc::new(config),
        })
    }

    pub fn denom(&self) -> &str {
        &self.config.denom
    }

    pub fn backend_name(&self) -> &'static str {
        self.vm.name()
    }

    /// Seed the role registry with the built-in system roles. Run once
    /// against the genesis context.
    pub fn init_genesis(&self, ctx: &TxContext) -> Result<(), KilnError> {
        for (label, address) in [
            (system::ROLE_STORAGE_CONTRACTS, self.bootstrap.registry_address),
            (system::ROLE_ROLES, self.bootstrap.roles_address),
        ] {
            let msg = serde_json::to_vec(&RolesExecuteMsg::SetRole {
                label: label.to_string(),
                address,
            })
            .map_err(|e| KilnError::Serialization(e.to_string()))?;
            self.internal_execute(ctx, &self.bootstrap.roles_address, &msg)?;
        }
        info!(backend = self.vm.name(), "kiln initialized");
        Ok(())
    }

    // ─── Registry plumbing ──────────────────────────────────────────────

    fn native_store(&self, ctx: &TxContext, addr: &Address) -> PrefixedStore {
        ctx.contract_store(ContractStorageType::CoreConsensus, contract_store_prefix(addr))
    }

    /// Execute a message against a system contract through the one audited
    /// dispatch path.
    pub(crate) fn internal_execute(
        &self,
        ctx: &TxContext,
        addr: &Address,
        msg: &[u8],
    ) -> Result<Vec<u8>, KilnError> {
        if *addr == self.bootstrap.registry_address {
            CodeRegistry::execute(&self.native_store(ctx, addr), msg)
        } else if *addr == self.bootstrap.roles_address {
            RoleRegistry::execute(&self.native_store(ctx, addr), msg)
        } else {
            Err(KilnError::NotFound(format!(
                "system contract {}",
                address_display(addr)
            )))
        }
    }

    pub(crate) fn internal_query(
        &self,
        ctx: &TxContext,
        addr: &Address,
        msg: &[u8],
    ) -> Result<Vec<u8>, KilnError> {
        if *addr == self.bootstrap.registry_address {
            CodeRegistry::query(&self.native_store(ctx, addr), msg)
        } else if *addr == self.bootstrap.roles_address {
            RoleRegistry::query(&self.native_store(ctx, addr), msg)
        } else {
            Err(KilnError::NotFound(format!(
                "system contract {}",
                address_display(addr)
            )))
        }
    }

    fn registry_execute(&self, ctx: &TxContext, msg: &RegistryExecuteMsg) -> Result<Vec<u8>, KilnError> {
        let raw = serde_json::to_vec(msg).map_err(|e| KilnError::Serialization(e.to_string()))?;
        self.internal_execute(ctx, &self.bootstrap.registry_address, &raw)
    }

    fn registry_query(&self, ctx: &TxContext, msg: &RegistryQueryMsg) -> Result<Vec<u8>, KilnError> {
        let raw = serde_json::to_vec(msg).map_err(|e| KilnError::Serialization(e.to_string()))?;
        self.internal_query(ctx, &self.bootstrap.registry_address, &raw)
    }

    pub fn get_last_code_id(&self, ctx: &TxContext) -> Result<CodeId, KilnError> {
        let raw = self.registry_query(ctx, &RegistryQueryMsg::GetLastCodeId {})?;
        let parsed: LastCodeIdResponse =
            serde_json::from_slice(&raw).map_err(|e| KilnError::Serialization(e.to_string()))?;
        Ok(parsed.code_id)
    }

    pub fn next_code_id(&self, ctx: &TxContext) -> Result<CodeId, KilnError> {
        Ok(self.get_last_code_id(ctx)? + 1)
    }

    pub fn get_code_info(
        &self,
        ctx: &TxContext,
        code_id: CodeId,
    ) -> Result<Option<CodeInfo>, KilnError> {
        if code_id == REGISTRY_CODE_ID {
            return Ok(Some(self.bootstrap.registry_code_info.clone()));
        }
        if code_id == ROLES_CODE_ID {
            return Ok(Some(self.bootstrap.roles_code_info.clone()));
        }
        let raw = self.registry_query(ctx, &RegistryQueryMsg::GetCodeInfo { code_id })?;
        let parsed: CodeInfoResponse =
            serde_json::from_slice(&raw).map_err(|e| KilnError::Serialization(e.to_string()))?;
        Ok(parsed.code_info)
    }

    pub(crate) fn store_new_code_info(
        &self,
        ctx: &TxContext,
        code_info: CodeInfo,
    ) -> Result<CodeId, KilnError> {
        let raw = self.registry_execute(ctx, &RegistryExecuteMsg::NewCodeInfo { code_info })?;
        let parsed: LastCodeIdResponse =
            serde_json::from_slice(&raw).map_err(|e| KilnError::Serialization(e.to_string()))?;
        Ok(parsed.code_id)
    }

    pub(crate) fn store_code_info(
        &self,
        ctx: &TxContext,
        code_id: CodeId,
        code_info: CodeInfo,
    ) -> Result<(), KilnError> {
        self.registry_execute(ctx, &RegistryExecuteMsg::SetCodeInfo { code_id, code_info })?;
        Ok(())
    }

    pub fn get_contract_info(
        &self,
        ctx: &TxContext,
        addr: &Address,
    ) -> Result<Option<ContractInfo>, KilnError> {
        if *addr == self.bootstrap.registry_address {
            return Ok(Some(self.bootstrap.registry_contract_info.clone()));
        }
        if *addr == self.bootstrap.roles_address {
            return Ok(Some(self.bootstrap.roles_contract_info.clone()));
        }
        let raw = self.registry_query(ctx, &RegistryQueryMsg::GetContractInfo { address: *addr })?;
        let parsed: ContractInfoResponse =
            serde_json::from_slice(&raw).map_err(|e| KilnError::Serialization(e.to_string()))?;
        Ok(parsed.contract_info)
    }

    pub fn has_contract_info(&self, ctx: &TxContext, addr: &Address) -> Result<bool, KilnError> {
        Ok(self.get_contract_info(ctx, addr)?.is_some())
    }

    pub(crate) fn store_contract_info(
        &self,
        ctx: &TxContext,
        addr: &Address,
        contract_info: ContractInfo,
    ) -> Result<(), KilnError> {
        self.registry_execute(
            ctx,
            &RegistryExecuteMsg::SetContractInfo {
                address: *addr,
                contract_info,
            },
        )?;
        Ok(())
    }

    /// Both descriptors for a contract address, or `None` for a bare
    /// externally-owned account.
    pub fn contract_instance(
        &self,
        ctx: &TxContext,
        addr: &Address,
    ) -> Result<Option<(ContractInfo, CodeInfo)>, KilnError> {
        let Some(contract_info) = self.get_contract_info(ctx, addr)? else {
            return Ok(None);
        };
        let code_info = self
            .get_code_info(ctx, contract_info.code_id)?
            .ok_or_else(|| KilnError::NotFound(format!("code {}", contract_info.code_id)))?;
        Ok(Some((contract_info, code_info)))
    }

    /// The stored bytecode (or interpreted source/bytecode) for a code id.
    pub fn get_bytecode(&self, ctx: &TxContext, code_id: CodeId) -> Result<Vec<u8>, KilnError> {
        let code_info = self
            .get_code_info(ctx, code_id)?
            .ok_or_else(|| KilnError::NotFound(format!("code {code_id}")))?;
        self.code_store.get(&code_info)
    }

    pub fn iterate_code_infos(
        &self,
        ctx: &TxContext,
        cb: impl FnMut(CodeId, CodeInfo) -> bool,
    ) -> Result<(), KilnError> {
        CodeRegistry::iterate_code_infos(&self.native_store(ctx, &self.bootstrap.registry_address), cb)
    }

    pub fn iterate_contract_infos(
        &self,
        ctx: &TxContext,
        cb: impl FnMut(Address, ContractInfo) -> bool,
    ) -> Result<(), KilnError> {
        CodeRegistry::iterate_contract_infos(
            &self.native_store(ctx, &self.bootstrap.registry_address),
            cb,
        )
    }

    pub fn is_pinned_code(&self, ctx: &TxContext, code_id: CodeId) -> Result<bool, KilnError> {
        Ok(self
            .get_code_info(ctx, code_id)?
            .map(|info| info.pinned && self.code_store.has_pinned_artifact(&info.code_hash))
            .unwrap_or(false))
    }

    // ─── Create ─────────────────────────────────────────────────────────

    /// Store new code, returning its id and checksum.
    ///
    /// Gzip-framed uploads are decompressed under metering; capability tags
    /// select the native-vs-interpreted creation path.
    pub fn create(
        &self,
        ctx: &TxContext,
        creator: &Address,
        code: Vec<u8>,
        deps: &[String],
        metadata: CodeMetadata,
        pinned: bool,
        metering_off: bool,
    ) -> Result<(CodeId, Checksum), KilnError> {
        let caps =
            Capability::parse_all(deps).map_err(|e| KilnError::CreateFailed(e.to_string()))?;
        let code = self.maybe_uncompress(ctx, code, &caps)?;
        let code_info =
            self.create_code_info(ctx, creator, &code, caps, metadata, pinned, metering_off)?;
        let code_hash = code_info.code_hash;
        let deps_display: Vec<String> = code_info.deps.iter().map(ToString::to_string).collect();
        let code_id = self.store_new_code_info(ctx, code_info)?;

        debug!(
            code_id,
            checksum = %checksum_hex(&code_hash),
            deps = ?deps_display,
            "storing new contract"
        );
        ctx.emit_event(store_code_event(code_id, &code_hash, &deps_display));

        Ok((code_id, code_hash))
    }

    fn maybe_uncompress(
        &self,
        ctx: &TxContext,
        code: Vec<u8>,
        caps: &[Capability],
    ) -> Result<Vec<u8>, KilnError> {
        if !is_gzip(&code) {
            return Ok(code);
        }
        ctx.consume_gas(self.gas.uncompress_costs(code.len()), "uncompress gzip bytecode")?;
        let max_size = if caps.iter().any(|c| c.as_interpreter().is_some()) {
            MAX_INTERPRETED_SIZE
        } else {
            MAX_WASM_SIZE
        };
        gunzip(&code, max_size)
    }

    fn create_code_info(
        &self,
        ctx: &TxContext,
        creator: &Address,
        code: &[u8],
        caps: Vec<Capability>,
        metadata: CodeMetadata,
        pinned: bool,
        metering_off: bool,
    ) -> Result<CodeInfo, KilnError> {
        let utf8_dialect = ember_types::capability::utf8_dialect(&caps);
        let bytecode_dialect = ember_types::capability::interpreter_dialect(&caps)
            .filter(|d| !d.is_utf8_source());

        let code_hash = if is_wasm(code) {
            ctx.consume_gas(self.gas.compile_costs(code.len()), "compiling wasm bytecode")?;
            self.vm
                .validate(code)
                .map_err(|e| KilnError::CreateFailed(e.to_string()))?;
            self.code_store.put(code)?
        } else if let Some(dialect) = utf8_dialect {
            let extension = dialect.source_extension().ok_or_else(|| {
                KilnError::CreateFailed("dialect has no source form".to_string())
            })?;
            self.code_store.put_source(code, extension)?
        } else if bytecode_dialect.is_some() {
            checksum(code)
        } else {
            return Err(KilnError::CreateFailed(
                "this is not wasm code, use create_interpreted".to_string(),
            ));
        };

        let mut info = CodeInfo::new(code_hash, *creator, caps, metadata, pinned, metering_off);
        if bytecode_dialect.is_some() && !is_wasm(code) {
            info.interpreted_bytecode_deployment = code.to_vec();
            info.interpreted_bytecode_runtime = code.to_vec();
        }
        if pinned && is_wasm(code) {
            self.code_store.pin(
                &code_hash,
                self.vm.as_ref(),
                self.config.shared_aot_cache.as_deref(),
            )?;
        }
        Ok(info)
    }

    /// Store and immediately deploy interpreted deployment bytecode: the
    /// constructor runs once and its output becomes the runtime bytecode,
    /// captured in CodeInfo next to the deployment bytecode.
    #[allow(clippy::too_many_arguments)]
    pub fn create_interpreted(
        &self,
        ctx: &TxContext,
        creator: &Address,
        provenance: Option<Address>,
        code: Vec<u8>,
        deps: &[String],
        metadata: CodeMetadata,
        init_msg: Vec<u8>,
        funds: Coins,
        label: String,
        salt: &[u8],
    ) -> Result<(CodeId, Checksum, Address), KilnError> {
        if is_wasm(&code) {
            return Err(KilnError::CreateFailed(
                "this is wasm code, use create".to_string(),
            ));
        }
        let caps =
            Capability::parse_all(deps).map_err(|e| KilnError::CreateFailed(e.to_string()))?;
        let code_hash = checksum(&code);
        let code_id = self.next_code_id(ctx)?;

        let mut code_info = CodeInfo::new(
            code_hash,
            *creator,
            caps,
            metadata,
            false,
            false,
        );
        code_info.interpreted_bytecode_deployment = code;

        let address_parent = provenance.unwrap_or(*creator);
        let contract_address = if salt.is_empty() {
            self.classic_address(ctx, &address_parent)?
        } else {
            build_contract_address_salted(&address_parent, salt, &code_hash)
        };

        let (_, runtime_code) = self
            .instantiate_internal(
                ctx,
                code_id,
                creator,
                provenance,
                ContractStorageType::CoreConsensus,
                &init_msg,
                &funds,
                contract_address,
                &code_info,
                label,
            )
            .map_err(|e| match e {
                KilnError::OutOfGas { .. } => e,
                other => KilnError::CreateFailed(other.to_string()),
            })?;

        code_info.interpreted_bytecode_runtime = runtime_code.clone();
        code_info.runtime_hash = Some(checksum(&runtime_code));
        let deps_display: Vec<String> = code_info.deps.iter().map(ToString::to_string).collect();
        let new_code_id = self.store_new_code_info(ctx, code_info)?;
        if new_code_id != code_id {
            return Err(KilnError::CreateFailed("unexpected code id".to_string()));
        }

        ctx.emit_event(store_code_event(code_id, &code_hash, &deps_display));
        ctx.emit_event(Event::new(system::EVENT_TYPE_DEPLOY).attr(
            ATTR_KEY_CONTRACT_ADDR,
            address_display(&contract_address),
        ));

        Ok((code_id, code_hash, contract_address))
    }

    // ─── Instantiate ────────────────────────────────────────────────────

    /// Derive a classic contract address, incrementing and persisting the
    /// creator's sequence number as part of derivation.
    fn classic_address(&self, ctx: &TxContext, creator: &Address) -> Result<Address, KilnError> {
        let mut account = match accounts::get_account(ctx, creator)? {
            Some(account) => account,
            None => accounts::new_account(ctx, creator)?,
        };
        let nonce = account.sequence;
        account.sequence = nonce + 1;
        accounts::set_account(ctx, creator, &account)?;
        Ok(build_contract_address_classic(creator, nonce))
    }

    /// Instantiate with the classic address scheme.
    pub fn instantiate(
        &self,
        ctx: &TxContext,
        code_id: CodeId,
        creator: &Address,
        init_msg: &[u8],
        funds: &Coins,
        label: impl Into<String>,
    ) -> Result<(Address, Vec<u8>), KilnError> {
        let code_info = self
            .get_code_info(ctx, code_id)?
            .ok_or_else(|| KilnError::NotFound("code".to_string()))?;
        let contract_address = self.classic_address(ctx, creator)?;
        self.instantiate_internal(
            ctx,
            code_id,
            creator,
            None,
            ContractStorageType::CoreConsensus,
            init_msg,
            funds,
            contract_address,
            &code_info,
            label.into(),
        )
    }

    /// Instantiate with the deterministic/salted address scheme. The salt
    /// must be exactly 32 bytes; malformed input panics, it indicates a
    /// broken caller.
    #[allow(clippy::too_many_arguments)]
    pub fn instantiate2(
        &self,
        ctx: &TxContext,
        code_id: CodeId,
        creator: &Address,
        init_msg: &[u8],
        funds: &Coins,
        salt: &[u8],
        _fix_msg: bool,
        label: impl Into<String>,
    ) -> Result<(Address, Vec<u8>), KilnError> {
        let code_info = self
            .get_code_info(ctx, code_id)?
            .ok_or_else(|| KilnError::NotFound("code".to_string()))?;
        let contract_address =
            build_contract_address_salted(creator, salt, &code_info.code_hash);
        self.instantiate_internal(
            ctx,
            code_id,
            creator,
            None,
            ContractStorageType::CoreConsensus,
            init_msg,
            funds,
            contract_address,
            &code_info,
            label.into(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn instantiate_internal(
        &self,
        ctx: &TxContext,
        code_id: CodeId,
        creator: &Address,
        provenance: Option<Address>,
        storage_type: ContractStorageType,
        init_msg: &[u8],
        deposit: &Coins,
        contract_address: Address,
        code_info: &CodeInfo,
        label: String,
    ) -> Result<(Address, Vec<u8>), KilnError> {
        require_not_system_contract(&contract_address, &code_info.deps)?;

        let pinned = code_info.pinned && self.code_store.has_pinned_artifact(&code_info.code_hash);
        let instance_costs = self.gas.new_contract_instance_costs(pinned, init_msg.len());
        ctx.consume_gas(instance_costs, "loading module: instantiate")?;

        if self.has_contract_info(ctx, &contract_address)? {
            return Err(KilnError::Duplicate(
                "instance with this contract address already exists".to_string(),
            ));
        }

        // Funds move before the constructor runs so the contract can observe
        // its own balance.
        if !coins_are_zero(deposit) {
            bank::transfer_coins(ctx, creator, &contract_address, deposit)?;
        }

        let info = MessageInfo::new(
            *creator,
            *creator,
            coins_amount_of(deposit, self.denom()),
        );
        let res = self
            .engine_call(
                ctx,
                ENTRY_POINT_INSTANTIATE,
                code_id,
                code_info,
                storage_type,
                &contract_address,
                init_msg,
                info,
                false,
                false,
            )
            .map_err(|e| match e {
                KilnError::OutOfGas { .. } => e,
                other => KilnError::InstantiateFailed(other.to_string()),
            })?;

        // Persist the instance before dispatch so the contract can be called
        // back.
        let mut contract_info = ContractInfo::new(
            code_id,
            *creator,
            provenance,
            init_msg.to_vec(),
            label,
        );
        contract_info.storage_type = storage_type;
        self.store_contract_info(ctx, &contract_address, contract_info)?;

        ctx.emit_event(
            Event::new(EVENT_TYPE_INSTANTIATE)
                .attr(ATTR_KEY_CONTRACT_ADDR, address_display(&contract_address))
                .attr(ATTR_KEY_CODE_ID, code_id.to_string()),
        );
        self.handle_response_events(ctx, &contract_address, &res.attributes, &res.events)
            .map_err(|e| match e {
                KilnError::OutOfGas { .. } => e,
                other => KilnError::InstantiateFailed(other.to_string()),
            })?;

        let data = self.handle_response_messages(
            ctx,
            &contract_address,
            res.sub_messages,
            res.data,
        )?;

        // Runs after instantiation so the auth contract itself can be
        // instantiated at genesis.
        self.instantiate_new_contract_account(ctx, &contract_address)?;

        debug!(address = %address_display(&contract_address), "instantiated new contract");
        Ok((contract_address, data))
    }

    fn instantiate_new_contract_account(
        &self,
        ctx: &TxContext,
        contract_address: &Address,
    ) -> Result<(), KilnError> {
        if let Some(existing) = accounts::get_account(ctx, contract_address)? {
            if existing.is_externally_claimed() {
                return Err(KilnError::AccountExists(
                    "address is claimed by external account".to_string(),
                ));
            }
            // An empty account in the contract namespace is spam; overwrite.
            info!(
                address = %address_display(contract_address),
                "pruning existing account for contract instantiation"
            );
        }
        accounts::new_account(ctx, contract_address)?;
        Ok(())
    }

    /// Install a native-addressed system contract (interpreters, system
    /// services) at its reserved address. Genesis/setup path.
    pub fn register_system_contract(
        &self,
        ctx: &TxContext,
        address: Address,
        code: Vec<u8>,
        deps: &[String],
        label: &str,
        role: Option<&str>,
    ) -> Result<CodeId, KilnError> {
        let (code_id, _) = self.create(
            ctx,
            &[0u8; 20],
            code,
            deps,
            CodeMetadata::default(),
            false,
            false,
        )?;
        let code_info = self
            .get_code_info(ctx, code_id)?
            .ok_or_else(|| KilnError::NotFound("code".to_string()))?;
        self.instantiate_internal(
            ctx,
            code_id,
            &[0u8; 20],
            None,
            ContractStorageType::CoreConsensus,
            &[],
            &Vec::new(),
            address,
            &code_info,
            label.to_string(),
        )?;
        if let Some(role) = role {
            let msg = serde_json::to_vec(&RolesExecuteMsg::SetRole {
                label: role.to_string(),
                address,
            })
            .map_err(|e| KilnError::Serialization(e.to_string()))?;
            self.internal_execute(ctx, &self.bootstrap.roles_address, &msg)?;
        }
        Ok(code_id)
    }

    // ─── Execute ────────────────────────────────────────────────────────

    /// Execute a state-changing call.
    ///
    /// A target without ContractInfo is treated as a bare externally-owned
    /// account: a non-zero fund transfer still succeeds, a zero-fund call is
    /// a silent no-op.
    pub fn execute(
        &self,
        ctx: &TxContext,
        contract_address: &Address,
        caller: &Address,
        msg: &[u8],
        funds: &Coins,
        dependencies: &[String],
        _in_background: bool,
    ) -> Result<Vec<u8>, KilnError> {
        let Some((contract_info, code_info)) = self.contract_instance(ctx, contract_address)?
        else {
            if coins_are_zero(funds) {
                return Ok(Vec::new());
            }
            bank::transfer_coins(ctx, caller, contract_address, funds)?;
            return Ok(Vec::new());
        };

        require_not_system_contract(contract_address, &code_info.deps)?;

        let mut all_deps = code_info.deps.clone();
        all_deps.extend(
            Capability::parse_all(dependencies)
                .map_err(|e| KilnError::ExecuteFailed(e.to_string()))?,
        );
        self.contract_deps_from_code_deps(ctx, &all_deps)?;

        let pinned = self.is_pinned_code(ctx, contract_info.code_id)?;
        let execute_costs = self.gas.instantiate_contract_costs(pinned, msg.len());
        ctx.consume_gas(execute_costs, "kiln execution: execute")?;

        if !coins_are_zero(funds) {
            bank::transfer_coins(ctx, caller, contract_address, funds)?;
        }

        let info = MessageInfo::new(*caller, *caller, coins_amount_of(funds, self.denom()));
        let res = self
            .engine_call(
                ctx,
                ENTRY_POINT_EXECUTE,
                contract_info.code_id,
                &code_info,
                contract_info.storage_type,
                contract_address,
                msg,
                info,
                false,
                false,
            )
            .map_err(|e| match e {
                KilnError::OutOfGas { .. } | KilnError::ExecuteFailed(_) => e,
                other => KilnError::ExecuteFailed(other.to_string()),
            })?;

        ctx.emit_event(
            Event::new(EVENT_TYPE_EXECUTE)
                .attr(ATTR_KEY_CONTRACT_ADDR, address_display(contract_address)),
        );
        self.handle_response_events(ctx, contract_address, &res.attributes, &res.events)?;
        self.handle_response_messages(ctx, contract_address, res.sub_messages, res.data)
    }

    /// Execute with a distinct origin threaded through MessageInfo: only
    /// contracts may delegate, never bare accounts.
    pub fn execute_with_origin(
        &self,
        ctx: &TxContext,
        origin: &Address,
        contract_address: &Address,
        caller: &Address,
        msg: &[u8],
        funds: &Coins,
    ) -> Result<Vec<u8>, KilnError> {
        if self.contract_instance(ctx, caller)?.is_none() {
            return Err(KilnError::ExecuteFailed(
                "cannot execute with origin from an externally-owned account".to_string(),
            ));
        }
        let Some((contract_info, code_info)) = self.contract_instance(ctx, contract_address)?
        else {
            return Err(KilnError::NotFound(format!(
                "contract {}",
                address_display(contract_address)
            )));
        };
        require_not_system_contract(contract_address, &code_info.deps)?;

        let pinned = self.is_pinned_code(ctx, contract_info.code_id)?;
        ctx.consume_gas(
            self.gas.instantiate_contract_costs(pinned, msg.len()),
            "kiln execution: execute with origin",
        )?;

        if !coins_are_zero(funds) {
            bank::transfer_coins(ctx, caller, contract_address, funds)?;
        }

        let info = MessageInfo::new(*origin, *caller, coins_amount_of(funds, self.denom()));
        let res = self
            .engine_call(
                ctx,
                ENTRY_POINT_EXECUTE,
                contract_info.code_id,
                &code_info,
                contract_info.storage_type,
                contract_address,
                msg,
                info,
                false,
                false,
            )
            .map_err(|e| match e {
                KilnError::OutOfGas { .. } | KilnError::ExecuteFailed(_) => e,
                other => KilnError::ExecuteFailed(other.to_string()),
            })?;

        ctx.emit_event(
            Event::new(EVENT_TYPE_EXECUTE)
                .attr(ATTR_KEY_CONTRACT_ADDR, address_display(contract_address)),
        );
        self.handle_response_events(ctx, contract_address, &res.attributes, &res.events)?;
        Ok(res.data)
    }

    /// Execute a named alternate entry point instead of `execute`.
    pub fn execute_entry_point(
        &self,
        ctx: &TxContext,
        entry_point: &str,
        contract_address: &Address,
        caller: &Address,
        msg: &[u8],
        dependencies: &[String],
        _in_background: bool,
    ) -> Result<Vec<u8>, KilnError> {
        let Some((contract_info, code_info)) = self.contract_instance(ctx, contract_address)?
        else {
            return Err(KilnError::NotFound(format!(
                "contract {}",
                address_display(contract_address)
            )));
        };
        require_not_system_contract(contract_address, &code_info.deps)?;

        let mut all_deps = code_info.deps.clone();
        all_deps.extend(
            Capability::parse_all(dependencies)
                .map_err(|e| KilnError::ExecuteFailed(e.to_string()))?,
        );
        self.contract_deps_from_code_deps(ctx, &all_deps)?;

        let pinned = self.is_pinned_code(ctx, contract_info.code_id)?;
        ctx.consume_gas(
            self.gas.instantiate_contract_costs(pinned, msg.len()),
            "kiln execution: execute entry point",
        )?;

        let info = MessageInfo::new(*caller, *caller, 0);
        let res = self
            .engine_call(
                ctx,
                entry_point,
                contract_info.code_id,
                &code_info,
                contract_info.storage_type,
                contract_address,
                msg,
                info,
                false,
                false,
            )
            .map_err(|e| match e {
                KilnError::OutOfGas { .. } | KilnError::ExecuteFailed(_) => e,
                other => KilnError::ExecuteFailed(other.to_string()),
            })?;

        ctx.emit_event(
            Event::new(EVENT_TYPE_EXECUTE)
                .attr(ATTR_KEY_CONTRACT_ADDR, address_display(contract_address)),
        );
        self.handle_response_events(ctx, contract_address, &res.attributes, &res.events)?;
        self.handle_response_messages(ctx, contract_address, res.sub_messages, res.data)
    }

    /// Synchronous cross-contract call issued from inside a running
    /// contract. Runs in a child context committed only on success; an
    /// explicit gas cap bounds the blast radius of the callee, converting
    /// its exhaustion into a recoverable failure charged exactly the cap.
    pub(crate) fn call_from_contract(
        &self,
        ctx: &TxContext,
        caller: Address,
        target: Address,
        msg: &[u8],
        funds: Coins,
        gas_cap: Option<Gas>,
        read_only: bool,
    ) -> Result<Vec<u8>, KilnError> {
        if system::is_system_address(&target) && !self.can_call_system_contract(ctx, &caller) {
            return Err(KilnError::UnauthorizedAddress(format!(
                "contract {} may not call system contract {}",
                address_display(&caller),
                address_display(&target)
            )));
        }

        if ctx.depth() >= crate::context::MAX_CALL_DEPTH {
            return Err(KilnError::ExecuteFailed(format!(
                "call depth exceeded: {}",
                crate::context::MAX_CALL_DEPTH
            )));
        }

        let remaining = ctx.gas_remaining();
        let capped = gas_cap.filter(|cap| *cap < remaining);
        let child = match capped {
            Some(cap) => ctx.child_with_gas(cap),
            None => ctx.child(),
        };

        let result = self.execute(&child.ctx, &target, &caller, msg, &funds, &[], false);

        if let Some(cap) = capped {
            let spent = child.ctx.gas_consumed().min(cap);
            ctx.consume_gas(spent, "from limited sub-call")?;
            if let Err(KilnError::OutOfGas { .. }) = &result {
                // The callee ran over its own budget; the parent is charged
                // the cap, not more, and resumes.
                return Err(KilnError::ExecuteFailed(
                    "sub-call hit gas limit".to_string(),
                ));
            }
        }

        match result {
            Ok(data) => {
                if read_only {
                    child.commit_events_only(ctx);
                } else {
                    child.commit(ctx)?;
                }
                Ok(data)
            }
            Err(err) => Err(err),
        }
    }

    // ─── Query ──────────────────────────────────────────────────────────

    /// Read-only call. Runs inside a context whose store writes are never
    /// persisted upward.
    pub fn query(
        &self,
        ctx: &TxContext,
        contract_address: &Address,
        caller: &Address,
        msg: &[u8],
        dependencies: &[String],
    ) -> Result<Vec<u8>, KilnError> {
        let child = ctx.child();
        let res = self.query_internal(&child.ctx, contract_address, caller, msg, dependencies, false)?;
        Ok(res.data)
    }

    /// Debug query: additionally returns a linear-memory snapshot. Gated to
    /// callers that are system contracts or non-contract accounts, because
    /// the introspection is non-deterministic.
    pub fn query_debug(
        &self,
        ctx: &TxContext,
        contract_address: &Address,
        caller: &Address,
        msg: &[u8],
        dependencies: &[String],
    ) -> Result<(Vec<u8>, Vec<u8>), KilnError> {
        if !self.can_call_system_contract(ctx, caller) {
            return Err(KilnError::UnauthorizedAddress(
                "debug queries are not reachable from contract execution".to_string(),
            ));
        }
        let child = ctx.child();
        let res = self.query_internal(&child.ctx, contract_address, caller, msg, dependencies, true)?;
        Ok((res.data, res.memory_snapshot.unwrap_or_default()))
    }

    fn query_internal(
        &self,
        ctx: &TxContext,
        contract_address: &Address,
        caller: &Address,
        msg: &[u8],
        dependencies: &[String],
        debug: bool,
    ) -> Result<ember_types::response::ContractResponse, KilnError> {
        let Some((contract_info, code_info)) = self.contract_instance(ctx, contract_address)?
        else {
            return Err(KilnError::NotFound(format!(
                "contract {}",
                address_display(contract_address)
            )));
        };
        require_not_system_contract(contract_address, &code_info.deps)?;

        let mut all_deps = code_info.deps.clone();
        all_deps.extend(
            Capability::parse_all(dependencies)
                .map_err(|e| KilnError::QueryFailed(e.to_string()))?,
        );
        self.contract_deps_from_code_deps(ctx, &all_deps)?;

        let pinned = self.is_pinned_code(ctx, contract_info.code_id)?;
        ctx.consume_gas(
            self.gas.instantiate_contract_costs(pinned, msg.len()),
            "kiln execution: query",
        )?;

        let mut info = MessageInfo::new(*caller, *caller, 0);
        info.is_query = true;
        info.read_only = true;

        self.engine_call(
            ctx,
            ENTRY_POINT_QUERY,
            contract_info.code_id,
            &code_info,
            contract_info.storage_type,
            contract_address,
            msg,
            info,
            debug,
            true,
        )
        .map_err(|e| match e {
            KilnError::OutOfGas { .. } => e,
            other => KilnError::QueryFailed(other.to_string()),
        })
    }

    /// Read one raw key from a contract's storage, bypassing the VM.
    pub fn query_raw(
        &self,
        ctx: &TxContext,
        contract_address: &Address,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, KilnError> {
        let Some((contract_info, _)) = self.contract_instance(ctx, contract_address)? else {
            return Ok(None);
        };
        use ember_storage::KvStore;
        let store = ctx.contract_store(
            contract_info.storage_type,
            contract_store_prefix(contract_address),
        );
        Ok(store.get(key)?)
    }

    // ─── Reply ──────────────────────────────────────────────────────────

    /// Feed a completed sub-message result to the contract's reply entry
    /// point. Invoked only by the sub-message dispatcher.
    pub(crate) fn reply(
        &self,
        ctx: &TxContext,
        contract_address: &Address,
        reply: &Reply,
    ) -> Result<Vec<u8>, KilnError> {
        let Some((contract_info, code_info)) = self.contract_instance(ctx, contract_address)?
        else {
            return Err(KilnError::NotFound(format!(
                "contract {}",
                address_display(contract_address)
            )));
        };

        let msg =
            serde_json::to_vec(reply).map_err(|e| KilnError::Serialization(e.to_string()))?;
        let res = self
            .engine_call(
                ctx,
                ENTRY_POINT_REPLY,
                contract_info.code_id,
                &code_info,
                contract_info.storage_type,
                contract_address,
                &msg,
                MessageInfo::default(),
                false,
                false,
            )
            .map_err(|e| match e {
                KilnError::OutOfGas { .. } | KilnError::ExecuteFailed(_) => e,
                other => KilnError::ExecuteFailed(other.to_string()),
            })?;

        ctx.emit_event(
            Event::new(EVENT_TYPE_REPLY)
                .attr(ATTR_KEY_CONTRACT_ADDR, address_display(contract_address)),
        );
        self.handle_response_events(ctx, contract_address, &res.attributes, &res.events)?;
        self.handle_response_messages(ctx, contract_address, res.sub_messages, res.data)
    }

    // ─── Pin / Unpin ────────────────────────────────────────────────────

    pub fn pin_code(&self, ctx: &TxContext, code_id: CodeId) -> Result<(), KilnError> {
        let mut code_info = self
            .get_code_info(ctx, code_id)?
            .ok_or_else(|| KilnError::NotFound("code info".to_string()))?;
        self.code_store
            .pin(
                &code_info.code_hash,
                self.vm.as_ref(),
                self.config.shared_aot_cache.as_deref(),
            )
            .map_err(|e| KilnError::PinFailed(e.to_string()))?;
        code_info.pinned = true;
        let code_hash = code_info.code_hash;
        self.store_code_info(ctx, code_id, code_info)?;

        ctx.emit_event(
            Event::new(EVENT_TYPE_PIN_CODE)
                .attr(ATTR_KEY_CODE_ID, code_id.to_string())
                .attr(ATTR_KEY_CHECKSUM, checksum_hex(&code_hash)),
        );
        Ok(())
    }

    /// Unpin flips the metadata flag only; the compiled artifact stays on
    /// disk so a re-pin is free.
    pub fn unpin_code(&self, ctx: &TxContext, code_id: CodeId) -> Result<(), KilnError> {
        let mut code_info = self
            .get_code_info(ctx, code_id)?
            .ok_or_else(|| KilnError::NotFound("code info".to_string()))?;
        self.code_store
            .unpin(&code_info.code_hash)
            .map_err(|e| KilnError::UnpinFailed(e.to_string()))?;
        code_info.pinned = false;
        self.store_code_info(ctx, code_id, code_info)?;

        ctx.emit_event(
            Event::new(EVENT_TYPE_UNPIN_CODE).attr(ATTR_KEY_CODE_ID, code_id.to_string()),
        );
        Ok(())
    }
}

fn store_code_event(code_id: CodeId, code_hash: &Checksum, deps: &[String]) -> Event {
    let mut event = Event::new(EVENT_TYPE_STORE_CODE)
        .attr(ATTR_KEY_CHECKSUM, checksum_hex(code_hash))
        // Last fixed element to stay compatible with scripts.
        .attr(ATTR_KEY_CODE_ID, code_id.to_string());
    for dep in deps {
        event = event.attr(ATTR_KEY_REQUIRED_CAPABILITY, dep.clone());
    }
    event
}
