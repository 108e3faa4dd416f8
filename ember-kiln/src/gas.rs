//! Gas accounting: the register converting between the host ledger's gas
//! unit and the VM's internal unit, per-operation cost formulas, and the
//! meters used on both sides of that bridge.

use ember_types::primitives::Gas;
use ember_types::response::{Event, EventAttribute};

use crate::error::KilnError;

/// How many VM gas points equal one ledger gas point.
pub const DEFAULT_GAS_MULTIPLIER: u64 = 140_000_000;
/// Flat ledger gas charged each time a non-pinned module is loaded.
pub const DEFAULT_INSTANCE_COST: Gas = 60_000;
/// Ledger gas per byte of bytecode compiled at create time.
pub const DEFAULT_COMPILE_COST: Gas = 3;
/// Ledger gas per byte of attribute data, with `len(key) + len(value)`.
pub const DEFAULT_EVENT_ATTRIBUTE_DATA_COST: Gas = 1;
/// Ledger gas per byte of message data handed to the contract.
pub const DEFAULT_CONTRACT_MESSAGE_DATA_COST: Gas = 0;
/// Ledger gas per attribute.
pub const DEFAULT_PER_ATTRIBUTE_COST: Gas = 10;
/// Ledger gas per custom event.
pub const DEFAULT_PER_CUSTOM_EVENT_COST: Gas = 20;
/// Attribute bytes free of charge, shared across one call.
pub const DEFAULT_EVENT_ATTRIBUTE_DATA_FREE_TIER: u64 = 100;
/// Decompression is charged per `uncompress_divisor` bytes.
pub const DEFAULT_PER_BYTE_UNCOMPRESS_COST: Gas = 1;
pub const UNCOMPRESS_COST_DIVISOR: u64 = 6;

/// Gas register configuration.
#[derive(Debug, Clone, Copy)]
pub struct GasConfig {
    pub instance_cost: Gas,
    pub compile_cost: Gas,
    pub uncompress_cost: Gas,
    pub uncompress_divisor: u64,
    /// How many VM gas points equal one ledger gas point. Must be non-zero.
    pub gas_multiplier: u64,
    pub event_per_attribute_cost: Gas,
    pub event_attribute_data_cost: Gas,
    pub event_attribute_data_free_tier: u64,
    pub contract_message_data_cost: Gas,
    pub custom_event_cost: Gas,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            instance_cost: DEFAULT_INSTANCE_COST,
            compile_cost: DEFAULT_COMPILE_COST,
            uncompress_cost: DEFAULT_PER_BYTE_UNCOMPRESS_COST,
            uncompress_divisor: UNCOMPRESS_COST_DIVISOR,
            gas_multiplier: DEFAULT_GAS_MULTIPLIER,
            event_per_attribute_cost: DEFAULT_PER_ATTRIBUTE_COST,
            event_attribute_data_cost: DEFAULT_EVENT_ATTRIBUTE_DATA_COST,
            event_attribute_data_free_tier: DEFAULT_EVENT_ATTRIBUTE_DATA_FREE_TIER,
            contract_message_data_cost: DEFAULT_CONTRACT_MESSAGE_DATA_COST,
            custom_event_cost: DEFAULT_PER_CUSTOM_EVENT_COST,
        }
    }
}

/// Pure, stateless source of gas costs and unit conversions.
#[derive(Debug, Clone, Copy)]
pub struct GasRegister {
    config: GasConfig,
}

impl Default for GasRegister {
    fn default() -> Self {
        Self::new(GasConfig::default())
    }
}

impl GasRegister {
    /// Panics when the multiplier is zero; that is a broken process
    /// configuration, not a runtime condition.
    pub fn new(config: GasConfig) -> Self {
        if config.gas_multiplier == 0 {
            panic!("gas multiplier can not be 0");
        }
        Self { config }
    }

    /// Cost to create a new contract instance from code.
    pub fn new_contract_instance_costs(&self, pinned: bool, msg_len: usize) -> Gas {
        self.instantiate_contract_costs(pinned, msg_len)
    }

    /// Cost charged when interacting with a contract.
    pub fn instantiate_contract_costs(&self, pinned: bool, msg_len: usize) -> Gas {
        let data_costs = msg_len as Gas * self.config.contract_message_data_cost;
        if pinned {
            return data_costs;
        }
        self.config.instance_cost + data_costs
    }

    /// Cost to persist and compile new bytecode.
    pub fn compile_costs(&self, byte_length: usize) -> Gas {
        self.config.compile_cost * byte_length as Gas
    }

    /// Cost to unpack gzip-framed bytecode.
    pub fn uncompress_costs(&self, byte_length: usize) -> Gas {
        self.config.uncompress_cost * (byte_length as u64 / self.config.uncompress_divisor)
    }

    /// Cost to persist the events of one call.
    ///
    /// One shared free-byte tier depletes across the call's own attributes
    /// first, then each event's attributes in order; event type bytes never
    /// draw from the free tier.
    pub fn event_costs(&self, attrs: &[EventAttribute], events: &[Event]) -> Gas {
        let (mut gas, mut remaining_free_tier) =
            self.event_attribute_costs(attrs, self.config.event_attribute_data_free_tier);
        for event in events {
            gas += self.config.custom_event_cost;
            gas += event.ty.len() as Gas * self.config.event_attribute_data_cost;
            let (attr_cost, free_tier) =
                self.event_attribute_costs(&event.attributes, remaining_free_tier);
            gas += attr_cost;
            remaining_free_tier = free_tier;
        }
        gas
    }

    fn event_attribute_costs(&self, attrs: &[EventAttribute], free_tier: u64) -> (Gas, u64) {
        if attrs.is_empty() {
            return (0, free_tier);
        }
        let stored: u64 = attrs.iter().map(EventAttribute::stored_len).sum();
        let (stored, free_tier) = apply_free_tier(stored, free_tier);
        let cost = (self.config.event_attribute_data_cost as u128 * stored as u128)
            + (self.config.event_per_attribute_cost as u128 * attrs.len() as u128);
        let cost = Gas::try_from(cost).unwrap_or(Gas::MAX);
        (cost, free_tier)
    }

    /// Convert ledger gas to VM gas. Multiplication overflow is a fatal
    /// out-of-gas condition rather than a silent wrap.
    pub fn to_vm_gas(&self, source: Gas) -> Result<u64, KilnError> {
        source
            .checked_mul(self.config.gas_multiplier)
            .ok_or_else(|| KilnError::out_of_gas("gas conversion overflow"))
    }

    /// Convert VM gas back to ledger gas.
    pub fn from_vm_gas(&self, source: u64) -> Gas {
        source / self.config.gas_multiplier
    }
}

fn apply_free_tier(stored: u64, free_tier: u64) -> (u64, u64) {
    if stored <= free_tier {
        return (0, free_tier - stored);
    }
    (stored - free_tier, 0)
}

/// VM gas points per engine fuel unit.
///
/// Fuel is the backend's per-instruction runaway bound, not the gas
/// accounting unit; one ledger gas point buys `gas_multiplier /
/// VM_GAS_PER_FUEL` instructions of headroom.
pub const VM_GAS_PER_FUEL: u64 = 140_000;

/// Engine fuel to grant for a VM-unit budget.
pub fn fuel_for_budget(vm_budget: u64) -> u64 {
    if vm_budget == u64::MAX {
        return u64::MAX;
    }
    (vm_budget / VM_GAS_PER_FUEL).max(1)
}

// ─── Meters ─────────────────────────────────────────────────────────────────

/// The host ledger's gas meter. A limit of zero means unlimited.
#[derive(Debug, Clone)]
pub struct LedgerGasMeter {
    limit: Gas,
    consumed: Gas,
}

impl LedgerGasMeter {
    pub fn new(limit: Gas) -> Self {
        Self { limit, consumed: 0 }
    }

    pub fn consume(&mut self, amount: Gas, descriptor: &str) -> Result<(), KilnError> {
        self.consumed = self.consumed.saturating_add(amount);
        if self.limit != 0 && self.consumed > self.limit {
            return Err(KilnError::out_of_gas(descriptor));
        }
        Ok(())
    }

    pub fn limit(&self) -> Gas {
        self.limit
    }

    pub fn consumed(&self) -> Gas {
        self.consumed
    }

    pub fn remaining(&self) -> Gas {
        if self.limit == 0 {
            return Gas::MAX;
        }
        self.limit.saturating_sub(self.consumed)
    }

    pub fn is_out_of_gas(&self) -> bool {
        self.limit != 0 && self.consumed >= self.limit
    }
}

/// The VM-unit budget for one backend invocation.
///
/// Host functions charge this meter; after the call the keeper converts the
/// consumption back to ledger units through the register.
#[derive(Debug, Clone)]
pub struct RuntimeGasMeter {
    limit: u64,
    used: u64,
}

impl RuntimeGasMeter {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    pub fn consume(&mut self, amount: u64) -> Result<(), ember_forge::ForgeError> {
        self.used = self.used.saturating_add(amount);
        if self.used > self.limit {
            return Err(ember_forge::ForgeError::OutOfGas);
        }
        Ok(())
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn used(&self) -> u64 {
        self.used
    }
}
