//! Ledger accounts, as seen by the engine: sequence numbers (doubling as the
//! classic address-derivation nonce) and a pubkey marker distinguishing
//! externally claimed accounts from empty ones.

use borsh::{BorshDeserialize, BorshSerialize};

use ember_storage::KvStore;
use ember_types::primitives::Address;

use crate::context::{TxContext, ACCOUNT_STORE_PREFIX};
use crate::error::KilnError;

#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Account {
    pub sequence: u64,
    pub has_pubkey: bool,
}

impl Account {
    /// An account claimed by an external signer must not be overwritten by
    /// contract instantiation.
    pub fn is_externally_claimed(&self) -> bool {
        self.sequence != 0 || self.has_pubkey
    }
}

fn account_key(addr: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(ACCOUNT_STORE_PREFIX);
    key.extend_from_slice(addr);
    key
}

pub fn get_account(ctx: &TxContext, addr: &Address) -> Result<Option<Account>, KilnError> {
    let Some(raw) = ctx.spaces.core.get(&account_key(addr))? else {
        return Ok(None);
    };
    Account::try_from_slice(&raw)
        .map(Some)
        .map_err(|e| KilnError::Serialization(e.to_string()))
}

pub fn set_account(ctx: &TxContext, addr: &Address, account: &Account) -> Result<(), KilnError> {
    let raw = borsh::to_vec(account).map_err(|e| KilnError::Serialization(e.to_string()))?;
    ctx.spaces.core.put(&account_key(addr), &raw)?;
    Ok(())
}

/// Create and persist a fresh, empty account.
pub fn new_account(ctx: &TxContext, addr: &Address) -> Result<Account, KilnError> {
    let account = Account::default();
    set_account(ctx, addr, &account)?;
    Ok(account)
}
