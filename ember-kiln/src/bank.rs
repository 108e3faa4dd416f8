//! Minimal bank boundary: balances and transfers, enough for the keeper's
//! funds-before-constructor ordering and bare value transfers.

use ember_storage::KvStore;
use ember_types::coin::{Coin, Coins};
use ember_types::primitives::{Address, Amount};

use crate::context::{TxContext, BALANCE_STORE_PREFIX};
use crate::error::KilnError;

fn balance_key(denom: &str, addr: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 1 + denom.len() + 20);
    key.push(BALANCE_STORE_PREFIX);
    key.push(denom.len() as u8);
    key.extend_from_slice(denom.as_bytes());
    key.extend_from_slice(addr);
    key
}

pub fn get_balance(ctx: &TxContext, addr: &Address, denom: &str) -> Result<Amount, KilnError> {
    let Some(raw) = ctx.spaces.core.get(&balance_key(denom, addr))? else {
        return Ok(0);
    };
    let bytes: [u8; 16] = raw
        .try_into()
        .map_err(|_| KilnError::Serialization("malformed balance record".to_string()))?;
    Ok(Amount::from_be_bytes(bytes))
}

pub fn set_balance(
    ctx: &TxContext,
    addr: &Address,
    denom: &str,
    amount: Amount,
) -> Result<(), KilnError> {
    ctx.spaces
        .core
        .put(&balance_key(denom, addr), &amount.to_be_bytes())?;
    Ok(())
}

/// Move coins between accounts, failing without partial effect when any
/// denomination is short.
pub fn transfer_coins(
    ctx: &TxContext,
    from: &Address,
    to: &Address,
    coins: &Coins,
) -> Result<(), KilnError> {
    for coin in coins {
        if coin.amount == 0 {
            continue;
        }
        let available = get_balance(ctx, from, &coin.denom)?;
        if available < coin.amount {
            return Err(KilnError::InsufficientFunds {
                denom: coin.denom.clone(),
                needed: coin.amount,
                available,
            });
        }
    }
    for coin in coins {
        if coin.amount == 0 {
            continue;
        }
        let from_balance = get_balance(ctx, from, &coin.denom)?;
        set_balance(ctx, from, &coin.denom, from_balance - coin.amount)?;
        let to_balance = get_balance(ctx, to, &coin.denom)?;
        set_balance(ctx, to, &coin.denom, to_balance + coin.amount)?;
    }
    Ok(())
}

/// Credit coins out of thin air; genesis and test setup only.
pub fn mint_coins(ctx: &TxContext, to: &Address, coins: &[Coin]) -> Result<(), KilnError> {
    for coin in coins {
        let balance = get_balance(ctx, to, &coin.denom)?;
        set_balance(ctx, to, &coin.denom, balance + coin.amount)?;
    }
    Ok(())
}
