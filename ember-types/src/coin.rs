use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::primitives::Amount;

/// A single denominated token amount.
#[derive(
    Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Coin {
    pub denom: String,
    pub amount: Amount,
}

impl Coin {
    pub fn new(amount: Amount, denom: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

/// A set of coins attached to a call.
pub type Coins = Vec<Coin>;

/// Whether a coin set carries no value at all.
pub fn coins_are_zero(coins: &[Coin]) -> bool {
    coins.iter().all(|c| c.amount == 0)
}

/// Total amount of a given denomination in a coin set.
pub fn coins_amount_of(coins: &[Coin], denom: &str) -> Amount {
    coins
        .iter()
        .filter(|c| c.denom == denom)
        .map(|c| c.amount)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coins_are_zero() {
        assert!(coins_are_zero(&[]));
        assert!(coins_are_zero(&[Coin::new(0, "ember")]));
        assert!(!coins_are_zero(&[Coin::new(1, "ember")]));
    }

    #[test]
    fn test_coins_amount_of() {
        let coins = vec![Coin::new(5, "ember"), Coin::new(7, "ash"), Coin::new(3, "ember")];
        assert_eq!(coins_amount_of(&coins, "ember"), 8);
        assert_eq!(coins_amount_of(&coins, "ash"), 7);
        assert_eq!(coins_amount_of(&coins, "soot"), 0);
    }
}
