use thiserror::Error;

use ember_storage::StorageError;

/// Errors surfaced at the keeper boundary.
///
/// `OutOfGas` is deliberately not an ordinary failure: it is the unwind
/// signal that aborts every enclosing cache context up to the nearest
/// gas-limit boundary. Only those boundaries (the sub-message dispatcher and
/// capped sub-calls) intercept it; everything else propagates it untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KilnError {
    #[error("create failed: {0}")]
    CreateFailed(String),

    #[error("instantiate failed: {0}")]
    InstantiateFailed(String),

    #[error("execute failed: {0}")]
    ExecuteFailed(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("pin failed: {0}")]
    PinFailed(String),

    #[error("unpin failed: {0}")]
    UnpinFailed(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("empty: {0}")]
    Empty(String),

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("unauthorized address: {0}")]
    UnauthorizedAddress(String),

    #[error("account exists: {0}")]
    AccountExists(String),

    #[error("insufficient funds: {denom} needed {needed}, available {available}")]
    InsufficientFunds {
        denom: String,
        needed: u128,
        available: u128,
    },

    #[error("out of gas: {descriptor}")]
    OutOfGas { descriptor: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl KilnError {
    pub fn out_of_gas(descriptor: impl Into<String>) -> Self {
        KilnError::OutOfGas {
            descriptor: descriptor.into(),
        }
    }

    /// Stable numeric code, used when redacting sub-message errors.
    pub fn code(&self) -> u32 {
        match self {
            KilnError::CreateFailed(_) => 2,
            KilnError::InstantiateFailed(_) => 3,
            KilnError::ExecuteFailed(_) => 4,
            KilnError::QueryFailed(_) => 5,
            KilnError::PinFailed(_) => 6,
            KilnError::UnpinFailed(_) => 7,
            KilnError::Duplicate(_) => 8,
            KilnError::NotFound(_) => 9,
            KilnError::Empty(_) => 10,
            KilnError::Invalid(_) => 11,
            KilnError::UnauthorizedAddress(_) => 12,
            KilnError::AccountExists(_) => 13,
            KilnError::InsufficientFunds { .. } => 14,
            KilnError::OutOfGas { .. } => 15,
            KilnError::Storage(_) => 16,
            KilnError::Serialization(_) => 17,
        }
    }

    /// System errors are deterministic by construction and pass through
    /// sub-message redaction verbatim.
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            KilnError::NotFound(_) | KilnError::UnauthorizedAddress(_) | KilnError::OutOfGas { .. }
        )
    }
}

/// Redact an error to a `codespace/code` pair so no non-deterministic error
/// string leaks across nodes; system errors pass through verbatim.
pub fn redact_error(err: &KilnError) -> String {
    if err.is_system() {
        return err.to_string();
    }
    format!("codespace: kiln, code: {}", err.code())
}
