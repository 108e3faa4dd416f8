use thiserror::Error;

/// Errors raised while parsing or validating shared types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("empty capability tag")]
    EmptyCapability,

    #[error("invalid capability tag: {0}")]
    InvalidCapability(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}
