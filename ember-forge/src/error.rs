use thiserror::Error;

/// Errors that can occur while loading or executing a module.
///
/// The three instantiation phases are reported distinctly: `Load` (artifact
/// unreadable), `Validate` (compile-time validation, a user error) and
/// `Instantiate` (runtime linking/start failure, a possible host bug).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForgeError {
    #[error("failed to load module: {reason}")]
    Load { reason: String },

    #[error("invalid module: {reason}")]
    Validate { reason: String },

    #[error("failed to instantiate module: {reason}")]
    Instantiate { reason: String },

    #[error("runtime error: {reason}")]
    Runtime { reason: String },

    #[error("function not found: {name}")]
    FunctionNotFound { name: String },

    #[error("out of bounds memory access: offset {offset}, len {len}, size {size}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("out of gas")]
    OutOfGas,

    /// The contract halted early through the `finish` host function.
    /// Treated as success by the engine.
    #[error("execution finished")]
    Halted,

    /// The contract aborted through the `revert` host function, propagating
    /// its payload as the error value.
    #[error("execution reverted")]
    Reverted { data: Vec<u8> },

    #[error("host function failed: {reason}")]
    HostFunction { reason: String },

    #[error("operation not supported by this backend: {reason}")]
    Unsupported { reason: String },
}
