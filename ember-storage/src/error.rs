use thiserror::Error;

/// Errors that can occur in the storage subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("read error: {reason}")]
    ReadError { reason: String },

    #[error("write error: {reason}")]
    WriteError { reason: String },

    #[error("commit error: {reason}")]
    CommitError { reason: String },
}
