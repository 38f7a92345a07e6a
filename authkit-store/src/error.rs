//! Error types for the storage primitives.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by key-value backends.
///
/// Read paths in consumers are expected to degrade to "not found" instead of
/// propagating these; write paths must surface them, because a credential
/// that silently fails to persist is lost data.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A write was attempted but its commit could not be confirmed.
    #[error("commit failed for key `{key}`")]
    CommitFailed {
        /// The key whose write failed to commit.
        key: String,
        /// The value that was being written; `None` for a clear.
        attempted_value: Option<String>,
    },

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(String),

    /// Serialization failure on the write path.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StorageError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}
