use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A conditional write found a different version than expected.
    #[error("write conflict on `{key}`")]
    Conflict { key: String },
    /// The stored record exists but cannot be decoded.
    #[error("stored record `{key}` is corrupted: {reason}")]
    Corrupted { key: String, reason: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a conflict error for the given storage key.
    pub fn conflict(key: impl Into<String>) -> Self {
        StorageError::Conflict { key: key.into() }
    }

    /// Construct an error for a record that was read but could not be decoded.
    pub fn corrupted(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::Corrupted {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error reports a failed write precondition.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}
