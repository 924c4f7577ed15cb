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
    /// Persisted data could not be mapped back onto the domain model.
    #[error("corrupted record in `{collection}`: {message}")]
    Corrupted {
        collection: &'static str,
        message: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a corruption error for a record that failed to decode.
    pub fn corrupted(collection: &'static str, message: impl Into<String>) -> Self {
        StorageError::Corrupted {
            collection,
            message: message.into(),
        }
    }
}
