//! Storage error types

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying database error
    #[error("database error: {0}")]
    Db(#[from] rocksdb::Error),

    /// Record (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A required column family is missing
    #[error("missing column family: {0}")]
    MissingColumnFamily(&'static str),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
