//! Storage layer error types.

use thiserror::Error;

use rankopt_types::RankoptError;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Column family not found
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// Key encoding/decoding error
    #[error("Key error: {0}")]
    Key(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Request rejected before touching storage
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// State changed between the caller's read and its commit
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A per-job lock was poisoned by a panicking holder
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<RankoptError> for StorageError {
    fn from(err: RankoptError) -> Self {
        match err {
            RankoptError::InvalidInput(msg) => StorageError::InvalidInput(msg),
            RankoptError::Serialization(e) => StorageError::Serialization(e.to_string()),
            RankoptError::Config(msg) => StorageError::InvalidInput(msg),
        }
    }
}
