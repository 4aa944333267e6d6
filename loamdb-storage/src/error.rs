//! Storage error types.

use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("storage is closed")]
    Closed,

    #[error("WAL error: {0}")]
    Wal(#[from] loamdb_wal::WalError),

    #[error("core error: {0}")]
    Core(#[from] loamdb_core::CoreError),
}

impl StorageError {
    /// Returns whether this error means stored bytes are damaged.
    pub fn is_corruption(&self) -> bool {
        match self {
            StorageError::Corruption(_) => true,
            StorageError::Core(e) => e.is_corruption(),
            _ => false,
        }
    }
}
