//! Core error types.

use crate::types::SequenceNumber;
use thiserror::Error;

/// Errors from batch decoding and the core data model.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed WriteBatch: {0}")]
    MalformedBatch(&'static str),

    #[error("unknown WriteBatch tag: {0}")]
    UnknownTag(u8),

    #[error("WriteBatch has wrong count: header says {declared}, found {found}")]
    WrongCount { declared: u32, found: u32 },

    #[error("WriteBatch sequence range overflows: {count} records from {sequence}")]
    SequenceOverflow { sequence: SequenceNumber, count: u32 },

    #[error("table file not found: {file_number}")]
    TableNotFound { file_number: u64 },
}

impl CoreError {
    /// Returns whether this error means stored bytes are damaged.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            CoreError::MalformedBatch(_)
                | CoreError::UnknownTag(_)
                | CoreError::WrongCount { .. }
                | CoreError::SequenceOverflow { .. }
        )
    }
}
