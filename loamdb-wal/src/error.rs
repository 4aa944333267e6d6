//! WAL error types.

use thiserror::Error;

/// Errors that can occur during WAL operations.
///
/// Corruption inside a log is not an error at this level: the reader
/// skips it and tells its [`Reporter`](crate::Reporter) instead.
#[derive(Debug, Error)]
pub enum WalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid record type: {0}")]
    InvalidRecordType(u8),
}

impl WalError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WalError::Io(_))
    }
}

/// Why the reader dropped a region of the log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("bad record length")]
    BadRecordLength,

    #[error("partial record without end")]
    PartialRecord,

    #[error("missing start of fragmented record")]
    MissingStart,

    #[error("error in middle of record")]
    ErrorInMiddleOfRecord,

    #[error("unknown record type {0}")]
    UnknownRecordType(u8),

    #[error("record ends before the initial offset")]
    BelowInitialOffset,
}
