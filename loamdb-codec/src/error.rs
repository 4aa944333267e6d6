//! Codec error types.

use thiserror::Error;

/// Errors produced while decoding variable-length data.
///
/// Fixed-width decoding has no error path: the caller guarantees enough
/// bytes are present.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("varint is longer than {max_bytes} bytes")]
    VarintTooLong { max_bytes: usize },

    #[error("input ended inside a varint")]
    VarintTruncated,

    #[error("truncated input: need {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
}
