//! Sequence numbers and value types.

use crate::error::CoreError;

/// Monotonic version stamp assigned to every mutation.
pub type SequenceNumber = u64;

/// The top 8 bits of a packed internal key hold the value type, leaving
/// 56 bits for the sequence.
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

/// Kind of a mutation. Doubles as the record tag in a write batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ValueType {
    Deletion = 0x0,
    Value = 0x1,
}

impl TryFrom<u8> for ValueType {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(ValueType::Deletion),
            0x1 => Ok(ValueType::Value),
            _ => Err(CoreError::UnknownTag(value)),
        }
    }
}
