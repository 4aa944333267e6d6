//! Physical record framing.
//!
//! A log file is a sequence of [`BLOCK_SIZE`](crate::BLOCK_SIZE) blocks.
//! Each block holds one or more physical records:
//!
//! ```text
//! +----------+----------+--------+-----------------+
//! | checksum | length   | type   | payload         |
//! | u32 LE   | u16 LE   | u8     | `length` bytes  |
//! +----------+----------+--------+-----------------+
//! ```
//!
//! The checksum is a masked CRC32C over the type byte followed by the
//! payload. A block tail shorter than a header is zero-filled.

use crate::error::WalError;

const MASK_DELTA: u32 = 0xa282_ead8;

/// Physical record type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    /// Reserved for preallocated, never-written space.
    Zero = 0,
    /// A complete logical record.
    Full = 1,
    /// First fragment of a logical record.
    First = 2,
    /// Interior fragment.
    Middle = 3,
    /// Final fragment.
    Last = 4,
}

impl RecordType {
    pub const MAX: u8 = RecordType::Last as u8;
}

impl TryFrom<u8> for RecordType {
    type Error = WalError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RecordType::Zero),
            1 => Ok(RecordType::Full),
            2 => Ok(RecordType::First),
            3 => Ok(RecordType::Middle),
            4 => Ok(RecordType::Last),
            _ => Err(WalError::InvalidRecordType(value)),
        }
    }
}

/// Masks a CRC before storing it.
///
/// Computing the CRC of a string that itself contains embedded CRCs is
/// problematic, so stored checksums are rotated and offset.
pub fn mask_crc(crc: u32) -> u32 {
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

/// Inverse of [`mask_crc`].
pub fn unmask_crc(masked: u32) -> u32 {
    let rot = masked.wrapping_sub(MASK_DELTA);
    (rot >> 17) | (rot << 15)
}

/// Unmasked CRC32C of `record_type` followed by `payload`.
pub fn record_checksum(record_type: RecordType, payload: &[u8]) -> u32 {
    let crc = crc32c::crc32c(&[record_type as u8]);
    crc32c::crc32c_append(crc, payload)
}
