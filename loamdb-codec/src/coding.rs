//! Fixed-width, varint and length-prefixed encodings.
//!
//! ```text
//! fixed32    4 bytes, least significant byte first
//! fixed64    8 bytes, least significant byte first
//! varint     7 value bits per byte, low-order group first,
//!            high bit set on every byte except the last
//! varstring  varint32 length | length bytes
//! ```
//!
//! The `put_*` functions append to any [`BufMut`]; the `encode_*` functions
//! write into a caller-sized slice; the `get_*` functions consume from the
//! front of a slice and advance it past the decoded value.

use crate::error::CodecError;
use crate::{MAX_VARINT32_BYTES, MAX_VARINT64_BYTES};
use bytes::BufMut;

const CONTINUATION_BIT: u8 = 0x80;
const PAYLOAD_MASK: u8 = 0x7f;

/// Writes `value` into the first 4 bytes of `dst`, little-endian.
///
/// Panics if `dst` is shorter than 4 bytes.
pub fn encode_fixed32(dst: &mut [u8], value: u32) {
    dst[..4].copy_from_slice(&value.to_le_bytes());
}

/// Writes `value` into the first 8 bytes of `dst`, little-endian.
///
/// Panics if `dst` is shorter than 8 bytes.
pub fn encode_fixed64(dst: &mut [u8], value: u64) {
    dst[..8].copy_from_slice(&value.to_le_bytes());
}

/// Reads a little-endian u32 from the first 4 bytes of `src`.
///
/// The caller guarantees at least 4 bytes are present.
pub fn decode_fixed32(src: &[u8]) -> u32 {
    u32::from_le_bytes([src[0], src[1], src[2], src[3]])
}

/// Reads a little-endian u64 from the first 8 bytes of `src`.
///
/// The caller guarantees at least 8 bytes are present.
pub fn decode_fixed64(src: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&src[..8]);
    u64::from_le_bytes(bytes)
}

/// Appends exactly 4 little-endian bytes.
pub fn put_fixed32<B: BufMut>(dst: &mut B, value: u32) {
    dst.put_u32_le(value);
}

/// Appends exactly 8 little-endian bytes.
pub fn put_fixed64<B: BufMut>(dst: &mut B, value: u64) {
    dst.put_u64_le(value);
}

/// Encodes `value` as a varint into `dst`, returning the bytes written.
///
/// `dst` must have room for [`MAX_VARINT32_BYTES`].
pub fn encode_varint32(dst: &mut [u8], value: u32) -> usize {
    encode_varint64(dst, u64::from(value))
}

/// Encodes `value` as a varint into `dst`, returning the bytes written.
///
/// `dst` must have room for [`MAX_VARINT64_BYTES`].
pub fn encode_varint64(dst: &mut [u8], mut value: u64) -> usize {
    let mut i = 0;
    while value >= u64::from(CONTINUATION_BIT) {
        dst[i] = (value as u8) | CONTINUATION_BIT;
        value >>= 7;
        i += 1;
    }
    dst[i] = value as u8;
    i + 1
}

pub fn put_varint32<B: BufMut>(dst: &mut B, value: u32) {
    let mut buf = [0u8; MAX_VARINT32_BYTES];
    let len = encode_varint32(&mut buf, value);
    dst.put_slice(&buf[..len]);
}

pub fn put_varint64<B: BufMut>(dst: &mut B, value: u64) {
    let mut buf = [0u8; MAX_VARINT64_BYTES];
    let len = encode_varint64(&mut buf, value);
    dst.put_slice(&buf[..len]);
}

/// Returns the number of bytes the varint encoding of `value` occupies.
pub fn varint_length(mut value: u64) -> usize {
    let mut len = 1;
    while value >= u64::from(CONTINUATION_BIT) {
        value >>= 7;
        len += 1;
    }
    len
}

/// Decodes a 32-bit varint from the front of `src`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_varint32(src: &[u8]) -> Result<(u32, usize), CodecError> {
    let (value, consumed) = decode_varint(src, MAX_VARINT32_BYTES)?;
    Ok((value as u32, consumed))
}

/// Decodes a 64-bit varint from the front of `src`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_varint64(src: &[u8]) -> Result<(u64, usize), CodecError> {
    decode_varint(src, MAX_VARINT64_BYTES)
}

fn decode_varint(src: &[u8], max_bytes: usize) -> Result<(u64, usize), CodecError> {
    let mut result = 0u64;
    for (i, &byte) in src.iter().take(max_bytes).enumerate() {
        result |= u64::from(byte & PAYLOAD_MASK) << (7 * i);
        if byte & CONTINUATION_BIT == 0 {
            return Ok((result, i + 1));
        }
    }

    if src.len() < max_bytes {
        Err(CodecError::VarintTruncated)
    } else {
        Err(CodecError::VarintTooLong { max_bytes })
    }
}

/// Decodes a 32-bit varint and advances `input` past it.
pub fn get_varint32(input: &mut &[u8]) -> Result<u32, CodecError> {
    let (value, consumed) = decode_varint32(input)?;
    *input = &input[consumed..];
    Ok(value)
}

/// Decodes a 64-bit varint and advances `input` past it.
pub fn get_varint64(input: &mut &[u8]) -> Result<u64, CodecError> {
    let (value, consumed) = decode_varint64(input)?;
    *input = &input[consumed..];
    Ok(value)
}

/// Appends `data` prefixed by its varint32 length.
pub fn put_length_prefixed_slice<B: BufMut>(dst: &mut B, data: &[u8]) {
    debug_assert!(data.len() <= u32::MAX as usize);
    put_varint32(dst, data.len() as u32);
    dst.put_slice(data);
}

/// Decodes a length-prefixed byte string from the front of `input`.
///
/// On success the returned slice borrows from the input and `input` is
/// advanced past it. On failure `input` is left untouched.
pub fn get_length_prefixed_slice<'a>(input: &mut &'a [u8]) -> Result<&'a [u8], CodecError> {
    let src: &'a [u8] = *input;
    let (len, consumed) = decode_varint32(src)?;
    let len = len as usize;
    let rest = &src[consumed..];
    if rest.len() < len {
        return Err(CodecError::Truncated {
            needed: len,
            available: rest.len(),
        });
    }

    let (value, tail) = rest.split_at(len);
    *input = tail;
    Ok(value)
}
