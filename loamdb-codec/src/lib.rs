//! # loamdb-codec
//!
//! Endian-neutral binary coding used by the loamdb write path.
//!
//! This crate provides:
//! - Fixed-width little-endian integers (32 and 64 bit)
//! - Variable-length integers (7 bits per byte, low group first)
//! - Length-prefixed byte strings (varint32 length + raw bytes)

pub mod coding;
pub mod error;

pub use coding::{
    decode_fixed32, decode_fixed64, decode_varint32, decode_varint64, encode_fixed32,
    encode_fixed64, encode_varint32, encode_varint64, get_length_prefixed_slice, get_varint32,
    get_varint64, put_fixed32, put_fixed64, put_length_prefixed_slice, put_varint32,
    put_varint64, varint_length,
};
pub use error::CodecError;

/// Maximum encoded length of a 32-bit varint.
pub const MAX_VARINT32_BYTES: usize = 5;

/// Maximum encoded length of a 64-bit varint.
pub const MAX_VARINT64_BYTES: usize = 10;
