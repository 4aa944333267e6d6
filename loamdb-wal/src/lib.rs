//! # loamdb-wal
//!
//! Write-Ahead Log implementation for loamdb.
//!
//! This crate provides:
//! - Fragmentation of logical records into fixed-size blocks
//! - Per-record masked CRC32C checksums
//! - A reader that reassembles fragments, skips corrupted regions and
//!   reports what it dropped
//! - Resuming a scan from an arbitrary byte offset

pub mod error;
pub mod filename;
pub mod format;
pub mod reader;
pub mod recovery;
pub mod reporter;
pub mod writer;

pub use error::{DropReason, WalError};
pub use filename::{list_logs, log_file_name, log_file_path, parse_log_number};
pub use format::{mask_crc, unmask_crc, RecordType};
pub use reader::{LogReader, ReaderState, Records};
pub use recovery::{scan_log, verify_log, ScanReport};
pub use reporter::{CorruptionEvent, CorruptionLog, Reporter};
pub use writer::LogWriter;

/// Log files are split into blocks of this size. Physical records never
/// cross a block boundary.
pub const BLOCK_SIZE: usize = 32 * 1024;

/// Physical record header size in bytes: checksum (4) + length (2) + type (1).
pub const HEADER_SIZE: usize = 4 + 2 + 1;
