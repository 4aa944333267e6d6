//! # loamdb-core
//!
//! Core data model for loamdb.
//!
//! This crate provides:
//! - The write batch wire format and its replay visitor
//! - Sequence numbers and value types
//! - The in-memory table batches are replayed into
//! - The table cache interface consumed by readers of on-disk tables

pub mod error;
pub mod memtable;
pub mod table_cache;
pub mod types;
pub mod write_batch;

pub use error::CoreError;
pub use memtable::{LookupResult, MemTable};
pub use table_cache::{TableCache, TableIterator};
pub use types::{SequenceNumber, ValueType, MAX_SEQUENCE_NUMBER};
pub use write_batch::{BatchHandler, MemTableInserter, WriteBatch, BATCH_HEADER_SIZE};
