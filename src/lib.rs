//! # loamdb
//!
//! The durable write path of an embedded ordered key-value store.
//!
//! - [`loamdb_codec`]: fixed-width and varint encodings
//! - [`loamdb_wal`]: block-framed write-ahead log with corruption-tolerant reads
//! - [`loamdb_core`]: write batches, sequence numbers, memtable
//! - [`loamdb_storage`]: log recovery and the batch write path

pub use loamdb_codec;
pub use loamdb_core;
pub use loamdb_storage;
pub use loamdb_wal;

pub use loamdb_core::{SequenceNumber, WriteBatch};
pub use loamdb_storage::{Storage, StorageConfig, StorageError, SyncPolicy};
