//! # loamdb-storage
//!
//! Storage layer for loamdb.
//!
//! This crate provides:
//! - Recovery: replaying every log in a directory into a memtable
//! - Durable batch writes with a configurable sync policy
//! - Sequence number assignment across restarts

pub mod error;
pub mod store;

pub use error::StorageError;
pub use store::{RecoveryResult, Storage, StorageConfig, StorageStats, SyncPolicy};
