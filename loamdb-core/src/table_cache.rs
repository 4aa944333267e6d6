//! Table cache interface.
//!
//! Readers of on-disk sorted tables go through a cache keyed by file
//! number. How entries are retained or evicted is up to the
//! implementation, but it must never hold more than one open handle for
//! the same file number.

use crate::error::CoreError;

/// Iterator over the `(key, value)` entries of one table, in key order.
pub type TableIterator<'a> = Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a>;

pub trait TableCache: Send + Sync {
    /// Iterates the table stored in `file_number`, opening it if needed.
    fn new_iterator(&self, file_number: u64, file_size: u64) -> Result<TableIterator<'_>, CoreError>;

    /// Seeks to `key` in the table and, if an entry exists at or after it,
    /// passes that entry to `handle_result`.
    fn get(
        &self,
        file_number: u64,
        file_size: u64,
        key: &[u8],
        handle_result: &mut dyn FnMut(&[u8], &[u8]),
    ) -> Result<(), CoreError>;

    /// Drops any cached handle for `file_number`.
    fn evict(&self, file_number: u64);
}
