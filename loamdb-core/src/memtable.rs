//! In-memory table that recovered and freshly written batches land in.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::types::{SequenceNumber, ValueType, MAX_SEQUENCE_NUMBER};

/// Per-entry bookkeeping overhead counted by
/// [`MemTable::approximate_memory_usage`].
const ENTRY_OVERHEAD: usize = 8 + 1 + 32;

/// Outcome of a point lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResult {
    Value(Vec<u8>),
    /// The newest visible entry is a deletion.
    Deleted,
}

/// Ordered by user key ascending, then sequence descending, so the newest
/// version of a key comes first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct InternalKey {
    user_key: Vec<u8>,
    sequence: Reverse<SequenceNumber>,
}

#[derive(Debug, Clone)]
struct Entry {
    value_type: ValueType,
    value: Vec<u8>,
}

#[derive(Debug, Default)]
struct MemTableInner {
    entries: BTreeMap<InternalKey, Entry>,
    memory_usage: usize,
    max_sequence: SequenceNumber,
}

/// Multi-version sorted map of recent mutations.
#[derive(Debug, Default)]
pub struct MemTable {
    inner: RwLock<MemTableInner>,
}

impl MemTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a mutation. `value` is ignored for deletions.
    pub fn add(&self, sequence: SequenceNumber, value_type: ValueType, key: &[u8], value: &[u8]) {
        let value = match value_type {
            ValueType::Value => value.to_vec(),
            ValueType::Deletion => Vec::new(),
        };

        let mut inner = self.inner.write();
        inner.memory_usage += key.len() + value.len() + ENTRY_OVERHEAD;
        inner.max_sequence = inner.max_sequence.max(sequence);
        inner.entries.insert(
            InternalKey {
                user_key: key.to_vec(),
                sequence: Reverse(sequence),
            },
            Entry { value_type, value },
        );
    }

    /// Newest entry for `key`.
    pub fn get(&self, key: &[u8]) -> Option<LookupResult> {
        self.get_at(key, MAX_SEQUENCE_NUMBER)
    }

    /// Newest entry for `key` with a sequence at or below `snapshot`.
    pub fn get_at(&self, key: &[u8], snapshot: SequenceNumber) -> Option<LookupResult> {
        let inner = self.inner.read();
        let start = InternalKey {
            user_key: key.to_vec(),
            sequence: Reverse(snapshot),
        };

        let (found, entry) = inner.entries.range(start..).next()?;
        if found.user_key != key {
            return None;
        }
        Some(match entry.value_type {
            ValueType::Value => LookupResult::Value(entry.value.clone()),
            ValueType::Deletion => LookupResult::Deleted,
        })
    }

    /// Number of entries, counting every version of every key.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    pub fn approximate_memory_usage(&self) -> usize {
        self.inner.read().memory_usage
    }

    /// Highest sequence added so far, or 0 when empty.
    pub fn max_sequence(&self) -> SequenceNumber {
        self.inner.read().max_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let memtable = MemTable::new();
        assert!(memtable.is_empty());
        assert_eq!(memtable.len(), 0);
        assert_eq!(memtable.max_sequence(), 0);
        assert_eq!(memtable.get(b"missing"), None);
    }

    #[test]
    fn test_newest_version_wins() {
        let memtable = MemTable::new();
        memtable.add(1, ValueType::Value, b"k", b"v1");
        memtable.add(3, ValueType::Value, b"k", b"v3");
        memtable.add(2, ValueType::Value, b"k", b"v2");

        assert_eq!(memtable.get(b"k"), Some(LookupResult::Value(b"v3".to_vec())));
        assert_eq!(
            memtable.get_at(b"k", 2),
            Some(LookupResult::Value(b"v2".to_vec()))
        );
        assert_eq!(memtable.get_at(b"k", 0), None);
        assert_eq!(memtable.len(), 3);
        assert_eq!(memtable.max_sequence(), 3);
    }

    #[test]
    fn test_deletion_shadows_value() {
        let memtable = MemTable::new();
        memtable.add(5, ValueType::Value, b"k", b"v");
        memtable.add(6, ValueType::Deletion, b"k", b"ignored");

        assert_eq!(memtable.get(b"k"), Some(LookupResult::Deleted));
        assert_eq!(memtable.get_at(b"k", 5), Some(LookupResult::Value(b"v".to_vec())));
    }

    #[test]
    fn test_lookup_does_not_match_neighbours() {
        let memtable = MemTable::new();
        memtable.add(1, ValueType::Value, b"a", b"1");
        memtable.add(2, ValueType::Value, b"c", b"3");

        assert_eq!(memtable.get(b"b"), None);
        assert_eq!(memtable.get(b""), None);
        assert_eq!(memtable.get(b"d"), None);
    }

    #[test]
    fn test_memory_usage_grows() {
        let memtable = MemTable::new();
        let before = memtable.approximate_memory_usage();
        memtable.add(1, ValueType::Value, b"key", &[0u8; 100]);
        assert!(memtable.approximate_memory_usage() >= before + 103);
    }
}
