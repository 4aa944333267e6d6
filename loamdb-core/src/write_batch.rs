//! Write batches.
//!
//! A batch is an ordered group of mutations applied atomically. It owns its
//! serialized form, which is also what goes into the log:
//!
//! ```text
//! sequence: fixed64
//! count:    fixed32
//! records:  count * record
//!
//! record := Value    varstring varstring
//!         | Deletion varstring
//! varstring := len: varint32, data: u8[len]
//! ```

use loamdb_codec::{
    decode_fixed32, decode_fixed64, encode_fixed32, encode_fixed64, get_length_prefixed_slice,
    put_length_prefixed_slice,
};

use crate::error::CoreError;
use crate::memtable::MemTable;
use crate::types::{SequenceNumber, ValueType, MAX_SEQUENCE_NUMBER};

/// Sequence (8 bytes) followed by count (4 bytes).
pub const BATCH_HEADER_SIZE: usize = 12;

/// Receives the records of a batch in insertion order.
pub trait BatchHandler {
    fn put(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// An ordered group of puts and deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBatch {
    rep: Vec<u8>,
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBatch {
    pub fn new() -> Self {
        Self {
            rep: vec![0u8; BATCH_HEADER_SIZE],
        }
    }

    /// Rebuilds a batch from its serialized form.
    ///
    /// Only the header length is checked here; records are validated by
    /// [`iterate`](Self::iterate).
    pub fn from_contents(contents: &[u8]) -> Result<Self, CoreError> {
        if contents.len() < BATCH_HEADER_SIZE {
            return Err(CoreError::MalformedBatch("too small"));
        }
        Ok(Self {
            rep: contents.to_vec(),
        })
    }

    /// Drops all records and resets the header.
    pub fn clear(&mut self) {
        self.rep.clear();
        self.rep.resize(BATCH_HEADER_SIZE, 0);
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(ValueType::Value as u8);
        put_length_prefixed_slice(&mut self.rep, key);
        put_length_prefixed_slice(&mut self.rep, value);
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(ValueType::Deletion as u8);
        put_length_prefixed_slice(&mut self.rep, key);
    }

    /// Appends the records of `other`. This batch keeps its own sequence.
    pub fn append(&mut self, other: &WriteBatch) {
        self.set_count(self.count() + other.count());
        self.rep.extend_from_slice(&other.rep[BATCH_HEADER_SIZE..]);
    }

    /// Size of the serialized batch.
    pub fn approximate_size(&self) -> usize {
        self.rep.len()
    }

    /// Number of records declared in the header.
    pub fn count(&self) -> u32 {
        decode_fixed32(&self.rep[8..BATCH_HEADER_SIZE])
    }

    fn set_count(&mut self, count: u32) {
        encode_fixed32(&mut self.rep[8..BATCH_HEADER_SIZE], count);
    }

    pub fn sequence(&self) -> SequenceNumber {
        decode_fixed64(&self.rep[..8])
    }

    pub fn set_sequence(&mut self, sequence: SequenceNumber) {
        encode_fixed64(&mut self.rep[..8], sequence);
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Serialized form, as written to the log.
    pub fn contents(&self) -> &[u8] {
        &self.rep
    }

    /// Replays every record into `handler`.
    ///
    /// Records are forwarded as they are decoded. The header count is only
    /// checked once the payload is exhausted, so on a count mismatch the
    /// handler has already seen every record.
    pub fn iterate<H: BatchHandler + ?Sized>(&self, handler: &mut H) -> Result<(), CoreError> {
        if self.rep.len() < BATCH_HEADER_SIZE {
            return Err(CoreError::MalformedBatch("too small"));
        }

        let mut input = &self.rep[BATCH_HEADER_SIZE..];
        let mut found = 0u32;

        while let Some((&tag, rest)) = input.split_first() {
            input = rest;
            found += 1;
            match ValueType::try_from(tag)? {
                ValueType::Value => {
                    let key = get_length_prefixed_slice(&mut input)
                        .map_err(|_| CoreError::MalformedBatch("bad WriteBatch Put"))?;
                    let value = get_length_prefixed_slice(&mut input)
                        .map_err(|_| CoreError::MalformedBatch("bad WriteBatch Put"))?;
                    handler.put(key, value);
                }
                ValueType::Deletion => {
                    let key = get_length_prefixed_slice(&mut input)
                        .map_err(|_| CoreError::MalformedBatch("bad WriteBatch Delete"))?;
                    handler.delete(key);
                }
            }
        }

        let declared = self.count();
        if found != declared {
            return Err(CoreError::WrongCount { declared, found });
        }
        Ok(())
    }

    /// Sequence of the last record, or one before
    /// [`sequence`](Self::sequence) for an empty batch.
    ///
    /// Fails when the records would be numbered past
    /// [`MAX_SEQUENCE_NUMBER`].
    pub fn last_sequence(&self) -> Result<SequenceNumber, CoreError> {
        let sequence = self.sequence();
        let count = self.count();
        match sequence.checked_add(u64::from(count)) {
            Some(end) if end <= MAX_SEQUENCE_NUMBER + 1 => Ok(end.saturating_sub(1)),
            _ => Err(CoreError::SequenceOverflow { sequence, count }),
        }
    }

    /// Decodes every record and checks the sequence range without
    /// applying anything.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.last_sequence()?;
        self.iterate(&mut Discard)
    }

    /// Applies this batch to `memtable`, numbering records from
    /// [`sequence`](Self::sequence).
    ///
    /// A batch whose sequence range overflows is rejected before any
    /// record reaches the memtable.
    pub fn insert_into(&self, memtable: &MemTable) -> Result<(), CoreError> {
        self.last_sequence()?;
        let mut inserter = MemTableInserter::new(self.sequence(), memtable);
        self.iterate(&mut inserter)
    }
}

struct Discard;

impl BatchHandler for Discard {
    fn put(&mut self, _key: &[u8], _value: &[u8]) {}

    fn delete(&mut self, _key: &[u8]) {}
}

/// Replay visitor that writes into a [`MemTable`].
///
/// Record `i` of a batch gets sequence `batch.sequence() + i`.
pub struct MemTableInserter<'a> {
    sequence: SequenceNumber,
    memtable: &'a MemTable,
}

impl<'a> MemTableInserter<'a> {
    pub fn new(sequence: SequenceNumber, memtable: &'a MemTable) -> Self {
        Self { sequence, memtable }
    }

    /// Sequence the next record will get.
    pub fn next_sequence(&self) -> SequenceNumber {
        self.sequence
    }
}

impl BatchHandler for MemTableInserter<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.memtable
            .add(self.sequence, ValueType::Value, key, value);
        self.sequence = self.sequence.wrapping_add(1);
    }

    fn delete(&mut self, key: &[u8]) {
        self.memtable.add(self.sequence, ValueType::Deletion, key, &[]);
        self.sequence = self.sequence.wrapping_add(1);
    }
}
