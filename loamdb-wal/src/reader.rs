//! Log reader.
//!
//! Reassembles logical records from physical fragments. Corrupted or
//! malformed regions are skipped and reported; only I/O errors from the
//! underlying source are returned to the caller.

use std::io::{self, Read};

use bytes::Buf;

use crate::error::{DropReason, WalError};
use crate::format::{unmask_crc, RecordType};
use crate::reporter::Reporter;
use crate::{BLOCK_SIZE, HEADER_SIZE};

/// Reassembly state between physical records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// No partial logical record pending.
    Idle,
    /// A FIRST fragment was seen; payload is being assembled.
    Accumulating,
    /// Started mid-stream; orphan MIDDLE/LAST fragments are discarded
    /// without a report until the next record start.
    Resyncing,
}

enum PhysicalRecord {
    Fragment {
        record_type: RecordType,
        start: usize,
        len: usize,
        end_offset: u64,
    },
    Unknown {
        type_code: u8,
        len: usize,
    },
    /// Invalid or skipped record. Any reporting already happened.
    Bad,
    Eof,
}

enum Delivered {
    Fragment { start: usize, len: usize },
    Scratch,
}

/// Reads logical records from a log.
pub struct LogReader<R: Read> {
    source: R,
    reporter: Option<Box<dyn Reporter>>,
    verify_checksums: bool,

    backing: Box<[u8]>,
    buffer_start: usize,
    buffer_end: usize,
    /// Last read returned less than a full block.
    eof: bool,
    /// Source offset just past the end of the buffered block.
    end_of_buffer_offset: u64,

    initial_offset: u64,
    positioned: bool,
    last_record_offset: u64,

    state: ReaderState,
    scratch: Vec<u8>,
}

impl<R: Read> LogReader<R> {
    /// Creates a reader over `source`.
    ///
    /// Logical records ending before `initial_offset` are not returned.
    /// When `reporter` is set it is told about every dropped region.
    pub fn new(
        source: R,
        reporter: Option<Box<dyn Reporter>>,
        verify_checksums: bool,
        initial_offset: u64,
    ) -> Self {
        Self {
            source,
            reporter,
            verify_checksums,
            backing: vec![0u8; BLOCK_SIZE].into_boxed_slice(),
            buffer_start: 0,
            buffer_end: 0,
            eof: false,
            end_of_buffer_offset: 0,
            initial_offset,
            positioned: false,
            last_record_offset: 0,
            state: if initial_offset > 0 {
                ReaderState::Resyncing
            } else {
                ReaderState::Idle
            },
            scratch: Vec::new(),
        }
    }

    /// Reads the next logical record.
    ///
    /// The returned slice is valid until the next call. `Ok(None)` means the
    /// end of the log was reached.
    pub fn read_record(&mut self) -> Result<Option<&[u8]>, WalError> {
        if !self.positioned {
            self.positioned = true;
            if self.initial_offset > 0 {
                self.skip_to_initial_block()?;
            }
        }

        self.scratch.clear();
        if self.state == ReaderState::Accumulating {
            // An earlier call failed with an I/O error mid-record.
            self.state = ReaderState::Idle;
        }

        let delivered = loop {
            match self.read_physical_record()? {
                PhysicalRecord::Fragment {
                    record_type,
                    start,
                    len,
                    end_offset,
                } => {
                    if self.state == ReaderState::Resyncing {
                        match record_type {
                            RecordType::Middle => continue,
                            RecordType::Last => {
                                self.state = ReaderState::Idle;
                                continue;
                            }
                            _ => self.state = ReaderState::Idle,
                        }
                    }

                    match record_type {
                        RecordType::Full => {
                            if self.state == ReaderState::Accumulating {
                                self.drop_partial(DropReason::PartialRecord);
                            }
                            self.last_record_offset = end_offset - 1;
                            break Delivered::Fragment { start, len };
                        }
                        RecordType::First => {
                            if self.state == ReaderState::Accumulating {
                                self.drop_partial(DropReason::PartialRecord);
                            }
                            self.scratch
                                .extend_from_slice(&self.backing[start..start + len]);
                            self.state = ReaderState::Accumulating;
                        }
                        RecordType::Middle => {
                            if self.state == ReaderState::Accumulating {
                                self.scratch
                                    .extend_from_slice(&self.backing[start..start + len]);
                            } else {
                                self.report(len as u64, DropReason::MissingStart);
                            }
                        }
                        RecordType::Last => {
                            if self.state == ReaderState::Accumulating {
                                self.scratch
                                    .extend_from_slice(&self.backing[start..start + len]);
                                self.state = ReaderState::Idle;
                                self.last_record_offset = end_offset - 1;
                                break Delivered::Scratch;
                            }
                            self.report(len as u64, DropReason::MissingStart);
                        }
                        RecordType::Zero => self.drop_unknown(RecordType::Zero as u8, len),
                    }
                }
                PhysicalRecord::Unknown { type_code, len } => {
                    self.drop_unknown(type_code, len);
                }
                PhysicalRecord::Bad => {
                    if self.state == ReaderState::Accumulating {
                        self.drop_partial(DropReason::ErrorInMiddleOfRecord);
                    }
                }
                PhysicalRecord::Eof => {
                    if self.state == ReaderState::Accumulating {
                        self.drop_partial(DropReason::PartialRecord);
                    }
                    self.state = ReaderState::Idle;
                    return Ok(None);
                }
            }
        };

        Ok(Some(match delivered {
            Delivered::Fragment { start, len } => &self.backing[start..start + len],
            Delivered::Scratch => &self.scratch,
        }))
    }

    /// Offset of the final byte of the record most recently returned by
    /// [`read_record`](Self::read_record).
    pub fn last_record_offset(&self) -> u64 {
        self.last_record_offset
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn records(self) -> Records<R> {
        Records { reader: self }
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    fn skip_to_initial_block(&mut self) -> Result<(), WalError> {
        let block_size = BLOCK_SIZE as u64;
        let offset_in_block = self.initial_offset % block_size;
        let mut block_start = self.initial_offset - offset_in_block;

        // No record can start inside a trailer.
        if offset_in_block > block_size - 6 {
            block_start += block_size;
        }

        self.end_of_buffer_offset = block_start;

        if block_start > 0 {
            let skipped = io::copy(&mut (&mut self.source).take(block_start), &mut io::sink())?;
            if skipped < block_start {
                self.eof = true;
                self.end_of_buffer_offset = skipped;
            }
            tracing::debug!(
                initial_offset = self.initial_offset,
                skipped,
                "Positioned log reader"
            );
        }
        Ok(())
    }

    fn read_physical_record(&mut self) -> Result<PhysicalRecord, WalError> {
        loop {
            if self.buffered() < HEADER_SIZE {
                if !self.eof {
                    // Whatever is left of a full block is trailer.
                    self.clear_buffer();
                    let read = self.read_block()?;
                    self.buffer_end = read;
                    self.end_of_buffer_offset += read as u64;
                    if read < BLOCK_SIZE {
                        self.eof = true;
                    }
                    continue;
                }
                // A truncated header at the end of the log is what a writer
                // that died mid-record leaves behind.
                self.clear_buffer();
                return Ok(PhysicalRecord::Eof);
            }

            let header = &self.backing[self.buffer_start..self.buffer_start + HEADER_SIZE];
            let mut cursor = header;
            let stored_crc = cursor.get_u32_le();
            let length = cursor.get_u16_le() as usize;
            let type_code = cursor.get_u8();

            if HEADER_SIZE + length > self.buffered() {
                let drop_size = self.buffered();
                self.clear_buffer();
                if !self.eof {
                    self.report(drop_size as u64, DropReason::BadRecordLength);
                    return Ok(PhysicalRecord::Bad);
                }
                // Payload cut short at the end of the log.
                return Ok(PhysicalRecord::Eof);
            }

            if type_code == RecordType::Zero as u8 && length == 0 {
                // Preallocated space that was never written.
                self.clear_buffer();
                return Ok(PhysicalRecord::Bad);
            }

            let record_size = HEADER_SIZE + length;

            if self.verify_checksums {
                let covered = &self.backing
                    [self.buffer_start + HEADER_SIZE - 1..self.buffer_start + record_size];
                if crc32c::crc32c(covered) != unmask_crc(stored_crc) {
                    self.buffer_start += record_size;
                    self.report(record_size as u64, DropReason::ChecksumMismatch);
                    return Ok(PhysicalRecord::Bad);
                }
            }

            let start = self.buffer_start + HEADER_SIZE;
            self.buffer_start += record_size;
            let end_offset = self.end_of_buffer_offset - self.buffered() as u64;

            if end_offset <= self.initial_offset {
                self.report(record_size as u64, DropReason::BelowInitialOffset);
                return Ok(PhysicalRecord::Bad);
            }

            return Ok(match RecordType::try_from(type_code) {
                Ok(record_type) => PhysicalRecord::Fragment {
                    record_type,
                    start,
                    len: length,
                    end_offset,
                },
                Err(_) => PhysicalRecord::Unknown {
                    type_code,
                    len: length,
                },
            });
        }
    }

    fn read_block(&mut self) -> Result<usize, WalError> {
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match self.source.read(&mut self.backing[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn buffered(&self) -> usize {
        self.buffer_end - self.buffer_start
    }

    fn clear_buffer(&mut self) {
        self.buffer_start = 0;
        self.buffer_end = 0;
    }

    fn drop_partial(&mut self, reason: DropReason) {
        let dropped = self.scratch.len() as u64;
        self.scratch.clear();
        self.state = ReaderState::Idle;
        self.report(dropped, reason);
    }

    fn drop_unknown(&mut self, type_code: u8, len: usize) {
        let mut dropped = len as u64;
        if self.state == ReaderState::Accumulating {
            dropped += self.scratch.len() as u64;
            self.scratch.clear();
        }
        self.state = ReaderState::Idle;
        self.report(dropped, DropReason::UnknownRecordType(type_code));
    }

    fn report(&mut self, bytes: u64, reason: DropReason) {
        if let Some(reporter) = self.reporter.as_mut() {
            reporter.corruption(bytes, &reason);
        }
    }
}

/// Owning iterator over the records of a [`LogReader`].
pub struct Records<R: Read> {
    reader: LogReader<R>,
}

impl<R: Read> Records<R> {
    pub fn last_record_offset(&self) -> u64 {
        self.reader.last_record_offset()
    }
}

impl<R: Read> Iterator for Records<R> {
    type Item = Result<Vec<u8>, WalError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record() {
            Ok(Some(record)) => Some(Ok(record.to_vec())),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
