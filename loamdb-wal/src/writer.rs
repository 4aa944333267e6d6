//! Log writer.

use std::io::Write;

use bytes::BufMut;

use crate::error::WalError;
use crate::format::{mask_crc, record_checksum, RecordType};
use crate::{BLOCK_SIZE, HEADER_SIZE};

const ZEROES: [u8; HEADER_SIZE - 1] = [0; HEADER_SIZE - 1];

/// Appends logical records to a log, fragmenting them across blocks.
///
/// Each physical record is written and flushed as soon as it is framed.
/// Making the data durable (fsync) is up to the owner of `dest`.
pub struct LogWriter<W: Write> {
    dest: W,
    block_offset: usize,
}

impl<W: Write> LogWriter<W> {
    /// Creates a writer for an empty destination.
    pub fn new(dest: W) -> Self {
        Self {
            dest,
            block_offset: 0,
        }
    }

    /// Creates a writer that appends to a destination already holding
    /// `dest_length` bytes of log data.
    pub fn with_offset(dest: W, dest_length: u64) -> Self {
        Self {
            dest,
            block_offset: (dest_length % BLOCK_SIZE as u64) as usize,
        }
    }

    /// Appends one logical record.
    pub fn add_record(&mut self, payload: &[u8]) -> Result<(), WalError> {
        let mut remaining = payload;
        let mut begin = true;

        // An empty payload still produces one zero-length FULL record.
        loop {
            let leftover = BLOCK_SIZE - self.block_offset;
            if leftover < HEADER_SIZE {
                if leftover > 0 {
                    self.dest.write_all(&ZEROES[..leftover])?;
                }
                self.block_offset = 0;
            }

            let avail = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_len = remaining.len().min(avail);
            let end = fragment_len == remaining.len();

            let record_type = match (begin, end) {
                (true, true) => RecordType::Full,
                (true, false) => RecordType::First,
                (false, true) => RecordType::Last,
                (false, false) => RecordType::Middle,
            };

            self.emit_physical_record(record_type, &remaining[..fragment_len])?;
            remaining = &remaining[fragment_len..];
            begin = false;

            if end {
                return Ok(());
            }
        }
    }

    fn emit_physical_record(
        &mut self,
        record_type: RecordType,
        fragment: &[u8],
    ) -> Result<(), WalError> {
        debug_assert!(fragment.len() <= u16::MAX as usize);
        debug_assert!(self.block_offset + HEADER_SIZE + fragment.len() <= BLOCK_SIZE);

        let crc = mask_crc(record_checksum(record_type, fragment));

        let mut header = [0u8; HEADER_SIZE];
        let mut cursor = &mut header[..];
        cursor.put_u32_le(crc);
        cursor.put_u16_le(fragment.len() as u16);
        cursor.put_u8(record_type as u8);

        self.dest.write_all(&header)?;
        self.dest.write_all(fragment)?;
        self.dest.flush()?;

        self.block_offset += HEADER_SIZE + fragment.len();
        Ok(())
    }

    /// Offset of the next write within the current block.
    pub fn block_offset(&self) -> usize {
        self.block_offset
    }

    pub fn flush(&mut self) -> Result<(), WalError> {
        self.dest.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.dest
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.dest
    }

    pub fn into_inner(self) -> W {
        self.dest
    }
}
