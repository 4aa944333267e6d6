//! Log scanning utilities.
//!
//! Reads a whole log without applying it, to check its health:
//! - Records that read back intact
//! - Regions dropped as corrupted, and why
//! - Where the last good record ends

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::WalError;
use crate::reader::LogReader;
use crate::reporter::{CorruptionEvent, CorruptionLog};

/// Result of a log scan.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Logical records read back.
    pub records: u64,
    /// Total payload bytes across those records.
    pub payload_bytes: u64,
    /// Bytes reported as dropped.
    pub dropped_bytes: u64,
    /// Every dropped region, in log order.
    pub corruptions: Vec<CorruptionEvent>,
    /// Offset of the final byte of the last good record, if any.
    pub last_record_offset: Option<u64>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.corruptions.is_empty()
    }
}

/// Scans the log at `path`.
pub fn scan_log(path: impl AsRef<Path>, verify_checksums: bool) -> Result<ScanReport, WalError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let corruption = CorruptionLog::new();
    let mut reader = LogReader::new(
        BufReader::new(file),
        Some(Box::new(corruption.clone())),
        verify_checksums,
        0,
    );

    let mut report = ScanReport::default();
    while let Some(record) = reader.read_record()? {
        report.records += 1;
        report.payload_bytes += record.len() as u64;
        report.last_record_offset = Some(reader.last_record_offset());
    }

    report.dropped_bytes = corruption.dropped_bytes();
    report.corruptions = corruption.events();

    if !report.is_clean() {
        tracing::warn!(
            path = %path.display(),
            dropped_bytes = report.dropped_bytes,
            corruptions = report.corruptions.len(),
            "Log scan found corruption"
        );
    }

    Ok(report)
}

/// Scans with checksum verification on.
pub fn verify_log(path: impl AsRef<Path>) -> Result<ScanReport, WalError> {
    scan_log(path, true)
}
