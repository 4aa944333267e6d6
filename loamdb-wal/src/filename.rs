//! Log file naming.
//!
//! Logs live in a single directory and are named `NNNNNN.log`, where the
//! number grows by one for each new log.

use std::path::{Path, PathBuf};

use crate::error::WalError;

const LOG_EXTENSION: &str = "log";

/// File name for log `number`, e.g. `000007.log`.
pub fn log_file_name(number: u64) -> String {
    format!("{:06}.{}", number, LOG_EXTENSION)
}

pub fn log_file_path(dir: impl AsRef<Path>, number: u64) -> PathBuf {
    dir.as_ref().join(log_file_name(number))
}

/// Parses a log number out of a file name. Returns `None` for anything that
/// is not a log file.
pub fn parse_log_number(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(".log")?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Lists log files in `dir`, ordered by log number.
pub fn list_logs(dir: impl AsRef<Path>) -> Result<Vec<(u64, PathBuf)>, WalError> {
    let mut logs = Vec::new();

    for entry in std::fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(number) = name.to_str().and_then(parse_log_number) {
            logs.push((number, entry.path()));
        }
    }

    logs.sort_by_key(|(number, _)| *number);
    Ok(logs)
}
