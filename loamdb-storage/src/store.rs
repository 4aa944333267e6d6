//! Durable storage: log recovery and the batch write path.

use crate::error::StorageError;
use loamdb_core::{LookupResult, MemTable, SequenceNumber, WriteBatch, BATCH_HEADER_SIZE};
use loamdb_wal::{list_logs, log_file_path, CorruptionLog, LogReader, LogWriter};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// When log writes are forced to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Sync after every write (safest, slowest).
    #[default]
    EveryWrite,
    /// Sync after N writes.
    EveryN(u32),
    /// Never sync automatically (caller must call sync).
    Never,
}

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding the log files.
    pub dir: PathBuf,
    pub sync_policy: SyncPolicy,
    /// Verify record checksums during recovery.
    pub verify_checksums: bool,
    /// Fail recovery on any corruption instead of skipping it.
    pub paranoid_checks: bool,
    /// Keep appending to the newest log when it ends cleanly.
    pub reuse_logs: bool,
}

impl StorageConfig {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            sync_policy: SyncPolicy::default(),
            verify_checksums: true,
            paranoid_checks: false,
            reuse_logs: false,
        }
    }

    pub fn with_sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    pub fn with_paranoid_checks(mut self, paranoid: bool) -> Self {
        self.paranoid_checks = paranoid;
        self
    }

    pub fn with_reuse_logs(mut self, reuse: bool) -> Self {
        self.reuse_logs = reuse;
        self
    }
}

/// What recovery found when the storage was opened.
#[derive(Debug, Clone, Default)]
pub struct RecoveryResult {
    /// Number of log files replayed.
    pub logs_replayed: u64,
    /// Batches applied to the memtable.
    pub batches_applied: u64,
    /// Batches that failed to decode and were skipped.
    pub batches_skipped: u64,
    /// Bytes the log reader dropped as corrupted.
    pub dropped_bytes: u64,
    /// Number of corruption reports across all logs.
    pub corruption_events: u64,
    /// Highest sequence number recovered.
    pub last_sequence: SequenceNumber,
}

/// I/O statistics for the write path.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageStats {
    /// Total bytes handed to the log.
    pub bytes_written: u64,
    /// Total batch writes.
    pub writes: u64,
    /// Total syncs.
    pub fsyncs: u64,
}

/// Outcome of replaying one log file.
struct LogReplay {
    dropped_bytes: u64,
    /// The file ends exactly after its last intact record.
    ends_cleanly: bool,
}

struct ActiveLog {
    /// Buffered so each physical record's header and fragment reach the
    /// file in one write.
    writer: LogWriter<BufWriter<File>>,
    writes_since_sync: u64,
}

impl ActiveLog {
    fn sync(&mut self) -> Result<(), StorageError> {
        self.writer.flush()?;
        self.writer.get_ref().get_ref().sync_data()?;
        self.writes_since_sync = 0;
        Ok(())
    }
}

/// Log-backed storage with an in-memory table.
///
/// Writers are serialized by a mutex around the active log.
pub struct Storage {
    config: StorageConfig,

    /// Active log; `None` once closed.
    log: Mutex<Option<ActiveLog>>,
    log_number: u64,

    memtable: MemTable,
    last_sequence: AtomicU64,
    recovery: RecoveryResult,

    stats_bytes_written: AtomicU64,
    stats_writes: AtomicU64,
    stats_fsyncs: AtomicU64,
}

impl Storage {
    /// Opens storage in the configured directory, replaying existing logs.
    pub fn open(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.dir)?;

        let memtable = MemTable::new();
        let logs = list_logs(&config.dir)?;
        let mut recovery = RecoveryResult::default();
        let mut newest_ends_cleanly = false;

        for (number, path) in &logs {
            let replay = replay_log(&config, *number, path, &memtable, &mut recovery)?;
            recovery.logs_replayed += 1;
            newest_ends_cleanly = replay.dropped_bytes == 0 && replay.ends_cleanly;
        }

        let (log_number, writer) = match logs.last() {
            Some((number, path)) if config.reuse_logs && newest_ends_cleanly => {
                let file = OpenOptions::new().append(true).open(path)?;
                let len = file.metadata()?.len();
                tracing::info!("Reusing log {} at offset {}", number, len);
                (*number, LogWriter::with_offset(BufWriter::new(file), len))
            }
            last => {
                let number = last.map(|(n, _)| n + 1).unwrap_or(1);
                let file = OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(log_file_path(&config.dir, number))?;
                tracing::debug!("Created log {}", number);
                (number, LogWriter::new(BufWriter::new(file)))
            }
        };

        tracing::info!(
            "Storage recovered: {} logs, {} batches applied, {} skipped, {} bytes dropped, last_sequence={}",
            recovery.logs_replayed,
            recovery.batches_applied,
            recovery.batches_skipped,
            recovery.dropped_bytes,
            recovery.last_sequence
        );

        Ok(Self {
            last_sequence: AtomicU64::new(recovery.last_sequence),
            config,
            log: Mutex::new(Some(ActiveLog {
                writer,
                writes_since_sync: 0,
            })),
            log_number,
            memtable,
            recovery,
            stats_bytes_written: AtomicU64::new(0),
            stats_writes: AtomicU64::new(0),
            stats_fsyncs: AtomicU64::new(0),
        })
    }

    /// Appends `batch` to the log and applies it to the memtable.
    ///
    /// The batch is stamped with the next sequence number, which is
    /// returned. Records get consecutive sequences from there. A batch
    /// that does not decode is rejected before anything is logged.
    ///
    /// If appending or syncing fails the log is closed, and later calls
    /// return [`StorageError::Closed`].
    pub fn write(&self, batch: &mut WriteBatch) -> Result<SequenceNumber, StorageError> {
        let mut guard = self.log.lock();
        let log = guard.as_mut().ok_or(StorageError::Closed)?;

        let first = self.last_sequence.load(Ordering::SeqCst) + 1;
        batch.set_sequence(first);
        batch.validate()?;
        let last = batch.last_sequence()?;

        if let Err(e) = self.append(log, batch) {
            tracing::error!("Write to log {} failed, closing it: {}", self.log_number, e);
            guard.take();
            return Err(e);
        }

        batch.insert_into(&self.memtable)?;
        self.last_sequence.store(last, Ordering::SeqCst);

        Ok(first)
    }

    /// Adds one record to the active log and syncs per policy.
    fn append(&self, log: &mut ActiveLog, batch: &WriteBatch) -> Result<(), StorageError> {
        log.writer.add_record(batch.contents())?;
        log.writes_since_sync += 1;

        self.stats_bytes_written
            .fetch_add(batch.approximate_size() as u64, Ordering::Relaxed);
        self.stats_writes.fetch_add(1, Ordering::Relaxed);

        let sync = match self.config.sync_policy {
            SyncPolicy::EveryWrite => true,
            SyncPolicy::EveryN(n) => log.writes_since_sync >= u64::from(n),
            SyncPolicy::Never => false,
        };
        if sync {
            log.sync()?;
            self.stats_fsyncs.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<SequenceNumber, StorageError> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(&mut batch)
    }

    pub fn delete(&self, key: &[u8]) -> Result<SequenceNumber, StorageError> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(&mut batch)
    }

    /// Current value of `key`, if it exists and is not deleted.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.memtable.get(key) {
            Some(LookupResult::Value(value)) => Some(value),
            Some(LookupResult::Deleted) | None => None,
        }
    }

    /// Forces the active log to stable storage. A failed sync closes the
    /// log.
    pub fn sync(&self) -> Result<(), StorageError> {
        let mut guard = self.log.lock();
        let log = guard.as_mut().ok_or(StorageError::Closed)?;
        if let Err(e) = log.sync() {
            tracing::error!("Sync of log {} failed, closing it: {}", self.log_number, e);
            guard.take();
            return Err(e);
        }
        self.stats_fsyncs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Syncs and closes the active log. Later writes fail with
    /// [`StorageError::Closed`].
    pub fn close(&self) -> Result<(), StorageError> {
        let mut guard = self.log.lock();
        if let Some(mut log) = guard.take() {
            log.sync()?;
            self.stats_fsyncs.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Closed log {}", self.log_number);
        }
        Ok(())
    }

    pub fn last_sequence(&self) -> SequenceNumber {
        self.last_sequence.load(Ordering::SeqCst)
    }

    /// Number of the log new writes go to.
    pub fn log_number(&self) -> u64 {
        self.log_number
    }

    pub fn memtable(&self) -> &MemTable {
        &self.memtable
    }

    pub fn recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            bytes_written: self.stats_bytes_written.load(Ordering::Relaxed),
            writes: self.stats_writes.load(Ordering::Relaxed),
            fsyncs: self.stats_fsyncs.load(Ordering::Relaxed),
        }
    }
}

/// Replays one log file into `memtable`.
fn replay_log(
    config: &StorageConfig,
    number: u64,
    path: &Path,
    memtable: &MemTable,
    recovery: &mut RecoveryResult,
) -> Result<LogReplay, StorageError> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let corruption = CorruptionLog::new();
    let mut reader = LogReader::new(
        BufReader::new(file),
        Some(Box::new(corruption.clone())),
        config.verify_checksums,
        0,
    );

    let mut records = 0u64;
    let mut end_offset = 0u64;
    // Records too short to hold a batch header: (count, bytes).
    let mut too_small = (0u64, 0u64);

    while let Some(record) = reader.read_record()?.map(<[u8]>::to_vec) {
        records += 1;
        end_offset = reader.last_record_offset() + 1;

        if record.len() < BATCH_HEADER_SIZE {
            tracing::warn!(
                "Dropping {} byte record in log {}: too small for a batch",
                record.len(),
                number
            );
            too_small.0 += 1;
            too_small.1 += record.len() as u64;
            continue;
        }

        let batch = WriteBatch::from_contents(&record)?;
        let applied = batch
            .insert_into(memtable)
            .and_then(|()| batch.last_sequence());

        match applied {
            Ok(last) => {
                recovery.batches_applied += 1;
                recovery.last_sequence = recovery.last_sequence.max(last);
            }
            Err(e) if e.is_corruption() && !config.paranoid_checks => {
                tracing::warn!(
                    "Skipping batch at sequence {} in log {}: {}",
                    batch.sequence(),
                    number,
                    e
                );
                recovery.batches_skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let dropped_bytes = corruption.dropped_bytes() + too_small.1;
    let events = corruption.len() as u64 + too_small.0;
    recovery.dropped_bytes += dropped_bytes;
    recovery.corruption_events += events;

    if config.paranoid_checks && events > 0 {
        return Err(StorageError::Corruption(format!(
            "log {}: {} bytes dropped ({} reports)",
            number, dropped_bytes, events
        )));
    }

    tracing::debug!(
        "Replayed log {}: {} records, {} bytes dropped",
        number,
        records,
        dropped_bytes
    );

    Ok(LogReplay {
        dropped_bytes,
        ends_cleanly: end_offset == file_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use loamdb_core::{CoreError, MAX_SEQUENCE_NUMBER};
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn open(dir: &Path) -> Storage {
        Storage::open(StorageConfig::new(dir)).unwrap()
    }

    fn log_path(dir: &Path, number: u64) -> PathBuf {
        log_file_path(dir, number)
    }

    /// Writes raw logical records to a new log file.
    fn write_raw_log(dir: &Path, number: u64, records: &[&[u8]]) {
        fs::create_dir_all(dir).unwrap();
        let file = File::create(log_path(dir, number)).unwrap();
        let mut writer = LogWriter::new(BufWriter::new(file));
        for record in records {
            writer.add_record(record).unwrap();
        }
        writer.flush().unwrap();
    }

    fn batch(sequence: SequenceNumber, puts: &[(&str, &str)]) -> WriteBatch {
        let mut batch = WriteBatch::new();
        batch.set_sequence(sequence);
        for (k, v) in puts {
            batch.put(k.as_bytes(), v.as_bytes());
        }
        batch
    }

    #[test]
    fn test_open_empty_dir() {
        let dir = TempDir::new().unwrap();
        let storage = open(dir.path());

        assert_eq!(storage.last_sequence(), 0);
        assert_eq!(storage.log_number(), 1);
        assert_eq!(storage.recovery().logs_replayed, 0);
        assert!(log_path(dir.path(), 1).exists());
        assert!(storage.memtable().is_empty());
    }

    #[test]
    fn test_put_get_delete() {
        let dir = TempDir::new().unwrap();
        let storage = open(dir.path());

        assert_eq!(storage.put(b"k1", b"v1").unwrap(), 1);
        assert_eq!(storage.put(b"k2", b"v2").unwrap(), 2);
        assert_eq!(storage.get(b"k1"), Some(b"v1".to_vec()));

        assert_eq!(storage.delete(b"k1").unwrap(), 3);
        assert_eq!(storage.get(b"k1"), None);
        assert_eq!(storage.get(b"k2"), Some(b"v2".to_vec()));
        assert_eq!(storage.last_sequence(), 3);
    }

    #[test]
    fn test_batch_gets_consecutive_sequences() {
        let dir = TempDir::new().unwrap();
        let storage = open(dir.path());
        storage.put(b"before", b"x").unwrap();

        let mut batch = WriteBatch::new();
        batch.put(b"a", b"1");
        batch.put(b"b", b"2");
        batch.delete(b"before");

        let first = storage.write(&mut batch).unwrap();
        assert_eq!(first, 2);
        assert_eq!(batch.sequence(), 2);
        assert_eq!(storage.last_sequence(), 4);
        assert_eq!(storage.memtable().max_sequence(), 4);
        assert_eq!(storage.get(b"before"), None);
    }

    #[test]
    fn test_empty_batch_keeps_last_sequence() {
        let dir = TempDir::new().unwrap();
        let storage = open(dir.path());
        storage.put(b"a", b"1").unwrap();

        let first = storage.write(&mut WriteBatch::new()).unwrap();
        assert_eq!(first, 2);
        assert_eq!(storage.last_sequence(), 1);
        assert_eq!(storage.put(b"b", b"2").unwrap(), 2);
    }

    #[test]
    fn test_reopen_recovers_state() {
        let dir = TempDir::new().unwrap();
        {
            let storage = open(dir.path());
            storage.put(b"k1", b"v1").unwrap();
            storage.put(b"k2", b"v2").unwrap();
            storage.delete(b"k1").unwrap();
            storage.close().unwrap();
        }

        let storage = open(dir.path());
        let recovery = storage.recovery();
        assert_eq!(recovery.logs_replayed, 1);
        assert_eq!(recovery.batches_applied, 3);
        assert_eq!(recovery.dropped_bytes, 0);
        assert_eq!(recovery.last_sequence, 3);

        assert_eq!(storage.get(b"k1"), None);
        assert_eq!(storage.get(b"k2"), Some(b"v2".to_vec()));
        assert_eq!(storage.last_sequence(), 3);
        assert_eq!(storage.log_number(), 2);

        // Sequences continue after the recovered ones.
        assert_eq!(storage.put(b"k3", b"v3").unwrap(), 4);
        storage.close().unwrap();

        let storage = open(dir.path());
        assert_eq!(storage.recovery().logs_replayed, 2);
        assert_eq!(storage.get(b"k3"), Some(b"v3".to_vec()));
        assert_eq!(storage.last_sequence(), 4);
    }

    #[test]
    fn test_reuse_logs() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::new(dir.path()).with_reuse_logs(true);
        {
            let storage = Storage::open(config.clone()).unwrap();
            storage.put(b"a", b"1").unwrap();
            storage.close().unwrap();
        }
        {
            let storage = Storage::open(config.clone()).unwrap();
            assert_eq!(storage.log_number(), 1);
            storage.put(b"b", b"2").unwrap();
            storage.close().unwrap();
        }

        let storage = Storage::open(config).unwrap();
        assert_eq!(storage.log_number(), 1);
        assert_eq!(storage.recovery().batches_applied, 2);
        assert_eq!(storage.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(storage.get(b"b"), Some(b"2".to_vec()));
        assert!(!log_path(dir.path(), 2).exists());
    }

    #[test]
    fn test_torn_tail_is_tolerated() {
        let dir = TempDir::new().unwrap();
        {
            let storage = open(dir.path());
            storage.put(b"a", b"1").unwrap();
            storage.put(b"b", b"2").unwrap();
            storage.put(b"c", b"3").unwrap();
            storage.close().unwrap();
        }

        let path = log_path(dir.path(), 1);
        let len = fs::metadata(&path).unwrap().len();
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(len - 3)
            .unwrap();

        let config = StorageConfig::new(dir.path()).with_reuse_logs(true);
        let storage = Storage::open(config).unwrap();
        assert_eq!(storage.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(storage.get(b"b"), Some(b"2".to_vec()));
        assert_eq!(storage.get(b"c"), None);
        assert_eq!(storage.recovery().dropped_bytes, 0);
        assert_eq!(storage.last_sequence(), 2);

        // The torn log is not appended to.
        assert_eq!(storage.log_number(), 2);
    }

    #[test]
    fn test_corrupted_batch_is_reported_and_skipped() {
        let dir = TempDir::new().unwrap();
        let b1 = batch(1, &[("a", "1")]);
        let b2 = batch(2, &[("b", "2")]);
        let b3 = batch(3, &[("c", "3")]);
        write_raw_log(dir.path(), 1, &[b1.contents(), b2.contents(), b3.contents()]);

        // Flip a byte inside the second record's payload.
        let path = log_path(dir.path(), 1);
        let mut data = fs::read(&path).unwrap();
        let second = 7 + b1.contents().len();
        data[second + 7 + 13] ^= 0x20;
        fs::write(&path, &data).unwrap();

        let storage = open(dir.path());
        assert_eq!(storage.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(storage.get(b"b"), None);
        assert_eq!(storage.get(b"c"), Some(b"3".to_vec()));

        let recovery = storage.recovery();
        assert_eq!(recovery.batches_applied, 2);
        assert_eq!(recovery.corruption_events, 1);
        assert_eq!(recovery.dropped_bytes, (7 + b2.contents().len()) as u64);
        assert_eq!(recovery.last_sequence, 3);
    }

    #[test]
    fn test_paranoid_checks_fail_on_corruption() {
        let dir = TempDir::new().unwrap();
        let b1 = batch(1, &[("a", "1")]);
        write_raw_log(dir.path(), 1, &[b1.contents()]);

        let path = log_path(dir.path(), 1);
        let mut data = fs::read(&path).unwrap();
        data[0] ^= 0xff;
        fs::write(&path, &data).unwrap();

        let config = StorageConfig::new(dir.path()).with_paranoid_checks(true);
        let err = Storage::open(config).err().unwrap();
        assert!(matches!(err, StorageError::Corruption(_)));
        assert!(err.is_corruption());

        // Without paranoid checks the damaged record is skipped.
        let storage = open(dir.path());
        assert_eq!(storage.recovery().corruption_events, 1);
        assert!(storage.memtable().is_empty());
    }

    #[test]
    fn test_checksums_not_verified_when_disabled() {
        let dir = TempDir::new().unwrap();
        let b1 = batch(1, &[("a", "1")]);
        write_raw_log(dir.path(), 1, &[b1.contents()]);

        let path = log_path(dir.path(), 1);
        let mut data = fs::read(&path).unwrap();
        data[0] ^= 0xff;
        fs::write(&path, &data).unwrap();

        let config = StorageConfig::new(dir.path()).with_verify_checksums(false);
        let storage = Storage::open(config).unwrap();
        assert_eq!(storage.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(storage.recovery().corruption_events, 0);
    }

    #[test]
    fn test_record_too_small_is_reported() {
        let dir = TempDir::new().unwrap();
        let b1 = batch(7, &[("a", "1"), ("b", "2")]);
        write_raw_log(dir.path(), 3, &[b"tiny", b1.contents()]);

        let storage = open(dir.path());
        assert_eq!(storage.recovery().corruption_events, 1);
        assert_eq!(storage.recovery().dropped_bytes, 4);
        assert_eq!(storage.last_sequence(), 8);
        assert_eq!(storage.log_number(), 4);
        assert_eq!(storage.get(b"b"), Some(b"2".to_vec()));
        drop(storage);

        let config = StorageConfig::new(dir.path()).with_paranoid_checks(true);
        assert!(matches!(
            Storage::open(config),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_wrong_count_batch() {
        let dir = TempDir::new().unwrap();
        let b1 = batch(1, &[("a", "1")]);
        let mut bad = batch(2, &[("b", "2"), ("c", "3")]).contents().to_vec();
        bad[8] = 5;
        let b3 = batch(4, &[("d", "4")]);
        write_raw_log(dir.path(), 1, &[b1.contents(), &bad, b3.contents()]);

        let storage = open(dir.path());
        assert_eq!(storage.recovery().batches_applied, 2);
        assert_eq!(storage.recovery().batches_skipped, 1);
        assert_eq!(storage.get(b"d"), Some(b"4".to_vec()));
        assert_eq!(storage.last_sequence(), 4);
        // Records ahead of the count check were already applied.
        assert_eq!(storage.get(b"b"), Some(b"2".to_vec()));
        drop(storage);

        let config = StorageConfig::new(dir.path()).with_paranoid_checks(true);
        let err = Storage::open(config).err().unwrap();
        assert!(matches!(
            err,
            StorageError::Core(CoreError::WrongCount {
                declared: 5,
                found: 2
            })
        ));
    }

    #[test]
    fn test_write_rejects_malformed_batch() {
        let dir = TempDir::new().unwrap();
        {
            let storage = open(dir.path());
            let mut contents = batch(0, &[("a", "1"), ("b", "2")]).contents().to_vec();
            contents[8] = 5;
            let mut bad = WriteBatch::from_contents(&contents).unwrap();

            let err = storage.write(&mut bad).unwrap_err();
            assert!(matches!(
                err,
                StorageError::Core(CoreError::WrongCount {
                    declared: 5,
                    found: 2
                })
            ));
            assert_eq!(storage.last_sequence(), 0);
            assert_eq!(storage.get(b"a"), None);
            assert_eq!(storage.stats().writes, 0);

            // The rejected batch consumed no sequence numbers.
            assert_eq!(storage.put(b"c", b"3").unwrap(), 1);
            storage.close().unwrap();
        }

        let config = StorageConfig::new(dir.path()).with_paranoid_checks(true);
        let storage = Storage::open(config).unwrap();
        assert_eq!(storage.recovery().batches_applied, 1);
        assert_eq!(storage.get(b"a"), None);
        assert_eq!(storage.get(b"c"), Some(b"3".to_vec()));
    }

    #[test]
    fn test_sequence_overflow_batch_is_skipped() {
        let dir = TempDir::new().unwrap();
        let b1 = batch(1, &[("a", "1")]);
        let b2 = batch(u64::MAX, &[("b", "2"), ("c", "3")]);
        write_raw_log(dir.path(), 1, &[b1.contents(), b2.contents()]);

        let storage = open(dir.path());
        assert_eq!(storage.recovery().batches_applied, 1);
        assert_eq!(storage.recovery().batches_skipped, 1);
        assert_eq!(storage.last_sequence(), 1);
        assert_eq!(storage.get(b"b"), None);
        assert_eq!(storage.put(b"d", b"4").unwrap(), 2);
        drop(storage);

        let config = StorageConfig::new(dir.path()).with_paranoid_checks(true);
        let err = Storage::open(config).err().unwrap();
        assert!(matches!(
            err,
            StorageError::Core(CoreError::SequenceOverflow {
                sequence: u64::MAX,
                count: 2
            })
        ));
    }

    #[test]
    fn test_write_at_end_of_sequence_range() {
        let dir = TempDir::new().unwrap();
        let b1 = batch(MAX_SEQUENCE_NUMBER - 1, &[("a", "1"), ("b", "2")]);
        write_raw_log(dir.path(), 1, &[b1.contents()]);

        let storage = open(dir.path());
        assert_eq!(storage.last_sequence(), MAX_SEQUENCE_NUMBER);

        let err = storage.put(b"c", b"3").unwrap_err();
        assert!(matches!(
            err,
            StorageError::Core(CoreError::SequenceOverflow { .. })
        ));
        assert_eq!(storage.get(b"c"), None);
        assert_eq!(storage.last_sequence(), MAX_SEQUENCE_NUMBER);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_append_closes_log() {
        let dir = TempDir::new().unwrap();
        let storage = open(dir.path());
        storage.put(b"a", b"1").unwrap();

        // Every write to /dev/full fails with ENOSPC.
        let full = OpenOptions::new().write(true).open("/dev/full").unwrap();
        *storage.log.lock() = Some(ActiveLog {
            writer: LogWriter::new(BufWriter::new(full)),
            writes_since_sync: 0,
        });

        let err = storage.put(b"b", b"2").unwrap_err();
        assert!(matches!(err, StorageError::Wal(_)));
        assert_eq!(storage.last_sequence(), 1);
        assert_eq!(storage.get(b"b"), None);

        assert!(matches!(storage.put(b"c", b"3"), Err(StorageError::Closed)));
        assert!(matches!(storage.sync(), Err(StorageError::Closed)));
        storage.close().unwrap();
    }

    #[test]
    fn test_write_after_close() {
        let dir = TempDir::new().unwrap();
        let storage = open(dir.path());
        storage.close().unwrap();
        storage.close().unwrap();

        assert!(matches!(storage.put(b"k", b"v"), Err(StorageError::Closed)));
        assert!(matches!(storage.sync(), Err(StorageError::Closed)));
    }

    #[test]
    fn test_sync_policy_stats() {
        let dir = TempDir::new().unwrap();

        let storage = open(&dir.path().join("every"));
        for i in 0..4u8 {
            storage.put(&[i], b"v").unwrap();
        }
        let stats = storage.stats();
        assert_eq!(stats.writes, 4);
        assert_eq!(stats.fsyncs, 4);
        assert!(stats.bytes_written > 0);

        let config = StorageConfig::new(dir.path().join("every_n"))
            .with_sync_policy(SyncPolicy::EveryN(2));
        let storage = Storage::open(config).unwrap();
        for i in 0..5u8 {
            storage.put(&[i], b"v").unwrap();
        }
        assert_eq!(storage.stats().fsyncs, 2);

        let config =
            StorageConfig::new(dir.path().join("never")).with_sync_policy(SyncPolicy::Never);
        let storage = Storage::open(config).unwrap();
        storage.put(b"k", b"v").unwrap();
        assert_eq!(storage.stats().fsyncs, 0);
        storage.sync().unwrap();
        assert_eq!(storage.stats().fsyncs, 1);
    }

    #[test]
    fn test_large_values_span_blocks() {
        let dir = TempDir::new().unwrap();
        let big = vec![b'v'; 100_000];
        {
            let storage = open(dir.path());
            storage.put(b"big", &big).unwrap();
            storage.put(b"small", b"s").unwrap();
            storage.close().unwrap();
        }

        let storage = open(dir.path());
        assert_eq!(storage.get(b"big"), Some(big));
        assert_eq!(storage.get(b"small"), Some(b"s".to_vec()));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Put(u8, Vec<u8>),
        Delete(u8),
        Reopen,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            6 => (0u8..16, prop::collection::vec(any::<u8>(), 0..64))
                .prop_map(|(k, v)| Op::Put(k, v)),
            2 => (0u8..16).prop_map(Op::Delete),
            1 => Just(Op::Reopen),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_reopen_matches_model(
            ops in prop::collection::vec(op_strategy(), 1..40),
            reuse in any::<bool>()
        ) {
            let dir = TempDir::new().unwrap();
            let config = StorageConfig::new(dir.path())
                .with_sync_policy(SyncPolicy::Never)
                .with_reuse_logs(reuse);
            let mut storage = Storage::open(config.clone()).unwrap();
            let mut model: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
            let mut writes = 0u64;

            for op in ops {
                match op {
                    Op::Put(k, v) => {
                        storage.put(&[k], &v).unwrap();
                        model.insert(k, v);
                        writes += 1;
                    }
                    Op::Delete(k) => {
                        storage.delete(&[k]).unwrap();
                        model.remove(&k);
                        writes += 1;
                    }
                    Op::Reopen => {
                        storage.close().unwrap();
                        storage = Storage::open(config.clone()).unwrap();
                    }
                }
            }

            storage.close().unwrap();
            let storage = Storage::open(config).unwrap();
            prop_assert_eq!(storage.last_sequence(), writes);
            for k in 0u8..16 {
                prop_assert_eq!(storage.get(&[k]), model.get(&k).cloned());
            }
        }
    }
}
