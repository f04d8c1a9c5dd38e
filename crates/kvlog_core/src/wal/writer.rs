//! The write-ahead log.

use crate::dir::DataDir;
use crate::error::StoreResult;
use crate::wal::reader::WalReader;
use crate::wal::record::{DecodeOutcome, Record};
use kvlog_storage::{FileBackend, StorageBackend, StorageError};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// The append-only write-ahead log.
///
/// All mutations are appended here, optionally fsynced, before the in-memory
/// map is touched; the append is the commit point. A single mutex serializes
/// appends, replay, truncation, and close, and is held across the disk write
/// and the fsync. Readers of the store never take this lock.
///
/// The backend sits behind an `Option` so that a closed log fails every
/// subsequent operation deterministically with [`StorageError::Closed`]
/// instead of tripping over a dangling file descriptor.
pub struct Wal {
    backend: Mutex<Option<Box<dyn StorageBackend>>>,
    sync_writes: bool,
}

impl Wal {
    /// Opens or creates the log file `wal.log` inside the data directory.
    ///
    /// An empty file is permitted and common: a fresh store, or one that
    /// shut down cleanly, starts with a zero-length log.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(dir: &DataDir, sync_writes: bool) -> StoreResult<Self> {
        let backend = FileBackend::open(&dir.wal_path())?;
        Ok(Self::with_backend(Box::new(backend), sync_writes))
    }

    /// Creates a log over an arbitrary backend.
    ///
    /// Used by tests to drive the log in memory or through fault-injecting
    /// wrappers.
    pub fn with_backend(backend: Box<dyn StorageBackend>, sync_writes: bool) -> Self {
        Self {
            backend: Mutex::new(Some(backend)),
            sync_writes,
        }
    }

    /// Appends a record and returns the offset where it was written.
    ///
    /// The record is fully materialized in memory first, then handed to the
    /// backend as a single write; with `sync_writes` the write is fsynced
    /// before this returns. Success here means the operation is durable and
    /// may be applied to the map.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded, the log is closed,
    /// or the write or fsync fails. On error nothing must be applied to the
    /// in-memory map.
    pub fn append(&self, record: &Record) -> StoreResult<u64> {
        let data = record.to_bytes()?;

        let mut guard = self.backend.lock();
        let backend = guard.as_mut().ok_or(StorageError::Closed)?;

        let offset = backend.append(&data)?;
        if self.sync_writes {
            backend.sync()?;
        }

        Ok(offset)
    }

    /// Replays the log from the start, invoking `apply` for each valid
    /// record with a known operation.
    ///
    /// Replay stops cleanly, without error, at the first torn or corrupt
    /// record: such a record was never acknowledged to any caller, and at
    /// most one can exist, at the tail. Records with unknown op codes are
    /// skipped for forward compatibility. Subsequent appends land at the end
    /// of the file regardless of where replay stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is closed, a genuine I/O error occurs,
    /// or `apply` returns an error (recovery is then aborted).
    pub fn replay<F>(&self, mut apply: F) -> StoreResult<()>
    where
        F: FnMut(&Record) -> StoreResult<()>,
    {
        let guard = self.backend.lock();
        let backend = guard.as_ref().ok_or(StorageError::Closed)?;

        let mut reader = WalReader::new(backend.as_ref())?;
        let mut applied = 0usize;
        loop {
            let offset = reader.position();
            match Record::read_from(&mut reader)? {
                DecodeOutcome::Record(record) => {
                    if record.operation().is_some() {
                        apply(&record)?;
                        applied += 1;
                    } else {
                        warn!(offset, op = record.op, "skipping record with unknown op code");
                    }
                }
                DecodeOutcome::EndOfLog => break,
                DecodeOutcome::Torn => {
                    warn!(offset, "torn record at tail, stopping replay");
                    break;
                }
                DecodeOutcome::Corrupt(corruption) => {
                    warn!(offset, %corruption, "invalid record, stopping replay");
                    break;
                }
            }
        }

        debug!(applied, "log replay complete");
        Ok(())
    }

    /// Truncates the log to zero length.
    ///
    /// Called only after a snapshot has been durably written; every record
    /// discarded here is covered by the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is closed or the truncation fails.
    pub fn truncate(&self) -> StoreResult<()> {
        let mut guard = self.backend.lock();
        let backend = guard.as_mut().ok_or(StorageError::Closed)?;
        backend.truncate(0)?;
        Ok(())
    }

    /// Syncs and closes the log. Idempotent.
    ///
    /// Every operation after a close fails with [`StorageError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the final fsync fails; the log is considered
    /// closed either way.
    pub fn close(&self) -> StoreResult<()> {
        let mut guard = self.backend.lock();
        if let Some(mut backend) = guard.take() {
            backend.sync()?;
        }
        Ok(())
    }

    /// Returns the current size of the log in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is closed.
    pub fn size(&self) -> StoreResult<u64> {
        let guard = self.backend.lock();
        let backend = guard.as_ref().ok_or(StorageError::Closed)?;
        Ok(backend.size()?)
    }
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal")
            .field("sync_writes", &self.sync_writes)
            .finish_non_exhaustive()
    }
}
