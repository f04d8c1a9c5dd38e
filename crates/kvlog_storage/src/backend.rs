//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level byte store backing the write-ahead log.
///
/// Backends model the host filesystem as a collaborator with exactly the
/// primitives the log needs: positional reads for replay, appends for new
/// records, fsync for durability, and truncation for the clean-shutdown
/// protocol. They do not interpret the bytes they hold.
///
/// # Invariants
///
/// - `append` writes the whole buffer in one call and returns the offset
///   where it landed
/// - `read_at` returns exactly the bytes previously written at that offset
/// - after `sync` returns, all appended data survives process termination
/// - backends are `Send + Sync` so a log can be shared across threads
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the requested range
    /// extends beyond the current size, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data at the end of the storage and returns the offset where
    /// it was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Syncs all data and metadata to durable storage (fsync).
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes; this is where the next `append`
    /// will write.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Truncates the storage to `new_size` bytes, discarding everything
    /// after that offset.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` exceeds the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
