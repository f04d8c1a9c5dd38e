//! Error types for kvlog core.

use kvlog_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in kvlog core operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The snapshot file is corrupted or invalid.
    ///
    /// Unlike a torn WAL tail, a broken snapshot is a hard error: the store
    /// refuses to open rather than silently discarding committed data.
    #[error("snapshot corrupt: {message}")]
    SnapshotCorrupt {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected in the snapshot.
    #[error("checksum mismatch: stored {stored:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the file.
        stored: u32,
        /// Checksum computed over the bytes read.
        computed: u32,
    },

    /// The store has been closed.
    #[error("store is closed")]
    StoreClosed,

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the argument issue.
        message: String,
    },
}

impl StoreError {
    /// Creates a snapshot corruption error.
    pub fn snapshot_corrupt(message: impl Into<String>) -> Self {
        Self::SnapshotCorrupt {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
