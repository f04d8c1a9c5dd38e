//! Data directory management.
//!
//! This module handles the file system layout for a store:
//!
//! ```text
//! <data_dir>/
//! ├─ wal.log           # Write-ahead log
//! ├─ snapshot.dat      # Point-in-time snapshot of the map
//! └─ snapshot.dat.tmp  # Transient, only while a snapshot is being written
//! ```
//!
//! No other files are created or consulted.

use crate::error::StoreResult;
use std::fs;
use std::path::{Path, PathBuf};

/// File names within the data directory.
const WAL_FILE: &str = "wal.log";
const SNAPSHOT_FILE: &str = "snapshot.dat";
const SNAPSHOT_TEMP_FILE: &str = "snapshot.dat.tmp";

/// The store's data directory.
///
/// Creating a `DataDir` creates the directory (recursively) if it does not
/// exist. All path construction for the store's on-disk files goes through
/// here.
#[derive(Debug, Clone)]
pub struct DataDir {
    path: PathBuf,
}

impl DataDir {
    /// Opens or creates a data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, or if the path
    /// exists but is not a directory.
    pub fn open(path: &Path) -> StoreResult<Self> {
        fs::create_dir_all(path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Returns the path to the data directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the WAL file.
    #[must_use]
    pub fn wal_path(&self) -> PathBuf {
        self.path.join(WAL_FILE)
    }

    /// Returns the path to the snapshot file.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.path.join(SNAPSHOT_FILE)
    }

    /// Returns the path to the temporary snapshot file used for atomic
    /// replacement.
    #[must_use]
    pub fn snapshot_temp_path(&self) -> PathBuf {
        self.path.join(SNAPSHOT_TEMP_FILE)
    }

    /// Syncs the directory so that file creations and renames are durable.
    ///
    /// On Unix an fsync on the directory flushes its entries. Windows NTFS
    /// journals metadata operations, so the explicit fsync is skipped there.
    #[cfg(unix)]
    pub(crate) fn sync_directory(&self) -> StoreResult<()> {
        let dir = fs::File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub(crate) fn sync_directory(&self) -> StoreResult<()> {
        Ok(())
    }
}
