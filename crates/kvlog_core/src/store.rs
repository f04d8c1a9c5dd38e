//! The store: in-memory map, WAL, and recovery.

use crate::config::Config;
use crate::dir::DataDir;
use crate::error::{StoreError, StoreResult};
use crate::snapshot::{load_snapshot, write_snapshot};
use crate::wal::{Operation, Record, Wal};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// An embedded, persistent key-value store.
///
/// The store maps string keys to opaque byte values and survives both clean
/// shutdowns and abrupt termination: every mutation is appended to the WAL
/// (and fsynced, with the default configuration) before the in-memory map
/// changes, so an acknowledged operation is never lost.
///
/// Reads are served from memory under a shared lock and never wait on the
/// disk. Writers serialize on the WAL's own mutex for the disk write, then
/// take the map lock only for the brief mutation window.
///
/// # Example
///
/// ```rust,no_run
/// use kvlog_core::Store;
/// use std::path::Path;
///
/// let store = Store::open(Path::new("my_data"))?;
/// store.set("user:1", b"alice")?;
/// assert_eq!(store.get("user:1"), Some(b"alice".to_vec()));
/// store.close()?;
/// # Ok::<(), kvlog_core::StoreError>(())
/// ```
pub struct Store {
    config: Config,
    dir: DataDir,
    data: RwLock<HashMap<String, Vec<u8>>>,
    wal: Wal,
    is_open: RwLock<bool>,
}

impl Store {
    /// Opens a store at the given directory with the default configuration
    /// (`sync_writes = true`).
    ///
    /// # Errors
    ///
    /// See [`Store::open_with_config`].
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a store at the given directory.
    ///
    /// Recovery runs before the handle is returned: the snapshot, if any,
    /// is loaded first, then the WAL is replayed on top of it. The WAL only
    /// ever holds records newer than the last snapshot, because clean
    /// shutdown truncates it strictly after the snapshot is durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the WAL cannot
    /// be opened, or the snapshot exists but fails validation. A torn or
    /// corrupt WAL tail is not an error; replay stops there and the store
    /// opens with every acknowledged operation intact.
    pub fn open_with_config(path: &Path, config: Config) -> StoreResult<Self> {
        let dir = DataDir::open(path)?;
        let wal = Wal::open(&dir, config.sync_writes)?;

        let mut data = match load_snapshot(&dir) {
            Ok(map) => map,
            Err(e) => {
                let _ = wal.close();
                return Err(e);
            }
        };

        // Recovery is single-threaded by construction; the map lock is not
        // taken until the store handle exists.
        let replayed = wal.replay(|record| {
            match record.operation() {
                Some(Operation::Set) => {
                    data.insert(record.key.clone(), record.value.clone());
                }
                Some(Operation::Delete) => {
                    data.remove(&record.key);
                }
                // replay only delivers records with known operations
                None => {}
            }
            Ok(())
        });
        if let Err(e) = replayed {
            let _ = wal.close();
            return Err(e);
        }

        debug!(keys = data.len(), path = %path.display(), "store opened");

        Ok(Self {
            config,
            dir,
            data: RwLock::new(data),
            wal,
            is_open: RwLock::new(true),
        })
    }

    /// Sets `key` to `value`.
    ///
    /// The WAL append is the commit point: if it fails, the error is
    /// returned and the in-memory map is untouched, so no reader can
    /// observe a value that is not durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the WAL append fails.
    pub fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.ensure_open()?;

        let record = Record::set(key, value);
        self.wal.append(&record)?;

        self.data.write().insert(record.key, record.value);
        Ok(())
    }

    /// Removes `key` if present.
    ///
    /// Deleting an absent key is not an error; it still appends a WAL
    /// record, which replays harmlessly.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the WAL append fails.
    pub fn delete(&self, key: &str) -> StoreResult<()> {
        self.ensure_open()?;

        let record = Record::delete(key);
        self.wal.append(&record)?;

        self.data.write().remove(key);
        Ok(())
    }

    /// Returns a copy of the value for `key`, or `None` if absent.
    ///
    /// Reads take the map's shared lock only; they never block on the disk
    /// or on each other.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.data.read().get(key).cloned()
    }

    /// Returns the number of keys currently in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns whether the store currently holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns the keys currently in the store, in no particular order.
    ///
    /// The list is a snapshot of the moment the lock was held; concurrent
    /// writers may change the store before the caller looks at it.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    /// Closes the store: snapshot, then WAL truncation, then WAL close.
    ///
    /// The map lock is held exclusively for the whole shutdown. The WAL is
    /// truncated only if the snapshot succeeded; on a snapshot failure the
    /// WAL is left intact (the previous snapshot plus the un-truncated WAL
    /// still reconstruct the current state on the next open) and the
    /// snapshot error is returned after the WAL is closed best-effort.
    ///
    /// Closing an already-closed store is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot, truncation, or WAL close fails.
    pub fn close(&self) -> StoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Ok(());
        }
        *is_open = false;

        let data = self.data.write();

        match write_snapshot(&self.dir, &data) {
            Ok(()) => {
                let truncated = self.wal.truncate();
                let closed = self.wal.close();
                truncated.and(closed)
            }
            Err(e) => {
                let _ = self.wal.close();
                Err(e)
            }
        }
    }

    /// Returns whether the store is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    /// Returns the store's configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the path of the data directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(StoreError::StoreClosed)
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.dir.path())
            .field("is_open", &self.is_open())
            .finish_non_exhaustive()
    }
}
