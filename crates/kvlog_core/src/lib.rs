//! # kvlog Core
//!
//! An embedded, single-process, persistent key-value store. Keys are
//! strings, values are opaque bytes, and any operation that returned
//! success survives both clean shutdown and abrupt termination.
//!
//! The crate is built from four pieces:
//!
//! - the **record codec** ([`Record`]) - pure encode/decode of one log
//!   event with a CRC-32 trailer
//! - the **write-ahead log** ([`Wal`]) - serialized, optionally-fsynced
//!   appends and streaming replay with torn-tail tolerance
//! - the **snapshot codec** ([`write_snapshot`] / [`load_snapshot`]) -
//!   a full dump of the map, written atomically via temp file + rename
//! - the **store** ([`Store`]) - the public handle tying them together:
//!   WAL-before-memory writes, lock-free-of-disk reads, recovery on open,
//!   snapshot-then-truncate on close
//!
//! ## Data flow
//!
//! ```text
//! set/delete ──▶ WAL append (durable) ──▶ map mutation ──▶ ok
//! get        ──▶ map only
//! open       ──▶ load snapshot ──▶ replay WAL ──▶ ready
//! close      ──▶ write snapshot ──▶ truncate WAL ──▶ close WAL
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use kvlog_core::Store;
//! use std::path::Path;
//!
//! let store = Store::open(Path::new("data"))?;
//! store.set("greeting", b"hello")?;
//! store.close()?;
//!
//! // a reopened store sees every acknowledged operation
//! let store = Store::open(Path::new("data"))?;
//! assert_eq!(store.get("greeting"), Some(b"hello".to_vec()));
//! # Ok::<(), kvlog_core::StoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
mod snapshot;
mod store;
mod wal;

pub use config::Config;
pub use dir::DataDir;
pub use error::{StoreError, StoreResult};
pub use snapshot::{load_snapshot, snapshot_exists, write_snapshot, SNAPSHOT_MAGIC};
pub use store::Store;
pub use wal::{Corruption, DecodeOutcome, Operation, Record, Wal, RECORD_MAGIC};
