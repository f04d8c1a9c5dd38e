//! Write-ahead log for durability and crash recovery.
//!
//! Every mutation is appended here, and optionally fsynced, before the
//! in-memory map is touched. On startup the log is replayed on top of the
//! last snapshot to reconstruct the map.
//!
//! ## Record format
//!
//! ```text
//! | magic (4) | op (1) | timestamp (8) | key_len (4) | key |
//! | value_len (4) | value | crc32 (4) |
//! ```
//!
//! Big-endian throughout; the CRC-32 (IEEE polynomial) covers all preceding
//! bytes of the record.
//!
//! ## Recovery policy
//!
//! Replay stops cleanly, and the store still opens, at the first record
//! that is torn (short read) or corrupt (bad magic or checksum mismatch).
//! Because a record is acknowledged only after its append (and fsync, when
//! enabled) returned, the only record that can be invalid is an
//! unacknowledged one at the tail, and discarding it loses nothing any
//! caller was promised. Records with unrecognized op codes are decoded and
//! skipped so that logs written by a future version still replay.

mod reader;
mod record;
mod writer;

pub use record::{Corruption, DecodeOutcome, Operation, Record, RECORD_MAGIC};
pub use writer::Wal;

pub(crate) use record::unix_timestamp_nanos;
