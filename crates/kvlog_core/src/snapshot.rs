//! Point-in-time snapshot of the in-memory map.
//!
//! A snapshot is written on clean shutdown so the next open can skip most
//! of the WAL. The file is produced under a temp name and renamed over the
//! canonical path, so concurrent readers of the path see either the old
//! snapshot or the new one, never a partial write.
//!
//! ## File format (big-endian)
//!
//! ```text
//! header:  | magic (4) | timestamp (8) | entry_count (4) | crc32 (4) |
//! entry:   | key_len (4) | key | value_len (4) | value | crc32 (4) |
//! ```
//!
//! The header CRC covers the 16 bytes before it; each entry CRC covers that
//! entry's preceding bytes. Entry order follows map iteration and carries no
//! meaning; two snapshots of the same map need not be byte-identical.

use crate::dir::DataDir;
use crate::error::{StoreError, StoreResult};
use crate::wal::unix_timestamp_nanos;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::Path;
use tracing::debug;

/// Magic bytes identifying a snapshot file ("KVSP").
pub const SNAPSHOT_MAGIC: u32 = 0x4B56_5350;

/// Writes a snapshot of `data` to the data directory.
///
/// The snapshot is streamed to `snapshot.dat.tmp`, fsynced, closed, and
/// renamed over `snapshot.dat`; the directory is then fsynced so the rename
/// itself is durable. On any failure the temp file is removed best-effort
/// and the existing snapshot, if any, is left untouched; together with the
/// un-truncated WAL it still reconstructs the current state.
///
/// # Errors
///
/// Returns an error if the temp file cannot be created, written, synced, or
/// renamed.
pub fn write_snapshot(dir: &DataDir, data: &HashMap<String, Vec<u8>>) -> StoreResult<()> {
    let temp_path = dir.snapshot_temp_path();

    if let Err(e) = write_entries(&temp_path, data) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, dir.snapshot_path()) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    dir.sync_directory()?;

    debug!(entries = data.len(), "snapshot written");
    Ok(())
}

/// Writes header and entries to `path` and fsyncs the file.
fn write_entries(path: &Path, data: &HashMap<String, Vec<u8>>) -> StoreResult<()> {
    let entry_count = u32::try_from(data.len())
        .map_err(|_| StoreError::invalid_argument("map exceeds 32-bit entry count"))?;

    let mut file = File::create(path)?;

    let mut header = Vec::with_capacity(16);
    header.extend_from_slice(&SNAPSHOT_MAGIC.to_be_bytes());
    header.extend_from_slice(&unix_timestamp_nanos().to_be_bytes());
    header.extend_from_slice(&entry_count.to_be_bytes());

    file.write_all(&header)?;
    file.write_all(&crc32fast::hash(&header).to_be_bytes())?;

    for (key, value) in data {
        let key_len = u32::try_from(key.len())
            .map_err(|_| StoreError::invalid_argument("snapshot key exceeds 32-bit length"))?;
        let value_len = u32::try_from(value.len())
            .map_err(|_| StoreError::invalid_argument("snapshot value exceeds 32-bit length"))?;

        let mut entry = Vec::with_capacity(8 + key.len() + value.len());
        entry.extend_from_slice(&key_len.to_be_bytes());
        entry.extend_from_slice(key.as_bytes());
        entry.extend_from_slice(&value_len.to_be_bytes());
        entry.extend_from_slice(value);

        file.write_all(&entry)?;
        file.write_all(&crc32fast::hash(&entry).to_be_bytes())?;
    }

    file.sync_all()?;
    Ok(())
}

/// Loads the snapshot from the data directory.
///
/// A missing snapshot file is not an error and loads as an empty map: a
/// store that has never shut down cleanly simply has everything in its WAL.
///
/// # Errors
///
/// Returns a hard error if the file exists but its magic, header checksum,
/// or any entry checksum fails to validate, or if the file ends partway
/// through an entry. A broken snapshot is surfaced for the operator to
/// investigate, never silently discarded.
pub fn load_snapshot(dir: &DataDir) -> StoreResult<HashMap<String, Vec<u8>>> {
    let path = dir.snapshot_path();
    if !path.exists() {
        debug!("no snapshot on disk, starting from an empty map");
        return Ok(HashMap::new());
    }

    let file = File::open(&path)?;
    let mut reader = BufReader::new(file);

    let mut header = [0u8; 16];
    read_fully(&mut reader, &mut header, || "snapshot header truncated".to_string())?;

    let magic = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    if magic != SNAPSHOT_MAGIC {
        return Err(StoreError::snapshot_corrupt(format!(
            "bad snapshot magic: expected {SNAPSHOT_MAGIC:#010x}, found {magic:#010x}"
        )));
    }

    let entry_count = u32::from_be_bytes([header[12], header[13], header[14], header[15]]);

    let mut crc_buf = [0u8; 4];
    read_fully(&mut reader, &mut crc_buf, || "snapshot header truncated".to_string())?;
    let stored = u32::from_be_bytes(crc_buf);
    let computed = crc32fast::hash(&header);
    if stored != computed {
        return Err(StoreError::ChecksumMismatch { stored, computed });
    }

    let mut data = HashMap::with_capacity(entry_count as usize);
    for i in 0..entry_count {
        let (key, value) = read_entry(&mut reader, i)?;
        data.insert(key, value);
    }

    debug!(entries = data.len(), "snapshot loaded");
    Ok(data)
}

/// Reads and validates one snapshot entry.
fn read_entry<R: Read>(reader: &mut R, index: u32) -> StoreResult<(String, Vec<u8>)> {
    let truncated = || format!("snapshot entry {index} corrupt: truncated");

    let mut entry = Vec::new();

    let mut len_buf = [0u8; 4];
    read_fully(reader, &mut len_buf, truncated)?;
    entry.extend_from_slice(&len_buf);
    let key_len = u32::from_be_bytes(len_buf) as u64;
    read_exactly(reader, &mut entry, key_len, truncated)?;

    read_fully(reader, &mut len_buf, truncated)?;
    entry.extend_from_slice(&len_buf);
    let value_len = u32::from_be_bytes(len_buf) as u64;
    read_exactly(reader, &mut entry, value_len, truncated)?;

    let mut crc_buf = [0u8; 4];
    read_fully(reader, &mut crc_buf, truncated)?;
    let stored = u32::from_be_bytes(crc_buf);
    let computed = crc32fast::hash(&entry);
    if stored != computed {
        return Err(StoreError::snapshot_corrupt(format!(
            "snapshot entry {index} corrupt: checksum mismatch, stored {stored:08x}, computed {computed:08x}"
        )));
    }

    let key_end = 4 + key_len as usize;
    let key = String::from_utf8(entry[4..key_end].to_vec()).map_err(|_| {
        StoreError::snapshot_corrupt(format!("snapshot entry {index} corrupt: key is not valid UTF-8"))
    })?;
    let value = entry[key_end + 4..].to_vec();

    Ok((key, value))
}

/// Reads exactly `buf.len()` bytes, mapping a short read to a corruption
/// error with the given context.
fn read_fully<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    context: impl Fn() -> String,
) -> StoreResult<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => StoreError::snapshot_corrupt(context()),
        _ => StoreError::Io(e),
    })
}

/// Appends exactly `n` bytes from the reader to `out`, mapping a short read
/// to a corruption error.
fn read_exactly<R: Read>(
    reader: &mut R,
    out: &mut Vec<u8>,
    n: u64,
    context: impl Fn() -> String,
) -> StoreResult<()> {
    let got = reader.by_ref().take(n).read_to_end(out).map_err(StoreError::Io)?;
    if (got as u64) < n {
        return Err(StoreError::snapshot_corrupt(context()));
    }
    Ok(())
}

/// Returns whether a snapshot file exists in the data directory.
#[must_use]
pub fn snapshot_exists(dir: &DataDir) -> bool {
    dir.snapshot_path().exists()
}
