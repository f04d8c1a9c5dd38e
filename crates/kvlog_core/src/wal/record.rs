//! WAL record types and the on-disk record codec.

use crate::error::{StoreError, StoreResult};
use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

/// Magic bytes identifying a WAL record ("KVLG").
pub const RECORD_MAGIC: u32 = 0x4B56_4C47;

/// Fixed portion of the record header: magic (4) + op (1) + timestamp (8).
const FIXED_HEADER_SIZE: usize = 13;

/// Size of a length field or CRC trailer.
const WORD_SIZE: usize = 4;

/// Operations a record can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Operation {
    /// Insert or overwrite a key.
    Set = 0x01,
    /// Remove a key.
    Delete = 0x02,
}

impl Operation {
    /// Converts a byte to an operation.
    ///
    /// Returns `None` for op codes this version does not understand; the
    /// codec still decodes such records so replay can skip them.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Set),
            0x02 => Some(Self::Delete),
            _ => None,
        }
    }

    /// Converts the operation to its wire byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A single log event.
///
/// Records are immutable once constructed: they are built at each mutation,
/// encoded into the WAL, reconstructed at replay, then discarded. The
/// timestamp is audit metadata only and is never consulted for ordering.
///
/// The `op` field holds the raw wire byte rather than an [`Operation`] so
/// that records written by a future version decode successfully and can be
/// skipped during replay; use [`Record::operation`] to interpret it.
///
/// ## Wire layout (big-endian)
///
/// ```text
/// | magic (4) | op (1) | timestamp (8) | key_len (4) | key |
/// | value_len (4) | value | crc32 (4) |
/// ```
///
/// The CRC-32 (IEEE polynomial) covers every preceding byte of the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Raw operation byte.
    pub op: u8,
    /// Nanoseconds since the Unix epoch at construction time.
    pub timestamp: i64,
    /// The key this record applies to.
    pub key: String,
    /// The value payload; always empty for `Delete`.
    pub value: Vec<u8>,
}

impl Record {
    /// Creates a `Set` record stamped with the current time.
    pub fn set(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            op: Operation::Set.as_byte(),
            timestamp: unix_timestamp_nanos(),
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates a `Delete` record stamped with the current time.
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            op: Operation::Delete.as_byte(),
            timestamp: unix_timestamp_nanos(),
            key: key.into(),
            value: Vec::new(),
        }
    }

    /// Interprets the raw op byte.
    #[must_use]
    pub fn operation(&self) -> Option<Operation> {
        Operation::from_byte(self.op)
    }

    /// Encodes the record into a fully-materialized buffer.
    ///
    /// The whole record is built in memory so the caller can hand it to the
    /// log as a single write; a crash mid-append then leaves either nothing
    /// or a contiguous prefix on disk, which replay discards as torn.
    ///
    /// # Errors
    ///
    /// Returns an error if the key or value exceeds the 32-bit length the
    /// wire format can carry.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        let key_len = u32::try_from(self.key.len())
            .map_err(|_| StoreError::invalid_argument("record key exceeds 32-bit length"))?;
        let value_len = u32::try_from(self.value.len())
            .map_err(|_| StoreError::invalid_argument("record value exceeds 32-bit length"))?;

        let mut buf = Vec::with_capacity(
            FIXED_HEADER_SIZE + 3 * WORD_SIZE + self.key.len() + self.value.len(),
        );

        buf.extend_from_slice(&RECORD_MAGIC.to_be_bytes());
        buf.push(self.op);
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&key_len.to_be_bytes());
        buf.extend_from_slice(self.key.as_bytes());
        buf.extend_from_slice(&value_len.to_be_bytes());
        buf.extend_from_slice(&self.value);

        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_be_bytes());

        Ok(buf)
    }

    /// Encodes the record to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or the write fails.
    pub fn encode<W: Write>(&self, w: &mut W) -> StoreResult<()> {
        let buf = self.to_bytes()?;
        w.write_all(&buf)?;
        Ok(())
    }

    /// Decodes one record from a reader.
    ///
    /// End-of-input at the very first byte is a clean [`DecodeOutcome::EndOfLog`].
    /// End-of-input anywhere later means the record was torn mid-write and
    /// yields [`DecodeOutcome::Torn`]. A magic or checksum mismatch yields
    /// [`DecodeOutcome::Corrupt`]. An unknown op byte is **not** a codec
    /// error; the record is returned as-is and the caller decides.
    ///
    /// # Errors
    ///
    /// Only genuine I/O errors (anything other than an unexpected EOF) are
    /// returned as `Err`.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<DecodeOutcome> {
        let mut first = [0u8; 1];
        if let Err(e) = r.read_exact(&mut first) {
            return match e.kind() {
                ErrorKind::UnexpectedEof => Ok(DecodeOutcome::EndOfLog),
                _ => Err(e),
            };
        }

        let mut raw = Vec::with_capacity(FIXED_HEADER_SIZE + 3 * WORD_SIZE);
        raw.push(first[0]);

        // rest of magic
        if !read_into(r, &mut raw, 3)? {
            return Ok(DecodeOutcome::Torn);
        }
        let magic = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if magic != RECORD_MAGIC {
            return Ok(DecodeOutcome::Corrupt(Corruption::BadMagic { found: magic }));
        }

        // op + timestamp + key length
        if !read_into(r, &mut raw, (FIXED_HEADER_SIZE - 4 + WORD_SIZE) as u64)? {
            return Ok(DecodeOutcome::Torn);
        }
        let op = raw[4];
        let timestamp = i64::from_be_bytes([
            raw[5], raw[6], raw[7], raw[8], raw[9], raw[10], raw[11], raw[12],
        ]);
        let key_len = u32::from_be_bytes([raw[13], raw[14], raw[15], raw[16]]) as usize;

        // key bytes
        if !read_into(r, &mut raw, key_len as u64)? {
            return Ok(DecodeOutcome::Torn);
        }

        // value length
        if !read_into(r, &mut raw, WORD_SIZE as u64)? {
            return Ok(DecodeOutcome::Torn);
        }
        let value_off = FIXED_HEADER_SIZE + WORD_SIZE + key_len;
        let value_len = u32::from_be_bytes([
            raw[value_off],
            raw[value_off + 1],
            raw[value_off + 2],
            raw[value_off + 3],
        ]) as usize;

        // value bytes
        if !read_into(r, &mut raw, value_len as u64)? {
            return Ok(DecodeOutcome::Torn);
        }

        // CRC trailer, not part of the checksummed bytes
        let mut crc_buf = [0u8; WORD_SIZE];
        if let Err(e) = r.read_exact(&mut crc_buf) {
            return match e.kind() {
                ErrorKind::UnexpectedEof => Ok(DecodeOutcome::Torn),
                _ => Err(e),
            };
        }
        let stored = u32::from_be_bytes(crc_buf);
        let computed = crc32fast::hash(&raw);
        if stored != computed {
            return Ok(DecodeOutcome::Corrupt(Corruption::ChecksumMismatch {
                stored,
                computed,
            }));
        }

        let key_start = FIXED_HEADER_SIZE + WORD_SIZE;
        let key = match String::from_utf8(raw[key_start..key_start + key_len].to_vec()) {
            Ok(key) => key,
            Err(_) => return Ok(DecodeOutcome::Corrupt(Corruption::InvalidKeyEncoding)),
        };
        let value = raw[value_off + WORD_SIZE..].to_vec();

        Ok(DecodeOutcome::Record(Record {
            op,
            timestamp,
            key,
            value,
        }))
    }
}

/// Outcome of decoding one record from a byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A complete, checksum-valid record.
    Record(Record),
    /// Clean end of the log: no bytes remained.
    EndOfLog,
    /// The stream ended partway through a record (crash mid-write).
    Torn,
    /// The bytes are present but not a valid record.
    Corrupt(Corruption),
}

/// The ways a fully-present record can fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    /// The leading four bytes are not the record magic.
    BadMagic {
        /// The value found instead of [`RECORD_MAGIC`].
        found: u32,
    },
    /// The stored CRC does not match the record's bytes.
    ChecksumMismatch {
        /// Checksum stored in the trailer.
        stored: u32,
        /// Checksum computed over the bytes read.
        computed: u32,
    },
    /// The checksum held but the key bytes are not valid UTF-8.
    InvalidKeyEncoding,
}

impl fmt::Display for Corruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic { found } => {
                write!(f, "bad magic: expected {RECORD_MAGIC:#010x}, found {found:#010x}")
            }
            Self::ChecksumMismatch { stored, computed } => {
                write!(f, "checksum mismatch: stored {stored:08x}, computed {computed:08x}")
            }
            Self::InvalidKeyEncoding => write!(f, "key is not valid UTF-8"),
        }
    }
}

/// Reads exactly `n` more bytes into `raw`.
///
/// Returns `Ok(false)` on a short read (torn record). The `take` guard means
/// a garbage length field in a torn tail cannot trigger a huge up-front
/// allocation; the buffer only grows as bytes actually arrive.
fn read_into<R: Read>(r: &mut R, raw: &mut Vec<u8>, n: u64) -> io::Result<bool> {
    let start = raw.len();
    let got = r.by_ref().take(n).read_to_end(raw)?;
    if (got as u64) < n {
        raw.truncate(start);
        return Ok(false);
    }
    Ok(true)
}

/// Current wall-clock time as nanoseconds since the Unix epoch.
///
/// Audit metadata only; a clock before the epoch degrades to zero rather
/// than failing the write path.
pub(crate) fn unix_timestamp_nanos() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i64,
        Err(_) => 0,
    }
}
