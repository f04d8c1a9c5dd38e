//! Buffered reads over a storage backend for streaming replay.

use kvlog_storage::StorageBackend;
use std::io::{self, Read};

/// Read chunk size for streaming replay.
///
/// Records are parsed straight out of this buffer, so replay memory stays
/// bounded by the chunk size plus the largest single record.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// An `io::Read` view of a storage backend, for driving the record codec
/// during replay.
///
/// Reads the backend in fixed-size chunks starting at offset 0 and never
/// reads past the size captured at construction, so a torn tail surfaces to
/// the codec as a clean short read rather than a backend error.
pub(crate) struct WalReader<'a> {
    backend: &'a dyn StorageBackend,
    /// Log size captured when the reader was created.
    size: u64,
    /// Next backend offset to fetch.
    offset: u64,
    buffer: Vec<u8>,
    /// Read position within `buffer`.
    pos: usize,
}

impl<'a> WalReader<'a> {
    /// Creates a reader positioned at the start of the log.
    pub(crate) fn new(backend: &'a dyn StorageBackend) -> io::Result<Self> {
        let size = backend.size().map_err(io::Error::other)?;
        Ok(Self {
            backend,
            size,
            offset: 0,
            buffer: Vec::new(),
            pos: 0,
        })
    }

    /// The log offset of the next unconsumed byte.
    pub(crate) fn position(&self) -> u64 {
        self.offset - (self.buffer.len() - self.pos) as u64
    }
}

impl Read for WalReader<'_> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        if self.pos == self.buffer.len() {
            let remaining = self.size - self.offset;
            if remaining == 0 {
                return Ok(0);
            }
            let chunk = remaining.min(READ_CHUNK_SIZE as u64) as usize;
            self.buffer = self
                .backend
                .read_at(self.offset, chunk)
                .map_err(io::Error::other)?;
            self.offset += self.buffer.len() as u64;
            self.pos = 0;
        }

        let n = out.len().min(self.buffer.len() - self.pos);
        out[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
