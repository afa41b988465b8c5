use std::io::Read;

use super::error::FormatError;

const CHUNK_SIZE: usize = 16 * 1024;

/// Forward-only reader with look-ahead.
///
/// Section boundaries are detected by peeking at the next bytes (or the next
/// line of a text index) without consuming them, so the underlying stream
/// never has to seek. This keeps gzip-compressed indexes streamable.
pub struct IndexReader<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
    offset: u64,
}

impl<R: Read> IndexReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            pos: 0,
            eof: false,
            offset: 0,
        }
    }

    /// Number of bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn available(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    fn fill(&mut self, needed: usize) -> Result<(), FormatError> {
        while self.available().len() < needed && !self.eof {
            self.read_chunk()?;
        }
        Ok(())
    }

    fn read_chunk(&mut self) -> Result<(), FormatError> {
        if self.pos > 0 && self.pos * 2 >= self.buf.len() {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        let old_len = self.buf.len();
        self.buf.resize(old_len + CHUNK_SIZE, 0);
        let read = loop {
            match self.inner.read(&mut self.buf[old_len..]) {
                Ok(read) => break read,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.buf.truncate(old_len);
                    return Err(err.into());
                }
            }
        };
        self.buf.truncate(old_len + read);
        if read == 0 {
            self.eof = true;
        }
        Ok(())
    }

    /// Return up to `len` upcoming bytes without consuming them.
    ///
    /// Fewer bytes are returned only at end of stream.
    pub fn peek(&mut self, len: usize) -> Result<&[u8], FormatError> {
        self.fill(len)?;
        let available = self.available();
        Ok(&available[..len.min(available.len())])
    }

    pub fn consume(&mut self, len: usize) {
        let len = len.min(self.available().len());
        self.pos += len;
        self.offset += len as u64;
    }

    /// Consume exactly `len` bytes, failing with `Truncated` at end of stream.
    pub fn take(&mut self, len: usize, what: &'static str) -> Result<Vec<u8>, FormatError> {
        let offset = self.offset;
        let bytes = self.peek(len)?;
        if bytes.len() < len {
            return Err(FormatError::Truncated {
                what,
                offset,
                needed: len,
                actual: bytes.len(),
            });
        }
        let bytes = bytes.to_vec();
        self.consume(len);
        Ok(bytes)
    }

    pub fn read_u8(&mut self, what: &'static str) -> Result<u8, FormatError> {
        let bytes = self.take(1, what)?;
        Ok(bytes[0])
    }

    pub fn read_u32_le(&mut self, what: &'static str) -> Result<u32, FormatError> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_string(&mut self, len: usize, what: &'static str) -> Result<String, FormatError> {
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes).map_err(|_| FormatError::InvalidUtf8 { what })
    }

    /// Return the next line (without its terminator) without consuming it.
    pub fn peek_line(&mut self) -> Result<Option<&[u8]>, FormatError> {
        let mut scanned = 0;
        let end = loop {
            let available = self.available();
            if let Some(pos) = available[scanned..].iter().position(|b| *b == b'\n') {
                break scanned + pos;
            }
            scanned = available.len();
            if self.eof {
                break scanned;
            }
            self.read_chunk()?;
        };
        let available = self.available();
        if available.is_empty() {
            return Ok(None);
        }
        Ok(Some(strip_cr(&available[..end])))
    }

    /// Consume the line returned by the last `peek_line`, terminator included.
    pub fn consume_line(&mut self) {
        let available = self.available();
        let len = available
            .iter()
            .position(|b| *b == b'\n')
            .map(|pos| pos + 1)
            .unwrap_or(available.len());
        self.consume(len);
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}
