//! # Console Transcoding
//!
//! Console devices take UTF-16 units while callers write UTF-8 text.
//! [`ConsoleWriter`] and [`ConsoleReader`] sit on top of the synchronous
//! buffered writer and reader and convert at the boundary:
//!
//! - output `LF` becomes `CR LF` unless the caller already wrote the `CR`
//! - a call containing a line feed flushes once, after its last line feed
//! - a UTF-8 sequence split across calls is carried to the next call
//! - invalid input in either direction becomes U+FFFD
//! - input `CR LF` collapses to `LF`

use bridge_traits::Device;
use tracing::{trace, warn};

use crate::buffer::BufferMode;
use crate::error::{Result, StreamError};
use crate::reader::BufferedReader;
use crate::writer::BufferedWriter;

const CR: u16 = 0x000D;
const LF: u16 = 0x000A;
const REPLACEMENT: u16 = 0xFFFD;

/// Longest UTF-8 encoding of one code point
const MAX_UTF8_LEN: usize = 4;

/// UTF-8 text writer over a UTF-16 console device
pub struct ConsoleWriter<D: Device<Unit = u16> = Box<dyn Device<Unit = u16>>> {
    inner: BufferedWriter<D>,
    // Caller's last byte was CR, so the next LF needs no CR of its own
    last_was_cr: bool,
    // Incomplete UTF-8 sequence from the previous call
    carry: Vec<u8>,
    scratch: Vec<u16>,
}

impl<D: Device<Unit = u16>> ConsoleWriter<D> {
    /// Writer over `device` buffering up to `capacity` units
    pub fn new(device: D, capacity: usize) -> Self {
        Self {
            inner: BufferedWriter::with_device(device, capacity),
            last_was_cr: false,
            carry: Vec::with_capacity(MAX_UTF8_LEN),
            scratch: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// UTF-16 units waiting in the buffer
    pub fn buffered(&self) -> usize {
        self.inner.buffered()
    }

    pub fn setbuf(&mut self, mode: BufferMode<u16>) -> Result<()> {
        self.inner.setbuf(mode)
    }

    /// Transcode `bytes` onto the end of the scratch buffer.
    fn decode_into_scratch(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let joined;
        let mut rest = if self.carry.is_empty() {
            bytes
        } else {
            let mut carried = std::mem::take(&mut self.carry);
            carried.extend_from_slice(bytes);
            joined = carried;
            &joined[..]
        };

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.scratch.extend(text.encode_utf16());
                    break;
                }
                Err(err) => {
                    let (valid, tail) = rest.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.scratch.extend(text.encode_utf16());
                    }
                    match err.error_len() {
                        Some(invalid) => {
                            self.scratch.push(REPLACEMENT);
                            rest = &tail[invalid..];
                        }
                        None => {
                            self.carry.extend_from_slice(tail);
                            break;
                        }
                    }
                }
            }
        }
    }

    /// A sequence cut short by a line feed or close is reported as U+FFFD.
    fn abandon_carry(&mut self) {
        if !self.carry.is_empty() {
            self.carry.clear();
            self.scratch.push(REPLACEMENT);
            self.last_was_cr = false;
        }
    }

    fn push_line_feed(&mut self) {
        self.abandon_carry();
        if !self.last_was_cr {
            self.scratch.push(CR);
        }
        self.scratch.push(LF);
        self.last_was_cr = false;
    }

    /// Write UTF-8 `text`.
    pub fn write(&mut self, text: &[u8]) -> Result<()> {
        if !self.inner.is_open() {
            return Err(StreamError::NotOpen);
        }
        if text.is_empty() {
            return Ok(());
        }

        self.scratch.clear();
        let mut flush_at = None;
        let mut segments = text.split(|&b| b == b'\n').peekable();
        while let Some(segment) = segments.next() {
            self.decode_into_scratch(segment);
            if let Some(&last) = segment.last() {
                self.last_was_cr = last == b'\r' && self.carry.is_empty();
            }
            if segments.peek().is_some() {
                self.push_line_feed();
                flush_at = Some(self.scratch.len());
            }
        }

        let scratch = std::mem::take(&mut self.scratch);
        let result = self.emit(&scratch, flush_at);
        self.scratch = scratch;
        result
    }

    fn emit(&mut self, units: &[u16], flush_at: Option<usize>) -> Result<()> {
        match flush_at {
            Some(at) => {
                self.inner.write(&units[..at])?;
                self.inner.flush()?;
                trace!(units = at, "Flushed console line");
                self.inner.write(&units[at..])
            }
            None => self.inner.write(units),
        }
    }

    pub fn put(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte])
    }

    /// Write `byte` `count` times.
    ///
    /// A line feed run becomes `count` line breaks and flushes. A lone byte
    /// outside ASCII is not valid UTF-8 and is written as U+FFFD.
    pub fn fill(&mut self, byte: u8, count: usize) -> Result<()> {
        if !self.inner.is_open() {
            return Err(StreamError::NotOpen);
        }
        if count == 0 {
            return Ok(());
        }

        self.scratch.clear();
        self.abandon_carry();
        let pending = std::mem::take(&mut self.scratch);
        self.inner.write(&pending)?;
        self.scratch = pending;

        match byte {
            b'\n' => {
                let first: &[u16] = if self.last_was_cr { &[LF] } else { &[CR, LF] };
                self.inner.write(first)?;
                for _ in 1..count {
                    self.inner.write(&[CR, LF])?;
                }
                self.last_was_cr = false;
                self.inner.flush()
            }
            byte if byte.is_ascii() => {
                self.last_was_cr = byte == b'\r';
                self.inner.fill(u16::from(byte), count)
            }
            _ => {
                self.last_was_cr = false;
                self.inner.fill(REPLACEMENT, count)
            }
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    /// Flush and release the console. An unfinished UTF-8 sequence is
    /// written as U+FFFD first.
    pub fn close(&mut self) -> Result<()> {
        if !self.inner.is_open() {
            return Ok(());
        }
        let tail = if self.carry.is_empty() {
            Ok(())
        } else {
            self.carry.clear();
            self.inner.put(REPLACEMENT)
        };
        tail.and(self.inner.close())
    }
}

impl<D: Device<Unit = u16>> Drop for ConsoleWriter<D> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "Failed to close console writer on drop");
        }
    }
}

impl<D: Device<Unit = u16>> std::fmt::Debug for ConsoleWriter<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleWriter")
            .field("inner", &self.inner)
            .field("last_was_cr", &self.last_was_cr)
            .field("carry", &self.carry.len())
            .finish()
    }
}

/// UTF-8 text reader over a UTF-16 console device
pub struct ConsoleReader<D: Device<Unit = u16> = Box<dyn Device<Unit = u16>>> {
    inner: BufferedReader<D>,
    // Encoded bytes of a code point that did not fit the caller's slice
    staged: [u8; MAX_UTF8_LEN],
    staged_begin: usize,
    staged_end: usize,
}

impl<D: Device<Unit = u16>> ConsoleReader<D> {
    pub fn new(device: D, capacity: usize) -> Self {
        Self {
            inner: BufferedReader::with_device(device, capacity),
            staged: [0; MAX_UTF8_LEN],
            staged_begin: 0,
            staged_end: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    pub fn setbuf(&mut self, mode: BufferMode<u16>) -> Result<()> {
        self.inner.setbuf(mode)
    }

    /// Decode the next code point, or `None` at end of input.
    fn next_char(&mut self) -> Result<Option<char>> {
        let Some(unit) = self.inner.bump()? else {
            return Ok(None);
        };
        let decoded = match unit {
            0xD800..=0xDBFF => match self.inner.peek()? {
                Some(low @ 0xDC00..=0xDFFF) => {
                    self.inner.bump()?;
                    let high = u32::from(unit - 0xD800);
                    let low = u32::from(low - 0xDC00);
                    char::from_u32(0x10000 + (high << 10) + low)
                }
                _ => None,
            },
            0xDC00..=0xDFFF => None,
            CR if self.inner.peek()? == Some(LF) => {
                self.inner.bump()?;
                Some('\n')
            }
            unit => char::from_u32(u32::from(unit)),
        };
        Ok(Some(decoded.unwrap_or(char::REPLACEMENT_CHARACTER)))
    }

    fn drain_staged(&mut self, dest: &mut [u8]) -> usize {
        let n = (self.staged_end - self.staged_begin).min(dest.len());
        dest[..n].copy_from_slice(&self.staged[self.staged_begin..self.staged_begin + n]);
        self.staged_begin += n;
        n
    }

    /// Read UTF-8 text into `dest`. Returns 0 at end of input.
    ///
    /// Once something has been read, the call returns instead of waiting
    /// on the console for more.
    pub fn read(&mut self, dest: &mut [u8]) -> Result<usize> {
        if !self.inner.is_open() {
            return Err(StreamError::NotOpen);
        }

        let mut written = self.drain_staged(dest);
        while written < dest.len() {
            if written > 0 && self.inner.available() == 0 {
                break;
            }
            let remaining = dest.len() - written;
            if remaining >= MAX_UTF8_LEN {
                for _ in 0..remaining / MAX_UTF8_LEN {
                    let Some(ch) = self.next_char()? else {
                        return Ok(written);
                    };
                    written += ch.encode_utf8(&mut dest[written..]).len();
                    if self.inner.available() == 0 {
                        break;
                    }
                }
            } else {
                let Some(ch) = self.next_char()? else {
                    break;
                };
                self.staged_begin = 0;
                self.staged_end = ch.encode_utf8(&mut self.staged).len();
                written += self.drain_staged(&mut dest[written..]);
            }
        }
        Ok(written)
    }

    pub fn close(&mut self) -> Result<()> {
        self.staged_begin = 0;
        self.staged_end = 0;
        self.inner.close()
    }
}

impl<D: Device<Unit = u16>> std::fmt::Debug for ConsoleReader<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleReader")
            .field("inner", &self.inner)
            .field("staged", &(self.staged_end - self.staged_begin))
            .finish()
    }
}
