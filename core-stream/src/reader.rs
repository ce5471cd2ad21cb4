//! # Synchronous Buffered Reader
//!
//! Mirror of [`BufferedWriter`](crate::writer::BufferedWriter) for input.
//! Reads are served from the buffer first; a request larger than the buffer
//! bypasses it and reads straight into the caller's slice.

use std::path::Path;

use bridge_traits::{Device, OpenMode, PlatformIo, SeekOrigin};
use tracing::{debug, trace, warn};

use crate::buffer::{allocate, storage_for, BufferMode};
use crate::error::{Result, StreamError};

struct Window<U> {
    data: Vec<U>,
    begin: usize,
    end: usize,
    // Requests larger than this go straight to the device
    bypass_above: usize,
}

impl<U: Copy> Window<U> {
    fn available(&self) -> usize {
        self.end - self.begin
    }
}

/// Buffered reader over any device.
pub struct BufferedReader<D: Device> {
    device: Option<D>,
    window: Option<Window<D::Unit>>,
    default_capacity: usize,
}

/// Byte reader over a platform file
pub type FileReader = BufferedReader<Box<dyn Device<Unit = u8>>>;

impl<D: Device> BufferedReader<D> {
    /// Closed reader that allocates `default_capacity` units on first read
    pub fn new(default_capacity: usize) -> Self {
        Self {
            device: None,
            window: None,
            default_capacity,
        }
    }

    pub fn with_device(device: D, default_capacity: usize) -> Self {
        let mut reader = Self::new(default_capacity);
        reader.device = Some(device);
        reader
    }

    pub fn attach(&mut self, device: D) -> Result<()> {
        if self.device.is_some() {
            return Err(StreamError::Misuse("stream is already open".to_string()));
        }
        self.device = Some(device);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Units buffered and not yet consumed
    pub fn available(&self) -> usize {
        self.window.as_ref().map_or(0, Window::available)
    }

    /// Buffer capacity in units; zero when unbuffered or not yet configured
    pub fn capacity(&self) -> usize {
        self.window.as_ref().map_or(0, |w| w.bypass_above)
    }

    /// Choose the buffering strategy. Unconsumed buffered input is discarded.
    ///
    /// An unbuffered reader still keeps a single unit of lookahead for
    /// [`peek`](Self::peek).
    pub fn setbuf(&mut self, mode: BufferMode<D::Unit>) -> Result<()> {
        self.window = Some(match storage_for(mode)? {
            Some(data) => Window {
                bypass_above: data.len(),
                data,
                begin: 0,
                end: 0,
            },
            None => Window {
                data: allocate(1)?,
                begin: 0,
                end: 0,
                bypass_above: 0,
            },
        });
        Ok(())
    }

    fn prepare(&mut self) -> Result<(&mut D, &mut Window<D::Unit>)> {
        let device = self.device.as_mut().ok_or(StreamError::NotOpen)?;
        if self.window.is_none() {
            let data = allocate(self.default_capacity.max(1))?;
            self.window = Some(Window {
                bypass_above: data.len(),
                data,
                begin: 0,
                end: 0,
            });
        }
        match self.window.as_mut() {
            Some(window) => Ok((device, window)),
            None => Err(StreamError::Internal("reader window missing".to_string())),
        }
    }

    /// Refill the buffer if it is empty. Returns false at end of data.
    fn underflow(&mut self) -> Result<bool> {
        let (device, window) = self.prepare()?;
        if window.available() > 0 {
            return Ok(true);
        }
        let n = device
            .read(&mut window.data)
            .map_err(StreamError::device("read"))?;
        trace!(units = n, "Refilled read buffer");
        window.begin = 0;
        window.end = n;
        Ok(n > 0)
    }

    /// Read up to `dest.len()` units. Returns 0 at end of data.
    pub fn read(&mut self, dest: &mut [D::Unit]) -> Result<usize> {
        if self.device.is_none() {
            return Err(StreamError::NotOpen);
        }
        if dest.is_empty() {
            return Ok(0);
        }

        let (device, window) = self.prepare()?;
        let mut done = window.available().min(dest.len());
        dest[..done].copy_from_slice(&window.data[window.begin..window.begin + done]);
        window.begin += done;
        if done == dest.len() {
            return Ok(done);
        }

        let remaining = dest.len() - done;
        if remaining > window.bypass_above {
            trace!(units = remaining, "Direct read");
            let n = device
                .read(&mut dest[done..])
                .map_err(StreamError::device("read"))?;
            return Ok(done + n);
        }

        if self.underflow()? {
            let (_, window) = self.prepare()?;
            let n = window.available().min(remaining);
            dest[done..done + n].copy_from_slice(&window.data[window.begin..window.begin + n]);
            window.begin += n;
            done += n;
        }
        Ok(done)
    }

    /// Next unit without consuming it, or `None` at end of data
    pub fn peek(&mut self) -> Result<Option<D::Unit>> {
        if !self.underflow()? {
            return Ok(None);
        }
        let (_, window) = self.prepare()?;
        Ok(Some(window.data[window.begin]))
    }

    /// Consume and return the next unit, or `None` at end of data
    pub fn bump(&mut self) -> Result<Option<D::Unit>> {
        let unit = self.peek()?;
        if unit.is_some() {
            let (_, window) = self.prepare()?;
            window.begin += 1;
        }
        Ok(unit)
    }

    /// Discard buffered input and reposition the device.
    ///
    /// `Current` is relative to the logical position, i.e. the next unit
    /// [`read`](Self::read) would return.
    pub fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64> {
        let (device, window) = self.prepare()?;
        let offset = match origin {
            SeekOrigin::Current => offset - window.available() as i64,
            _ => offset,
        };
        window.begin = 0;
        window.end = 0;
        device
            .seek(offset, origin)
            .map_err(StreamError::device("seek"))
    }

    /// Release the device and discard buffered input.
    pub fn close(&mut self) -> Result<()> {
        if let Some(window) = self.window.as_mut() {
            window.begin = 0;
            window.end = 0;
        }
        match self.device.take() {
            Some(mut device) => {
                debug!("Closed buffered reader");
                device.close().map_err(StreamError::device("close"))
            }
            None => Ok(()),
        }
    }
}

impl BufferedReader<Box<dyn Device<Unit = u8>>> {
    /// Open `path` through `platform` for input.
    ///
    /// `mode` must ask for `READ` and must not ask for `WRITE` or `APPEND`.
    pub fn open(&mut self, platform: &dyn PlatformIo, path: &Path, mode: OpenMode) -> Result<()> {
        if self.device.is_some() {
            return Err(StreamError::Misuse("stream is already open".to_string()));
        }
        if !mode.contains(OpenMode::READ) || mode.is_output() {
            return Err(StreamError::InvalidMode {
                mode,
                stream: "file reader",
            });
        }

        let device = platform
            .open(path, mode)
            .map_err(StreamError::device("open"))?;
        debug!(path = ?path, "Opened file reader");
        self.device = Some(device);
        Ok(())
    }
}

impl<D: Device> Drop for BufferedReader<D> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "Failed to close reader on drop");
        }
    }
}

impl<D: Device> std::fmt::Debug for BufferedReader<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedReader")
            .field("open", &self.is_open())
            .field("available", &self.available())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{byte_device, MockByteDevice};
    use bridge_traits::BridgeError;

    /// Device serving `content` in chunks of at most `chunk` bytes.
    fn serving(content: &'static [u8], chunk: usize) -> MockByteDevice {
        let mut device = byte_device();
        let mut position = 0usize;
        device.expect_read().returning(move |buf| {
            let n = buf.len().min(chunk).min(content.len() - position);
            buf[..n].copy_from_slice(&content[position..position + n]);
            position += n;
            Ok(n)
        });
        device
    }

    fn read_all(reader: &mut BufferedReader<MockByteDevice>, step: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; step];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn test_reads_through_buffer() {
        let mut reader = BufferedReader::with_device(serving(b"hello buffered world", 64), 8);
        assert_eq!(read_all(&mut reader, 3), b"hello buffered world");
    }

    #[test]
    fn test_large_request_bypasses_buffer() {
        let mut device = byte_device();
        device
            .expect_read()
            .withf(|buf| buf.len() == 32)
            .times(1)
            .returning(|buf| {
                buf.fill(b'z');
                Ok(32)
            });

        let mut reader = BufferedReader::with_device(device, 8);
        let mut dest = [0u8; 32];
        assert_eq!(reader.read(&mut dest).unwrap(), 32);
        assert_eq!(reader.available(), 0);
    }

    #[test]
    fn test_buffered_units_served_before_bypass() {
        let mut reader = BufferedReader::with_device(serving(b"0123456789abcdefghij", 64), 4);
        let mut first = [0u8; 1];
        reader.read(&mut first).unwrap();
        assert_eq!(reader.available(), 3);

        let mut rest = [0u8; 19];
        let n = reader.read(&mut rest).unwrap();
        assert_eq!(&rest[..n], b"123456789abcdefghij");
    }

    #[test]
    fn test_peek_and_bump() {
        let mut reader = BufferedReader::with_device(serving(b"ab", 64), 4);
        assert_eq!(reader.peek().unwrap(), Some(b'a'));
        assert_eq!(reader.peek().unwrap(), Some(b'a'));
        assert_eq!(reader.bump().unwrap(), Some(b'a'));
        assert_eq!(reader.bump().unwrap(), Some(b'b'));
        assert_eq!(reader.bump().unwrap(), None);
        assert_eq!(reader.peek().unwrap(), None);
    }

    #[test]
    fn test_unbuffered_keeps_single_unit_lookahead() {
        let mut reader = BufferedReader::with_device(serving(b"xyz", 64), 4);
        reader.setbuf(BufferMode::Unbuffered).unwrap();
        assert_eq!(reader.capacity(), 0);
        assert_eq!(reader.peek().unwrap(), Some(b'x'));
        let mut dest = [0u8; 3];
        let n = reader.read(&mut dest).unwrap();
        assert_eq!(&dest[..n], b"xyz");
    }

    #[test]
    fn test_seek_discards_buffer_and_corrects_current() {
        let mut device = serving(b"abcdefgh", 64);
        device
            .expect_seek()
            .withf(|offset, origin| *offset == -7 && *origin == SeekOrigin::Current)
            .times(1)
            .returning(|_, _| Ok(1));

        let mut reader = BufferedReader::with_device(device, 8);
        assert_eq!(reader.bump().unwrap(), Some(b'a'));
        // Device sits at 8, logical position is 1.
        assert_eq!(reader.seek(0, SeekOrigin::Current).unwrap(), 1);
        assert_eq!(reader.available(), 0);
    }

    #[test]
    fn test_read_on_closed_reader_is_misuse() {
        let mut reader: BufferedReader<MockByteDevice> = BufferedReader::new(8);
        assert!(matches!(
            reader.read(&mut [0u8; 4]),
            Err(StreamError::NotOpen)
        ));
        assert!(reader.peek().unwrap_err().is_misuse());
    }

    #[test]
    fn test_device_failure_propagates() {
        let mut device = byte_device();
        device
            .expect_read()
            .returning(|_| Err(BridgeError::OperationFailed("bad sector".into())));

        let mut reader = BufferedReader::with_device(device, 8);
        let err = reader.read(&mut [0u8; 2]).unwrap_err();
        assert!(err.is_device_error());
    }
}
