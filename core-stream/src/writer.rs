//! # Synchronous Buffered Writer
//!
//! One owned buffer in front of a blocking [`Device`]. Small writes collect
//! in the buffer; a write that would not fit flushes what is buffered and
//! sends the remainder straight to the device when it exceeds the buffer.

use std::path::Path;

use bridge_traits::{Device, OpenMode, PlatformIo};
use tracing::{debug, trace, warn};

use crate::buffer::{allocate, storage_for, BufferMode};
use crate::error::{Result, StreamError};

/// Units written per device call when filling without a buffer
const FILL_BLOCK: usize = 256;

enum State<U> {
    /// No buffer chosen yet; the default is applied on first use
    Unconfigured,
    Unbuffered,
    Buffered { data: Vec<U>, len: usize },
}

/// Buffered writer over any device.
///
/// The writer starts closed unless created with [`BufferedWriter::with_device`].
pub struct BufferedWriter<D: Device> {
    device: Option<D>,
    state: State<D::Unit>,
    default_capacity: usize,
}

/// Byte writer over a platform file
pub type FileWriter = BufferedWriter<Box<dyn Device<Unit = u8>>>;

impl<D: Device> BufferedWriter<D> {
    /// Closed writer that allocates `default_capacity` units on first write
    pub fn new(default_capacity: usize) -> Self {
        Self {
            device: None,
            state: State::Unconfigured,
            default_capacity,
        }
    }

    pub fn with_device(device: D, default_capacity: usize) -> Self {
        let mut writer = Self::new(default_capacity);
        writer.device = Some(device);
        writer
    }

    /// Writer over `device` that passes every write straight through
    pub fn unbuffered(device: D) -> Self {
        let mut writer = Self::with_device(device, 0);
        writer.state = State::Unbuffered;
        writer
    }

    /// Bind an opened device to a closed writer.
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

    /// Units currently held in the buffer
    pub fn buffered(&self) -> usize {
        match &self.state {
            State::Buffered { len, .. } => *len,
            _ => 0,
        }
    }

    /// Buffer capacity in units; zero when unbuffered or not yet configured
    pub fn capacity(&self) -> usize {
        match &self.state {
            State::Buffered { data, .. } => data.len(),
            _ => 0,
        }
    }

    pub fn get_ref(&self) -> Option<&D> {
        self.device.as_ref()
    }

    /// Choose the buffering strategy. Buffered content is flushed first.
    pub fn setbuf(&mut self, mode: BufferMode<D::Unit>) -> Result<()> {
        let storage = storage_for(mode)?;
        self.flush()?;
        self.state = match storage {
            Some(data) => State::Buffered { data, len: 0 },
            None => State::Unbuffered,
        };
        Ok(())
    }

    fn ensure_configured(&mut self) -> Result<()> {
        if let State::Unconfigured = self.state {
            self.state = State::Buffered {
                data: allocate(self.default_capacity.max(1))?,
                len: 0,
            };
        }
        Ok(())
    }

    fn device_mut(&mut self) -> Result<&mut D> {
        self.device.as_mut().ok_or(StreamError::NotOpen)
    }

    fn write_direct(&mut self, data: &[D::Unit]) -> Result<()> {
        trace!(units = data.len(), "Direct write");
        self.device_mut()?
            .write(data)
            .map_err(StreamError::device("write"))
    }

    /// Write every unit of `data`.
    pub fn write(&mut self, data: &[D::Unit]) -> Result<()> {
        if self.device.is_none() {
            return Err(StreamError::NotOpen);
        }
        if data.is_empty() {
            return Ok(());
        }
        self.ensure_configured()?;

        let mut rest = data;
        if let State::Buffered { data: buf, len } = &mut self.state {
            if *len > 0 {
                let n = (buf.len() - *len).min(rest.len());
                buf[*len..*len + n].copy_from_slice(&rest[..n]);
                *len += n;
                rest = &rest[n..];
                if rest.is_empty() {
                    return Ok(());
                }
                self.flush()?;
            }
        }

        match &mut self.state {
            State::Buffered { data: buf, len } if rest.len() <= buf.len() => {
                buf[..rest.len()].copy_from_slice(rest);
                *len = rest.len();
                Ok(())
            }
            _ => self.write_direct(rest),
        }
    }

    /// Write a single unit.
    pub fn put(&mut self, unit: D::Unit) -> Result<()> {
        if self.device.is_none() {
            return Err(StreamError::NotOpen);
        }
        self.ensure_configured()?;

        if let State::Buffered { data, len } = &mut self.state {
            if *len == data.len() {
                self.flush()?;
            }
        }
        match &mut self.state {
            State::Buffered { data, len } => {
                data[*len] = unit;
                *len += 1;
                Ok(())
            }
            _ => self.write_direct(&[unit]),
        }
    }

    /// Write `unit` `count` times without materializing the run.
    pub fn fill(&mut self, unit: D::Unit, count: usize) -> Result<()> {
        if self.device.is_none() {
            return Err(StreamError::NotOpen);
        }
        if count == 0 {
            return Ok(());
        }
        self.ensure_configured()?;

        let mut remaining = count;
        while remaining > 0 {
            match &mut self.state {
                State::Buffered { data, len } => {
                    let space = data.len() - *len;
                    if space == 0 {
                        self.flush()?;
                        continue;
                    }
                    let n = space.min(remaining);
                    data[*len..*len + n].fill(unit);
                    *len += n;
                    remaining -= n;
                }
                _ => {
                    let block = [unit; FILL_BLOCK];
                    let n = remaining.min(FILL_BLOCK);
                    self.write_direct(&block[..n])?;
                    remaining -= n;
                }
            }
        }
        Ok(())
    }

    /// Write out exactly the buffered units.
    ///
    /// An empty buffer performs no device operation. The buffer is emptied
    /// even when the device fails.
    pub fn flush(&mut self) -> Result<()> {
        let Some(device) = self.device.as_mut() else {
            return match self.buffered() {
                0 => Ok(()),
                _ => Err(StreamError::NotOpen),
            };
        };

        if let State::Buffered { data, len } = &mut self.state {
            if *len > 0 {
                let pending = std::mem::take(len);
                trace!(units = pending, "Flushing buffer");
                device
                    .write(&data[..pending])
                    .map_err(StreamError::device("write"))?;
            }
        }
        Ok(())
    }

    /// Flush and release the device. Closing a closed writer is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.device.is_none() {
            return Ok(());
        }
        let flushed = self.flush();
        let closed = match self.device.take() {
            Some(mut device) => device.close().map_err(StreamError::device("close")),
            None => Ok(()),
        };
        debug!("Closed buffered writer");
        flushed.and(closed)
    }
}

impl BufferedWriter<Box<dyn Device<Unit = u8>>> {
    /// Open `path` through `platform` for output.
    ///
    /// `mode` must ask for `WRITE` or `APPEND` and must not ask for `READ`.
    pub fn open(&mut self, platform: &dyn PlatformIo, path: &Path, mode: OpenMode) -> Result<()> {
        if self.device.is_some() {
            return Err(StreamError::Misuse("stream is already open".to_string()));
        }
        if !mode.is_output() || mode.contains(OpenMode::READ) {
            return Err(StreamError::InvalidMode {
                mode,
                stream: "file writer",
            });
        }

        let device = platform
            .open(path, mode)
            .map_err(StreamError::device("open"))?;
        debug!(path = ?path, mode = ?mode, "Opened file writer");
        self.device = Some(device);
        Ok(())
    }
}

impl<D: Device> Drop for BufferedWriter<D> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "Failed to close writer on drop");
        }
    }
}

impl<D: Device> std::fmt::Debug for BufferedWriter<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedWriter")
            .field("open", &self.is_open())
            .field("buffered", &self.buffered())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{byte_device, MockByteDevice};
    use bridge_traits::BridgeError;
    use mockall::Sequence;
    use std::io;

    fn writer(device: MockByteDevice, capacity: usize) -> BufferedWriter<MockByteDevice> {
        BufferedWriter::with_device(device, capacity)
    }

    #[test]
    fn test_partial_fill_then_bypass() {
        let mut device = byte_device();
        let mut seq = Sequence::new();
        device
            .expect_write()
            .withf(|data| data == b"abcdefgh")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        device
            .expect_write()
            .withf(|data| data.len() == 21 && data[0] == b'i')
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut w = writer(device, 8);
        w.write(b"abcde").unwrap();
        assert_eq!(w.buffered(), 5);
        w.write(b"fghijklmnopqrstuvwxyz012").unwrap();
        assert_eq!(w.buffered(), 0);
    }

    #[test]
    fn test_small_writes_stay_buffered() {
        let mut device = byte_device();
        device
            .expect_write()
            .withf(|data| data == b"hello world")
            .times(1)
            .returning(|_| Ok(()));

        let mut w = writer(device, 16);
        w.write(b"hello").unwrap();
        w.write(b" world").unwrap();
        w.flush().unwrap();
    }

    #[test]
    fn test_flush_twice_writes_once() {
        let mut device = byte_device();
        device.expect_write().times(1).returning(|_| Ok(()));

        let mut w = writer(device, 8);
        w.write(b"abc").unwrap();
        w.flush().unwrap();
        w.flush().unwrap();
    }

    #[test]
    fn test_remainder_equal_to_capacity_is_buffered() {
        let mut device = byte_device();
        device
            .expect_write()
            .withf(|data| data == b"abcd")
            .times(1)
            .returning(|_| Ok(()));

        let mut w = writer(device, 4);
        w.write(b"abcd").unwrap();
        assert_eq!(w.buffered(), 4);
        w.close().unwrap();
    }

    #[test]
    fn test_unbuffered_writes_directly() {
        let mut device = byte_device();
        device.expect_write().times(2).returning(|_| Ok(()));

        let mut w = writer(device, 8);
        w.setbuf(BufferMode::Unbuffered).unwrap();
        w.write(b"a").unwrap();
        w.write(b"b").unwrap();
        assert_eq!(w.capacity(), 0);
    }

    #[test]
    fn test_unbuffered_constructor_skips_buffering() {
        let mut device = byte_device();
        device
            .expect_write()
            .withf(|data| data == b"z")
            .times(1)
            .returning(|_| Ok(()));

        let mut w = BufferedWriter::unbuffered(device);
        w.put(b'z').unwrap();
        assert_eq!(w.capacity(), 0);
    }

    #[test]
    fn test_fill_flushes_full_buffers() {
        let mut device = byte_device();
        device
            .expect_write()
            .withf(|data| data == b"xxxx")
            .times(2)
            .returning(|_| Ok(()));
        device
            .expect_write()
            .withf(|data| data == b"xx")
            .times(1)
            .returning(|_| Ok(()));

        let mut w = writer(device, 4);
        w.fill(b'x', 10).unwrap();
        w.flush().unwrap();
    }

    #[test]
    fn test_unbuffered_fill_uses_bounded_blocks() {
        let mut device = byte_device();
        device
            .expect_write()
            .withf(|data| data.len() <= FILL_BLOCK && data.iter().all(|&b| b == b'-'))
            .times(3)
            .returning(|_| Ok(()));

        let mut w = writer(device, 8);
        w.setbuf(BufferMode::Unbuffered).unwrap();
        w.fill(b'-', FILL_BLOCK * 2 + 1).unwrap();
    }

    #[test]
    fn test_put_flushes_when_full() {
        let mut device = byte_device();
        device
            .expect_write()
            .withf(|data| data == b"ab")
            .times(1)
            .returning(|_| Ok(()));
        device
            .expect_write()
            .withf(|data| data == b"c")
            .times(1)
            .returning(|_| Ok(()));

        let mut w = writer(device, 2);
        for b in b"abc" {
            w.put(*b).unwrap();
        }
        w.close().unwrap();
        assert!(!w.is_open());
    }

    #[test]
    fn test_provided_buffer_sets_capacity() {
        let mut device = byte_device();
        device.expect_write().times(1).returning(|_| Ok(()));

        let mut w = writer(device, 8);
        w.setbuf(BufferMode::Provided(vec![0u8; 3])).unwrap();
        w.write(b"abc").unwrap();
        assert_eq!(w.capacity(), 3);
        w.flush().unwrap();
    }

    #[test]
    fn test_write_to_closed_writer_is_misuse() {
        let mut w: BufferedWriter<MockByteDevice> = BufferedWriter::new(8);
        let err = w.write(b"x").unwrap_err();
        assert!(matches!(err, StreamError::NotOpen));
        assert!(w.put(b'x').unwrap_err().is_misuse());
        assert!(w.fill(b'x', 3).unwrap_err().is_misuse());
    }

    #[test]
    fn test_device_failure_propagates_with_code() {
        let mut device = byte_device();
        device
            .expect_write()
            .returning(|_| Err(BridgeError::Io(io::Error::from_raw_os_error(28))));

        let mut w = writer(device, 4);
        w.write(b"ab").unwrap();
        let err = w.flush().unwrap_err();
        assert!(err.is_device_error());
        assert_eq!(err.os_code(), Some(28));
        // Buffer state stays consistent: nothing left to retry.
        assert_eq!(w.buffered(), 0);
    }

    #[test]
    fn test_drop_flushes() {
        let mut device = byte_device();
        device
            .expect_write()
            .withf(|data| data == b"tail")
            .times(1)
            .returning(|_| Ok(()));

        let mut w = writer(device, 8);
        w.write(b"tail").unwrap();
    }

    #[test]
    fn test_drop_swallows_errors() {
        let mut device = MockByteDevice::new();
        device
            .expect_write()
            .returning(|_| Err(BridgeError::OperationFailed("disk gone".into())));
        device
            .expect_close()
            .returning(|| Err(BridgeError::OperationFailed("disk gone".into())));

        let mut w = writer(device, 8);
        w.write(b"lost").unwrap();
        drop(w);
    }

    #[test]
    fn test_attach_twice_is_misuse() {
        let mut w = BufferedWriter::new(4);
        w.attach(byte_device()).unwrap();
        assert!(w.attach(byte_device()).unwrap_err().is_misuse());
    }
}
