//! Stream traits shared by every writer and reader, and `std::io` interop.

use std::io;

use bridge_traits::Device;

use crate::async_writer::AsyncFileWriter;
use crate::console::{ConsoleReader, ConsoleWriter};
use crate::error::Result;
use crate::reader::BufferedReader;
use crate::writer::BufferedWriter;

/// Buffered sink of `Unit`s.
///
/// Implementations are single-threaded; nothing here blocks except
/// [`flush`](OutputStream::flush) and [`close`](OutputStream::close).
pub trait OutputStream {
    type Unit: Copy;

    fn write(&mut self, data: &[Self::Unit]) -> Result<()>;

    fn put(&mut self, unit: Self::Unit) -> Result<()> {
        self.write(&[unit])
    }

    fn fill(&mut self, unit: Self::Unit, count: usize) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;
}

/// Buffered source of `Unit`s. A zero-length read means end of data.
pub trait InputStream {
    type Unit: Copy;

    fn read(&mut self, dest: &mut [Self::Unit]) -> Result<usize>;

    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;
}

impl<D: Device> OutputStream for BufferedWriter<D> {
    type Unit = D::Unit;

    fn write(&mut self, data: &[D::Unit]) -> Result<()> {
        BufferedWriter::write(self, data)
    }

    fn put(&mut self, unit: D::Unit) -> Result<()> {
        BufferedWriter::put(self, unit)
    }

    fn fill(&mut self, unit: D::Unit, count: usize) -> Result<()> {
        BufferedWriter::fill(self, unit, count)
    }

    fn flush(&mut self) -> Result<()> {
        BufferedWriter::flush(self)
    }

    fn close(&mut self) -> Result<()> {
        BufferedWriter::close(self)
    }

    fn is_open(&self) -> bool {
        BufferedWriter::is_open(self)
    }
}

impl OutputStream for AsyncFileWriter {
    type Unit = u8;

    fn write(&mut self, data: &[u8]) -> Result<()> {
        AsyncFileWriter::write(self, data)
    }

    fn fill(&mut self, unit: u8, count: usize) -> Result<()> {
        AsyncFileWriter::fill(self, unit, count)
    }

    fn flush(&mut self) -> Result<()> {
        AsyncFileWriter::flush(self)
    }

    fn close(&mut self) -> Result<()> {
        AsyncFileWriter::close(self)
    }

    fn is_open(&self) -> bool {
        AsyncFileWriter::is_open(self)
    }
}

impl<D: Device<Unit = u16>> OutputStream for ConsoleWriter<D> {
    type Unit = u8;

    fn write(&mut self, data: &[u8]) -> Result<()> {
        ConsoleWriter::write(self, data)
    }

    fn fill(&mut self, unit: u8, count: usize) -> Result<()> {
        ConsoleWriter::fill(self, unit, count)
    }

    fn flush(&mut self) -> Result<()> {
        ConsoleWriter::flush(self)
    }

    fn close(&mut self) -> Result<()> {
        ConsoleWriter::close(self)
    }

    fn is_open(&self) -> bool {
        ConsoleWriter::is_open(self)
    }
}

impl<D: Device> InputStream for BufferedReader<D> {
    type Unit = D::Unit;

    fn read(&mut self, dest: &mut [D::Unit]) -> Result<usize> {
        BufferedReader::read(self, dest)
    }

    fn close(&mut self) -> Result<()> {
        BufferedReader::close(self)
    }

    fn is_open(&self) -> bool {
        BufferedReader::is_open(self)
    }
}

impl<D: Device<Unit = u16>> InputStream for ConsoleReader<D> {
    type Unit = u8;

    fn read(&mut self, dest: &mut [u8]) -> Result<usize> {
        ConsoleReader::read(self, dest)
    }

    fn close(&mut self) -> Result<()> {
        ConsoleReader::close(self)
    }

    fn is_open(&self) -> bool {
        ConsoleReader::is_open(self)
    }
}

// `std::io` adapters for byte streams. Each write accepts the whole slice.

impl<D: Device<Unit = u8>> io::Write for BufferedWriter<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        BufferedWriter::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(BufferedWriter::flush(self)?)
    }
}

impl io::Write for AsyncFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        AsyncFileWriter::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(AsyncFileWriter::flush(self)?)
    }
}

impl<D: Device<Unit = u16>> io::Write for ConsoleWriter<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ConsoleWriter::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(ConsoleWriter::flush(self)?)
    }
}

impl<D: Device<Unit = u8>> io::Read for BufferedReader<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(BufferedReader::read(self, buf)?)
    }
}

impl<D: Device<Unit = u16>> io::Read for ConsoleReader<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(ConsoleReader::read(self, buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{byte_device, MockByteDevice};
    use std::io::{Read, Write};

    fn drain(stream: &mut dyn OutputStream<Unit = u8>) -> Result<()> {
        stream.put(b'!')?;
        stream.fill(b'.', 3)?;
        stream.flush()
    }

    #[test]
    fn test_trait_object_drives_writer() {
        let mut device = byte_device();
        device
            .expect_write()
            .withf(|data| *data == *b"!...")
            .times(1)
            .returning(|_| Ok(()));
        let mut writer = BufferedWriter::with_device(device, 8);
        drain(&mut writer).unwrap();
    }

    #[test]
    fn test_write_macro_through_io_adapter() {
        let mut device = byte_device();
        device
            .expect_write()
            .withf(|data| *data == *b"n=42\n")
            .times(1)
            .returning(|_| Ok(()));
        let mut writer = BufferedWriter::with_device(device, 16);
        writeln!(writer, "n={}", 42).unwrap();
        Write::flush(&mut writer).unwrap();
    }

    #[test]
    fn test_io_error_keeps_kind() {
        let mut writer: BufferedWriter<MockByteDevice> = BufferedWriter::new(8);
        let err = Write::write(&mut writer, b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_read_to_string_through_io_adapter() {
        let mut device = byte_device();
        let mut served = false;
        device.expect_read().returning(move |buf| {
            if served {
                return Ok(0);
            }
            served = true;
            buf[..5].copy_from_slice(b"hello");
            Ok(5)
        });
        let mut reader = BufferedReader::with_device(device, 8);
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello");
    }
}
