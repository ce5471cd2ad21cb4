//! # Standard Streams
//!
//! Process standard input, output and error as explicit state owned by the
//! entry point. [`StdStreams::init`] classifies each handle through the
//! platform:
//!
//! - a console gets the transcoding adapter
//! - a redirected handle (pipe or file) gets a buffered byte stream; error
//!   output is unbuffered
//! - a missing handle gets a null stream that reports why on every use
//!
//! [`StdStreams::teardown`] flushes and closes all three.

use std::io;

use bridge_traits::{BridgeError, PlatformIo, StdDevice, StdHandleKind};
use core_runtime::BufferSettings;
use tracing::{debug, warn};

use crate::console::{ConsoleReader, ConsoleWriter};
use crate::error::{Result, StreamError};
use crate::reader::{BufferedReader, FileReader};
use crate::stream::{InputStream, OutputStream};
use crate::writer::{BufferedWriter, FileWriter};

fn unavailable(kind: StdHandleKind, reason: &str) -> StreamError {
    StreamError::Device {
        operation: "standard handle",
        source: BridgeError::NotAvailable(format!("{:?}: {}", kind, reason)),
    }
}

/// Standard output or error stream
#[derive(Debug)]
pub enum StdWriter {
    Console(ConsoleWriter),
    Stream(FileWriter),
    /// The handle could not be acquired
    Null { kind: StdHandleKind, reason: String },
}

impl StdWriter {
    fn acquire(platform: &dyn PlatformIo, kind: StdHandleKind, buffers: &BufferSettings) -> Self {
        match platform.std_handle(kind) {
            Ok(StdDevice::Console(device)) => {
                StdWriter::Console(ConsoleWriter::new(device, buffers.console_buffer_units))
            }
            Ok(StdDevice::Stream(device)) => {
                let writer = match kind {
                    StdHandleKind::Error => BufferedWriter::unbuffered(device),
                    _ => BufferedWriter::with_device(device, buffers.buffer_capacity),
                };
                StdWriter::Stream(writer)
            }
            Err(err) => {
                warn!(handle = ?kind, error = %err, "Standard handle unavailable");
                StdWriter::Null {
                    kind,
                    reason: err.to_string(),
                }
            }
        }
    }

    pub fn is_console(&self) -> bool {
        matches!(self, StdWriter::Console(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StdWriter::Null { .. })
    }
}

impl OutputStream for StdWriter {
    type Unit = u8;

    fn write(&mut self, data: &[u8]) -> Result<()> {
        match self {
            StdWriter::Console(writer) => writer.write(data),
            StdWriter::Stream(writer) => writer.write(data),
            StdWriter::Null { kind, reason } => Err(unavailable(*kind, reason)),
        }
    }

    fn put(&mut self, byte: u8) -> Result<()> {
        match self {
            StdWriter::Console(writer) => writer.put(byte),
            StdWriter::Stream(writer) => writer.put(byte),
            StdWriter::Null { kind, reason } => Err(unavailable(*kind, reason)),
        }
    }

    fn fill(&mut self, byte: u8, count: usize) -> Result<()> {
        match self {
            StdWriter::Console(writer) => writer.fill(byte, count),
            StdWriter::Stream(writer) => writer.fill(byte, count),
            StdWriter::Null { kind, reason } => Err(unavailable(*kind, reason)),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            StdWriter::Console(writer) => writer.flush(),
            StdWriter::Stream(writer) => writer.flush(),
            StdWriter::Null { .. } => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self {
            StdWriter::Console(writer) => writer.close(),
            StdWriter::Stream(writer) => writer.close(),
            StdWriter::Null { .. } => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        match self {
            StdWriter::Console(writer) => writer.is_open(),
            StdWriter::Stream(writer) => writer.is_open(),
            StdWriter::Null { .. } => false,
        }
    }
}

impl io::Write for StdWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        OutputStream::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(OutputStream::flush(self)?)
    }
}

/// Standard input stream
#[derive(Debug)]
pub enum StdReader {
    Console(ConsoleReader),
    Stream(FileReader),
    Null { kind: StdHandleKind, reason: String },
}

impl StdReader {
    fn acquire(platform: &dyn PlatformIo, buffers: &BufferSettings) -> Self {
        let kind = StdHandleKind::Input;
        match platform.std_handle(kind) {
            Ok(StdDevice::Console(device)) => {
                StdReader::Console(ConsoleReader::new(device, buffers.console_buffer_units))
            }
            Ok(StdDevice::Stream(device)) => {
                StdReader::Stream(BufferedReader::with_device(device, buffers.reader_capacity))
            }
            Err(err) => {
                warn!(handle = ?kind, error = %err, "Standard handle unavailable");
                StdReader::Null {
                    kind,
                    reason: err.to_string(),
                }
            }
        }
    }

    pub fn is_console(&self) -> bool {
        matches!(self, StdReader::Console(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StdReader::Null { .. })
    }
}

impl InputStream for StdReader {
    type Unit = u8;

    fn read(&mut self, dest: &mut [u8]) -> Result<usize> {
        match self {
            StdReader::Console(reader) => reader.read(dest),
            StdReader::Stream(reader) => reader.read(dest),
            StdReader::Null { kind, reason } => Err(unavailable(*kind, reason)),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self {
            StdReader::Console(reader) => reader.close(),
            StdReader::Stream(reader) => reader.close(),
            StdReader::Null { .. } => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        match self {
            StdReader::Console(reader) => reader.is_open(),
            StdReader::Stream(reader) => reader.is_open(),
            StdReader::Null { .. } => false,
        }
    }
}

impl io::Read for StdReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(InputStream::read(self, buf)?)
    }
}

/// The three standard streams of the process
#[derive(Debug)]
pub struct StdStreams {
    input: StdReader,
    output: StdWriter,
    error: StdWriter,
}

impl StdStreams {
    /// Acquire and classify every standard handle.
    ///
    /// Never fails: a handle the platform cannot provide becomes a null
    /// stream whose operations report the platform's error.
    pub fn init(platform: &dyn PlatformIo, buffers: &BufferSettings) -> Self {
        let streams = Self {
            input: StdReader::acquire(platform, buffers),
            output: StdWriter::acquire(platform, StdHandleKind::Output, buffers),
            error: StdWriter::acquire(platform, StdHandleKind::Error, buffers),
        };
        debug!(
            input_console = streams.input.is_console(),
            output_console = streams.output.is_console(),
            error_console = streams.error.is_console(),
            "Standard streams initialized"
        );
        streams
    }

    pub fn input(&mut self) -> &mut StdReader {
        &mut self.input
    }

    pub fn output(&mut self) -> &mut StdWriter {
        &mut self.output
    }

    pub fn error(&mut self) -> &mut StdWriter {
        &mut self.error
    }

    /// Flush and close every stream, returning the first failure.
    pub fn teardown(mut self) -> Result<()> {
        let output = self.output.close();
        let error = self.error.close();
        let input = self.input.close();
        debug!("Standard streams torn down");
        output.and(error).and(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::memory::{IoEvent, MemoryPlatform};
    use std::io::{Read, Write};

    fn settings() -> BufferSettings {
        BufferSettings::default()
    }

    #[test]
    fn test_console_handles_get_adapters() {
        let platform = MemoryPlatform::new();
        let mut streams = StdStreams::init(&platform, &settings());
        assert!(streams.input().is_console());
        assert!(streams.output().is_console());

        writeln!(streams.output(), "héllo").unwrap();
        assert_eq!(platform.console_text(), "héllo\r\n");
        streams.teardown().unwrap();
    }

    #[test]
    fn test_console_input_is_transcoded() {
        let platform = MemoryPlatform::new();
        platform.push_console_input("ja\r\n");
        let mut streams = StdStreams::init(&platform, &settings());

        let mut line = [0u8; 16];
        let n = Read::read(streams.input(), &mut line).unwrap();
        assert_eq!(&line[..n], b"ja\n");
    }

    #[test]
    fn test_redirected_output_is_buffered_until_teardown() {
        let platform = MemoryPlatform::new().with_redirected_std_handles(true);
        let mut streams = StdStreams::init(&platform, &settings());
        assert!(!streams.output().is_console());

        OutputStream::write(streams.output(), b"report\n").unwrap();
        assert_eq!(platform.file("<stdout>").unwrap(), b"");
        streams.teardown().unwrap();
        assert_eq!(platform.file("<stdout>").unwrap(), b"report\n");
    }

    #[test]
    fn test_redirected_error_is_unbuffered() {
        let platform = MemoryPlatform::new().with_redirected_std_handles(true);
        let mut streams = StdStreams::init(&platform, &settings());

        OutputStream::write(streams.error(), b"oops").unwrap();
        assert_eq!(platform.file("<stderr>").unwrap(), b"oops");
        assert!(platform
            .events()
            .iter()
            .any(|event| matches!(event, IoEvent::Write { .. })));
    }

    #[test]
    fn test_missing_handle_reports_on_use() {
        let platform = MemoryPlatform::new().without_std_handle(StdHandleKind::Output);
        let mut streams = StdStreams::init(&platform, &settings());
        assert!(streams.output().is_null());

        let err = OutputStream::write(streams.output(), b"lost").unwrap_err();
        assert!(err.is_device_error());
        assert!(err.to_string().contains("standard handle"));
        // Nothing buffered, nothing to report at teardown.
        streams.teardown().unwrap();
    }
}
