//! Stream factory bound to an [`IoConfig`].

use std::path::Path;
use std::sync::Arc;

use bridge_traits::{OpenMode, PlatformIo, StdDevice, StdHandleKind};
use core_runtime::{BufferSettings, IoConfig};
use tracing::instrument;

use crate::async_writer::AsyncFileWriter;
use crate::console::{ConsoleReader, ConsoleWriter};
use crate::error::{Result, StreamError};
use crate::reader::FileReader;
use crate::std_streams::StdStreams;
use crate::writer::FileWriter;

/// Opens streams through the configured platform with the configured
/// buffer sizes.
///
/// # Example
///
/// ```ignore
/// use core_runtime::IoConfig;
/// use core_stream::{IoContext, OpenMode};
///
/// let context = IoContext::new(IoConfig::builder().build()?)?;
/// let mut log = context.open_async_writer("run.log".as_ref(), OpenMode::WRITE | OpenMode::APPEND)?;
/// log.write(b"started\n")?;
/// log.close()?;
/// ```
#[derive(Debug, Clone)]
pub struct IoContext {
    config: IoConfig,
}

impl IoContext {
    /// Wrap a validated configuration.
    pub fn new(config: IoConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|err| StreamError::Misuse(err.to_string()))?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &IoConfig {
        &self.config
    }

    pub fn platform(&self) -> &Arc<dyn PlatformIo> {
        &self.config.platform
    }

    pub fn buffers(&self) -> &BufferSettings {
        &self.config.buffers
    }

    #[instrument(skip(self), level = "debug")]
    pub fn open_writer(&self, path: &Path, mode: OpenMode) -> Result<FileWriter> {
        let mut writer = FileWriter::new(self.config.buffers.buffer_capacity);
        writer.open(self.config.platform.as_ref(), path, mode)?;
        Ok(writer)
    }

    #[instrument(skip(self), level = "debug")]
    pub fn open_reader(&self, path: &Path) -> Result<FileReader> {
        let mut reader = FileReader::new(self.config.buffers.reader_capacity);
        reader.open(self.config.platform.as_ref(), path, OpenMode::READ)?;
        Ok(reader)
    }

    #[instrument(skip(self), level = "debug")]
    pub fn open_async_writer(&self, path: &Path, mode: OpenMode) -> Result<AsyncFileWriter> {
        let mut writer = AsyncFileWriter::new(self.config.buffers.async_buffer_capacity);
        writer.open(self.config.platform.as_ref(), path, mode)?;
        Ok(writer)
    }

    /// Console writer over standard output or error.
    ///
    /// Fails with [`StreamError::Misuse`] when the handle is redirected.
    pub fn console_writer(&self, kind: StdHandleKind) -> Result<ConsoleWriter> {
        if kind == StdHandleKind::Input {
            return Err(StreamError::Misuse(
                "standard input cannot be written".to_string(),
            ));
        }
        match self.std_device(kind)? {
            StdDevice::Console(device) => Ok(ConsoleWriter::new(
                device,
                self.config.buffers.console_buffer_units,
            )),
            StdDevice::Stream(_) => Err(not_a_console(kind)),
        }
    }

    /// Console reader over standard input.
    pub fn console_reader(&self) -> Result<ConsoleReader> {
        match self.std_device(StdHandleKind::Input)? {
            StdDevice::Console(device) => Ok(ConsoleReader::new(
                device,
                self.config.buffers.console_buffer_units,
            )),
            StdDevice::Stream(_) => Err(not_a_console(StdHandleKind::Input)),
        }
    }

    fn std_device(&self, kind: StdHandleKind) -> Result<StdDevice> {
        self.config
            .platform
            .std_handle(kind)
            .map_err(StreamError::device("standard handle"))
    }

    /// Classify and wrap all three standard handles.
    pub fn std_streams(&self) -> StdStreams {
        StdStreams::init(self.config.platform.as_ref(), &self.config.buffers)
    }
}

fn not_a_console(kind: StdHandleKind) -> StreamError {
    StreamError::Misuse(format!("{:?} handle is not a console", kind))
}
