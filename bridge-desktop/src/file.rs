//! Blocking file device backed by `std::fs`

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bridge_traits::{
    device::{Device, OpenMode, SeekOrigin},
    error::{BridgeError, Result},
};
use tracing::debug;

/// Translate an access intent into `std` open options.
///
/// Output modes create the file; `WRITE` without `APPEND` truncates it.
fn open_options(mode: OpenMode) -> OpenOptions {
    let mut options = OpenOptions::new();
    options.read(mode.contains(OpenMode::READ));
    if mode.contains(OpenMode::APPEND) {
        options.append(true).create(true);
    } else if mode.contains(OpenMode::WRITE) {
        options.write(true).create(true).truncate(true);
    }
    options
}

/// Byte device over an opened [`File`]
pub struct FileDevice {
    file: Option<File>,
    path: PathBuf,
}

impl FileDevice {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let file = open_options(mode).open(path).map_err(Self::map_io_error)?;
        debug!(path = ?path, mode = ?mode, "Opened file device");
        Ok(Self {
            file: Some(file),
            path: path.to_path_buf(),
        })
    }

    fn map_io_error(e: io::Error) -> BridgeError {
        BridgeError::Io(e)
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| BridgeError::OperationFailed(format!("{} is closed", self.path.display())))
    }
}

impl Device for FileDevice {
    type Unit = u8;

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.file()?.write_all(data).map_err(Self::map_io_error)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let file = self.file()?;
        loop {
            match file.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Self::map_io_error(e)),
            }
        }
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64> {
        let target = match origin {
            SeekOrigin::Start => {
                let start = u64::try_from(offset).map_err(|_| {
                    BridgeError::Io(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "negative offset from start",
                    ))
                })?;
                SeekFrom::Start(start)
            }
            SeekOrigin::Current => SeekFrom::Current(offset),
            SeekOrigin::End => SeekFrom::End(offset),
        };
        self.file()?.seek(target).map_err(Self::map_io_error)
    }

    fn close(&mut self) -> Result<()> {
        if self.file.take().is_some() {
            debug!(path = ?self.path, "Closed file device");
        }
        Ok(())
    }
}
