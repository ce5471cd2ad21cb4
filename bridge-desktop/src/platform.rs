//! Desktop implementation of [`PlatformIo`]

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use bridge_traits::{
    device::{Device, OpenMode},
    error::Result,
    overlapped::OverlappedDevice,
    platform::{PlatformIo, StdDevice, StdHandleKind},
};
use tracing::debug;

use crate::console::{ConsoleIn, ConsoleOut, StdStreamDevice};
use crate::file::FileDevice;
use crate::overlapped::{IoPool, OverlappedFile};

/// Blocking threads used for overlapped writes when not configured
pub const DEFAULT_IO_THREADS: usize = 4;

/// Desktop platform (macOS, Windows, Linux)
///
/// Files go through `std::fs`; overlapped writes run on a private Tokio
/// blocking pool shared by every overlapped device the platform opens.
pub struct DesktopPlatform {
    pool: Arc<IoPool>,
}

impl DesktopPlatform {
    /// Create a platform with [`DEFAULT_IO_THREADS`] overlapped workers
    pub fn new() -> Result<Self> {
        Self::with_io_threads(DEFAULT_IO_THREADS)
    }

    /// Create a platform with a custom number of overlapped workers
    pub fn with_io_threads(io_threads: usize) -> Result<Self> {
        let pool = Arc::new(IoPool::new(io_threads)?);
        debug!(io_threads, "Desktop platform ready");
        Ok(Self { pool })
    }

    fn is_terminal(kind: StdHandleKind) -> bool {
        match kind {
            StdHandleKind::Input => std::io::stdin().is_terminal(),
            StdHandleKind::Output => std::io::stdout().is_terminal(),
            StdHandleKind::Error => std::io::stderr().is_terminal(),
        }
    }
}

impl PlatformIo for DesktopPlatform {
    fn open(&self, path: &Path, mode: OpenMode) -> Result<Box<dyn Device<Unit = u8>>> {
        Ok(Box::new(FileDevice::open(path, mode)?))
    }

    fn open_overlapped(&self, path: &Path, mode: OpenMode) -> Result<Box<dyn OverlappedDevice>> {
        Ok(Box::new(OverlappedFile::open(
            path,
            mode,
            Arc::clone(&self.pool),
        )?))
    }

    fn std_handle(&self, kind: StdHandleKind) -> Result<StdDevice> {
        let console = Self::is_terminal(kind);
        debug!(kind = ?kind, console, "Classified standard handle");

        Ok(match (kind, console) {
            (StdHandleKind::Input, true) => StdDevice::Console(Box::new(ConsoleIn::new())),
            (_, true) => StdDevice::Console(Box::new(ConsoleOut::new(kind))),
            (_, false) => StdDevice::Stream(Box::new(StdStreamDevice::new(kind))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.txt");
        let platform = DesktopPlatform::new().unwrap();

        let mut out = platform.open(&path, OpenMode::WRITE).unwrap();
        out.write(b"desktop").unwrap();
        out.close().unwrap();

        let mut input = platform.open(&path, OpenMode::READ).unwrap();
        let mut buf = [0u8; 16];
        let n = input.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"desktop");
    }

    #[test]
    fn test_std_handles_are_classified() {
        let platform = DesktopPlatform::new().unwrap();
        for kind in [StdHandleKind::Input, StdHandleKind::Output, StdHandleKind::Error] {
            let device = platform.std_handle(kind).unwrap();
            assert_eq!(device.is_console(), DesktopPlatform::is_terminal(kind));
        }
    }
}
