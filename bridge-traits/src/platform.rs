//! Platform I/O Primitives
//!
//! The entry point each host platform implements. A platform turns paths and
//! standard-handle requests into [`Device`] and [`OverlappedDevice`] objects;
//! everything above this trait is platform-independent.

use std::fmt;
use std::path::Path;

use crate::device::{Device, OpenMode};
use crate::error::Result;
use crate::overlapped::OverlappedDevice;

/// Process standard handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StdHandleKind {
    Input,
    Output,
    Error,
}

/// A standard handle as classified by the platform.
///
/// Console handles speak the platform's native 16-bit console encoding; any
/// other handle (pipe, file, redirected stream) transfers raw bytes.
pub enum StdDevice {
    Console(Box<dyn Device<Unit = u16>>),
    Stream(Box<dyn Device<Unit = u8>>),
}

impl StdDevice {
    pub fn is_console(&self) -> bool {
        matches!(self, StdDevice::Console(_))
    }
}

impl fmt::Debug for StdDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StdDevice::Console(_) => f.write_str("StdDevice::Console"),
            StdDevice::Stream(_) => f.write_str("StdDevice::Stream"),
        }
    }
}

/// Platform primitive trait
///
/// # Contract
///
/// - `open` creates (and truncates) the file for output modes without
///   `APPEND`, opens an existing file for `READ`
/// - `open_overlapped` returns a handle whose writes carry explicit offsets
/// - `std_handle` fails when the process has no such handle
///
/// Direction checks (a writer opened with read intent) are the caller's job;
/// platforms open whatever they are asked to.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::{OpenMode, PlatformIo};
///
/// fn touch(platform: &dyn PlatformIo, path: &Path) -> Result<()> {
///     let mut device = platform.open(path, OpenMode::WRITE)?;
///     device.close()
/// }
/// ```
pub trait PlatformIo: Send + Sync {
    /// Open a byte device for synchronous access
    fn open(&self, path: &Path, mode: OpenMode) -> Result<Box<dyn Device<Unit = u8>>>;

    /// Open a file for overlapped writes
    fn open_overlapped(&self, path: &Path, mode: OpenMode) -> Result<Box<dyn OverlappedDevice>>;

    /// Acquire one of the process standard handles
    fn std_handle(&self, kind: StdHandleKind) -> Result<StdDevice>;
}
