//! Device Capability Abstractions
//!
//! A [`Device`] is an opened native handle reduced to the small capability set
//! the stream engine needs: write, read, seek and close. Devices are generic
//! over their transfer [`Unit`] so the same buffering code drives byte-oriented
//! files and 16-bit console APIs.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Smallest element a device transfers in one step.
pub trait Unit: Copy + Default + Eq + fmt::Debug + Send + Sync + 'static {
    /// Width of one unit in bytes
    const WIDTH: usize;
}

impl Unit for u8 {
    const WIDTH: usize = 1;
}

impl Unit for u16 {
    const WIDTH: usize = 2;
}

/// Origin used when repositioning a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekOrigin {
    Start,
    Current,
    End,
}

/// Access intent requested when opening a stream.
///
/// Modes combine with `|`:
///
/// ```
/// use bridge_traits::device::OpenMode;
///
/// let mode = OpenMode::WRITE | OpenMode::APPEND;
/// assert!(mode.contains(OpenMode::WRITE));
/// assert!(!mode.contains(OpenMode::READ));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct OpenMode {
    bits: u8,
}

impl OpenMode {
    pub const READ: OpenMode = OpenMode { bits: 0b001 };
    pub const WRITE: OpenMode = OpenMode { bits: 0b010 };
    /// Position every write at the current end of the file
    pub const APPEND: OpenMode = OpenMode { bits: 0b100 };

    /// Mode with no intent bits set
    pub const fn empty() -> Self {
        OpenMode { bits: 0 }
    }

    pub const fn contains(self, other: OpenMode) -> bool {
        self.bits & other.bits == other.bits
    }

    pub const fn intersects(self, other: OpenMode) -> bool {
        self.bits & other.bits != 0
    }

    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// True when the mode asks for any kind of output.
    pub const fn is_output(self) -> bool {
        self.intersects(OpenMode { bits: 0b110 })
    }
}

impl BitOr for OpenMode {
    type Output = OpenMode;

    fn bitor(self, rhs: OpenMode) -> OpenMode {
        OpenMode {
            bits: self.bits | rhs.bits,
        }
    }
}

impl fmt::Debug for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(OpenMode::READ) {
            names.push("READ");
        }
        if self.contains(OpenMode::WRITE) {
            names.push("WRITE");
        }
        if self.contains(OpenMode::APPEND) {
            names.push("APPEND");
        }
        if names.is_empty() {
            write!(f, "OpenMode(empty)")
        } else {
            write!(f, "OpenMode({})", names.join(" | "))
        }
    }
}

/// Synchronous device capability trait
///
/// Implementations wrap one opened native handle. The contract mirrors the
/// blocking platform primitives:
///
/// - `write` transfers the full slice or fails; partial writes are never
///   reported as success
/// - `read` may return fewer units than requested; `Ok(0)` signals end of data
/// - failures carry the platform's native error through [`BridgeError`](crate::BridgeError)
///
/// # Example
///
/// ```ignore
/// use bridge_traits::device::{Device, SeekOrigin};
///
/// fn rewind(device: &mut dyn Device<Unit = u8>) -> Result<()> {
///     device.seek(0, SeekOrigin::Start)?;
///     Ok(())
/// }
/// ```
pub trait Device: Send {
    type Unit: Unit;

    /// Write every unit of `data` or fail
    fn write(&mut self, data: &[Self::Unit]) -> Result<()>;

    /// Read up to `buf.len()` units, returning how many were read
    fn read(&mut self, buf: &mut [Self::Unit]) -> Result<usize>;

    /// Reposition the device, returning the new absolute position
    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64>;

    /// Release the native handle
    fn close(&mut self) -> Result<()>;
}

impl<D: Device + ?Sized> Device for Box<D> {
    type Unit = D::Unit;

    fn write(&mut self, data: &[Self::Unit]) -> Result<()> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [Self::Unit]) -> Result<usize> {
        (**self).read(buf)
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64> {
        (**self).seek(offset, origin)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_mode_combination() {
        let mode = OpenMode::WRITE | OpenMode::APPEND;
        assert!(mode.contains(OpenMode::WRITE));
        assert!(mode.contains(OpenMode::APPEND));
        assert!(!mode.contains(OpenMode::READ));
        assert!(mode.is_output());
        assert!(!OpenMode::READ.is_output());
        assert!(OpenMode::empty().is_empty());
    }

    #[test]
    fn test_open_mode_debug() {
        assert_eq!(
            format!("{:?}", OpenMode::READ | OpenMode::WRITE),
            "OpenMode(READ | WRITE)"
        );
        assert_eq!(format!("{:?}", OpenMode::empty()), "OpenMode(empty)");
    }

    #[test]
    fn test_unit_widths() {
        assert_eq!(<u8 as Unit>::WIDTH, 1);
        assert_eq!(<u16 as Unit>::WIDTH, 2);
    }

    #[test]
    fn test_seek_origin_serde() {
        let json = serde_json::to_string(&SeekOrigin::Current).unwrap();
        assert_eq!(json, "\"current\"");
    }
}
