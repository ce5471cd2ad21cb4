//! # Desktop Bridge Implementations
//!
//! Default implementation of the platform I/O primitives for desktop
//! platforms (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `Device<Unit = u8>` using `std::fs::File`
//! - `OverlappedDevice` using positional writes on a Tokio blocking pool
//! - Console devices that speak UTF-16 to the engine and UTF-8 to the terminal
//! - Redirected standard handles as plain byte devices
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::DesktopPlatform;
//! use bridge_traits::{OpenMode, PlatformIo};
//!
//! let platform = DesktopPlatform::new()?;
//! let mut file = platform.open("out.txt".as_ref(), OpenMode::WRITE)?;
//! file.write(b"hello")?;
//! file.close()?;
//! ```

mod console;
mod file;
mod overlapped;
mod platform;

pub use console::{ConsoleIn, ConsoleOut, StdStreamDevice};
pub use file::FileDevice;
pub use overlapped::OverlappedFile;
pub use platform::{DesktopPlatform, DEFAULT_IO_THREADS};
