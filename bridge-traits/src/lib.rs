//! # Host Bridge Traits
//!
//! Platform I/O primitives that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the stream engine and the
//! platform-specific code that actually touches native handles. The engine
//! (`core-stream`) only ever speaks to the traits below; it never calls an
//! operating system API directly.
//!
//! ## Traits
//!
//! ### Devices
//! - [`Device`](device::Device) - Blocking write/read/seek/close over a native handle,
//!   generic over its transfer [`Unit`](device::Unit) (bytes for files, 16-bit units for consoles)
//! - [`OverlappedDevice`](overlapped::OverlappedDevice) - Offset-addressed writes that
//!   complete asynchronously
//! - [`PendingWrite`](overlapped::PendingWrite) - Completion descriptor for one submitted chunk
//!
//! ### Platform Integration
//! - [`PlatformIo`](platform::PlatformIo) - Opens devices and classifies standard handles
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | In-memory | `bridge-traits` (`memory` feature) | ✅ Available |
//!
//! ## Error Handling
//!
//! All primitives report failures through [`BridgeError`](error::BridgeError).
//! Native failures travel as [`std::io::Error`] so the platform's raw error
//! code stays observable through [`BridgeError::os_code`].
//!
//! ## Buffer Ownership
//!
//! Overlapped submissions hand the platform a [`SharedRegion`](overlapped::SharedRegion),
//! a reference-counted view into pooled storage. Platforms drop the region
//! before reporting completion; the pool relies on that to regain write access.
//!
//! ## Examples
//!
//! ### Implementing Device
//!
//! ```ignore
//! use bridge_traits::{Device, SeekOrigin};
//! use bridge_traits::error::Result;
//!
//! struct Sink(Vec<u8>);
//!
//! impl Device for Sink {
//!     type Unit = u8;
//!
//!     fn write(&mut self, data: &[u8]) -> Result<()> {
//!         self.0.extend_from_slice(data);
//!         Ok(())
//!     }
//!
//!     fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
//!         Ok(0)
//!     }
//!
//!     fn seek(&mut self, _offset: i64, _origin: SeekOrigin) -> Result<u64> {
//!         Ok(self.0.len() as u64)
//!     }
//!
//!     fn close(&mut self) -> Result<()> {
//!         Ok(())
//!     }
//! }
//! ```

pub mod device;
pub mod error;
pub mod log;
pub mod overlapped;
pub mod platform;

#[cfg(any(test, feature = "memory"))]
pub mod memory;

pub use error::BridgeError;

// Re-export commonly used types
pub use device::{Device, OpenMode, SeekOrigin, Unit};
pub use log::LogLevel;
pub use overlapped::{Completion, OverlappedDevice, PendingWrite, SharedRegion};
pub use platform::{PlatformIo, StdDevice, StdHandleKind};
