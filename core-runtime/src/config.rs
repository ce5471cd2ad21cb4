//! # I/O Configuration Module
//!
//! Provides configuration management for the stream engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct an [`IoConfig`]
//! that holds the platform primitives and the buffer sizes every stream
//! created from it will use. It enforces fail-fast validation so that a
//! misconfigured host learns about it at startup rather than on first write.
//!
//! ## Dependencies
//!
//! - `PlatformIo` - Required. When the `desktop-shims` feature is enabled the
//!   desktop platform is injected automatically if none was provided.
//!
//! ## Usage
//!
//! ### Desktop Defaults
//!
//! ```ignore
//! use core_runtime::config::IoConfig;
//!
//! let config = IoConfig::builder()
//!     .buffer_capacity(16 * 1024)
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ### Custom Platform
//!
//! ```ignore
//! use bridge_traits::memory::MemoryPlatform;
//! use core_runtime::config::IoConfig;
//! use std::sync::Arc;
//!
//! let config = IoConfig::builder()
//!     .platform(Arc::new(MemoryPlatform::new()))
//!     .async_buffer_capacity(4096)
//!     .build()?;
//! ```
//!
//! ### Loading Buffer Sizes From Settings
//!
//! [`BufferSettings`] is serde-serializable; missing fields fall back to the
//! defaults.
//!
//! ```ignore
//! let settings: BufferSettings = serde_json::from_str(r#"{ "buffer_capacity": 65536 }"#)?;
//! let config = IoConfig::builder().buffer_settings(settings).build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::PlatformIo;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default capacity of file stream buffers, in bytes
pub const DEFAULT_BUFFER_CAPACITY: usize = 8192;

/// Default capacity of console buffers, in 16-bit units
pub const DEFAULT_CONSOLE_BUFFER_UNITS: usize = 4096;

/// Largest buffer a stream may be configured with (1 GiB)
pub const MAX_BUFFER_CAPACITY: usize = 1 << 30;

/// Buffer sizes applied to streams created from an [`IoConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSettings {
    /// Synchronous writer buffer, in bytes
    pub buffer_capacity: usize,

    /// Default capacity of buffers acquired by asynchronous writers, in bytes
    pub async_buffer_capacity: usize,

    /// Console writer and reader buffer, in 16-bit units
    pub console_buffer_units: usize,

    /// Synchronous reader buffer, in bytes
    pub reader_capacity: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            async_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            console_buffer_units: DEFAULT_CONSOLE_BUFFER_UNITS,
            reader_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl BufferSettings {
    /// Validates every size is non-zero and at most [`MAX_BUFFER_CAPACITY`].
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("buffer_capacity", self.buffer_capacity),
            ("async_buffer_capacity", self.async_buffer_capacity),
            ("console_buffer_units", self.console_buffer_units),
            ("reader_capacity", self.reader_capacity),
        ];

        for (name, size) in sizes {
            if size == 0 {
                return Err(Error::Config(format!("{} must be greater than 0", name)));
            }
            if size > MAX_BUFFER_CAPACITY {
                return Err(Error::Config(format!(
                    "{} of {} exceeds maximum of 1 GiB ({} bytes)",
                    name, size, MAX_BUFFER_CAPACITY
                )));
            }
        }

        Ok(())
    }
}

/// Stream engine configuration.
///
/// Use [`IoConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct IoConfig {
    /// Platform primitives every stream is opened through
    pub platform: Arc<dyn PlatformIo>,

    /// Buffer sizes
    pub buffers: BufferSettings,
}

impl std::fmt::Debug for IoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoConfig")
            .field("platform", &"PlatformIo { ... }")
            .field("buffers", &self.buffers)
            .finish()
    }
}

impl IoConfig {
    /// Creates a new builder for constructing an `IoConfig`.
    pub fn builder() -> IoConfigBuilder {
        IoConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        self.buffers.validate()
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn platform_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "PlatformIo".to_string(),
        message: "A PlatformIo implementation is required to open files and standard handles. \
                 Desktop: enable the 'desktop-shims' feature to use the default DesktopPlatform. \
                 Tests: inject bridge_traits::memory::MemoryPlatform."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_platform(io_threads: Option<usize>) -> Result<Arc<dyn PlatformIo>> {
    use bridge_desktop::{DesktopPlatform, DEFAULT_IO_THREADS};

    let platform = DesktopPlatform::with_io_threads(io_threads.unwrap_or(DEFAULT_IO_THREADS))?;
    let platform: Arc<dyn PlatformIo> = Arc::new(platform);
    Ok(platform)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_platform(_io_threads: Option<usize>) -> Result<Arc<dyn PlatformIo>> {
    Err(platform_missing_error())
}

/// Builder for constructing [`IoConfig`] instances.
#[derive(Default)]
pub struct IoConfigBuilder {
    platform: Option<Arc<dyn PlatformIo>>,
    buffers: BufferSettings,
    io_threads: Option<usize>,
}

impl IoConfigBuilder {
    /// Sets the platform implementation.
    ///
    /// If not provided, the desktop platform is used when the
    /// `desktop-shims` feature is enabled.
    pub fn platform(mut self, platform: Arc<dyn PlatformIo>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Sets the synchronous writer buffer capacity in bytes.
    ///
    /// Default: 8192
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffers.buffer_capacity = capacity;
        self
    }

    /// Sets the default capacity of asynchronous writer buffers in bytes.
    ///
    /// Default: 8192
    pub fn async_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffers.async_buffer_capacity = capacity;
        self
    }

    /// Sets the console buffer capacity in 16-bit units.
    ///
    /// Default: 4096
    pub fn console_buffer_units(mut self, units: usize) -> Self {
        self.buffers.console_buffer_units = units;
        self
    }

    /// Sets the synchronous reader buffer capacity in bytes.
    ///
    /// Default: 8192
    pub fn reader_capacity(mut self, capacity: usize) -> Self {
        self.buffers.reader_capacity = capacity;
        self
    }

    /// Replaces every buffer size at once.
    pub fn buffer_settings(mut self, settings: BufferSettings) -> Self {
        self.buffers = settings;
        self
    }

    /// Sets how many blocking threads the default desktop platform may use
    /// for overlapped writes. Ignored when a platform is injected.
    pub fn io_threads(mut self, threads: usize) -> Self {
        self.io_threads = Some(threads);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when a buffer size is zero or above 1 GiB
    /// - [`Error::CapabilityMissing`] when no platform was provided and no
    ///   default is available
    /// - [`Error::Platform`] when the default platform fails to start
    pub fn build(self) -> Result<IoConfig> {
        self.buffers.validate()?;

        if self.io_threads == Some(0) {
            return Err(Error::Config("io_threads must be greater than 0".to_string()));
        }

        let platform = match self.platform {
            Some(platform) => platform,
            None => provide_default_platform(self.io_threads)?,
        };

        let config = IoConfig {
            platform,
            buffers: self.buffers,
        };
        config.validate()?;
        Ok(config)
    }
}
