//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the stream engine:
//! - Logging and tracing infrastructure
//! - Configuration management (platform injection and buffer sizes)
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the stream engine depends on.
//! It establishes the logging conventions and the fail-fast configuration
//! layer that decides which platform primitives streams are opened through.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{BufferSettings, IoConfig, IoConfigBuilder};
pub use error::{Error, Result};
