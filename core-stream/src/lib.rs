//! # Buffered Stream Engine
//!
//! Buffered file and console streams on top of the platform primitives in
//! `bridge-traits`.
//!
//! ## Overview
//!
//! This crate provides:
//! - A synchronous buffered writer and reader over any [`Device`]
//! - An asynchronous writer that overlaps device writes with buffer filling,
//!   backed by a [`BufferPool`]
//! - A console adapter converting UTF-8 text to and from a UTF-16 console
//! - Standard stream setup and teardown ([`StdStreams`])
//! - [`IoContext`], a factory applying an [`IoConfig`](core_runtime::IoConfig)
//!
//! ## Concurrency
//!
//! Streams are driven by one thread of control and do no internal locking.
//! "Asynchronous" means device writes proceed while the caller keeps filling
//! buffers; only `flush` and `close` wait for them.

pub mod async_writer;
pub mod buffer;
pub mod console;
pub mod context;
pub mod error;
pub mod pool;
pub mod reader;
pub mod std_streams;
pub mod stream;
pub mod writer;

#[cfg(test)]
mod testing;

pub use async_writer::AsyncFileWriter;
pub use buffer::BufferMode;
pub use console::{ConsoleReader, ConsoleWriter};
pub use context::IoContext;
pub use error::{Result, StreamError};
pub use pool::{BufferId, BufferPool};
pub use reader::{BufferedReader, FileReader};
pub use std_streams::{StdReader, StdStreams, StdWriter};
pub use stream::{InputStream, OutputStream};
pub use writer::{BufferedWriter, FileWriter};

pub use bridge_traits::{Device, OpenMode, SeekOrigin, StdHandleKind};

#[cfg(feature = "memory")]
pub use bridge_traits::memory;
