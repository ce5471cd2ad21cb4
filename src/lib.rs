//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-stream`, `core-runtime`). Host applications can
//! depend on `fstream-workspace` and enable the documented features without
//! needing to wire each crate individually.

#[cfg(any(feature = "desktop-shims", feature = "memory-platform"))]
pub use core_stream as stream;

#[cfg(feature = "desktop-shims")]
pub use core_runtime as runtime;
