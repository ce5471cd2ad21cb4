//! Overlapped (Asynchronous) Write Abstractions
//!
//! Overlapped writes are submitted with an explicit file offset and return
//! before the device has finished. Each submission yields a [`PendingWrite`]
//! descriptor that the caller polls until it reports completion.

use std::fmt;
use std::ops::{Deref, Range};
use std::sync::Arc;

use crate::error::Result;

/// Result of polling an operation descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Complete,
    Incomplete,
}

/// Read-only view of a pooled buffer handed to the platform for one submission.
///
/// The platform keeps the region alive until the write finishes and must drop
/// it before reporting completion, so the owning pool regains exclusive access
/// to the storage once every descriptor is complete.
#[derive(Clone)]
pub struct SharedRegion {
    data: Arc<Vec<u8>>,
    range: Range<usize>,
}

impl SharedRegion {
    /// Creates a region over `data[range]`.
    ///
    /// The range is clamped to the storage length.
    pub fn new(data: Arc<Vec<u8>>, range: Range<usize>) -> Self {
        let end = range.end.min(data.len());
        let start = range.start.min(end);
        Self {
            data,
            range: start..end,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.range.clone()]
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

impl Deref for SharedRegion {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRegion")
            .field("range", &self.range)
            .field("storage_len", &self.data.len())
            .finish()
    }
}

/// Operation descriptor for one submitted chunk
pub trait PendingWrite: Send {
    /// Check (or, with `wait`, block until) completion.
    ///
    /// Once `Complete` has been reported, further polls keep returning
    /// `Complete`. A hard failure is returned as an error.
    fn poll(&mut self, wait: bool) -> Result<Completion>;

    /// File offset the chunk was submitted at
    fn offset(&self) -> u64;

    /// Length of the chunk in bytes
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Device opened for overlapped writes
///
/// Overlapped handles have no implicit cursor: every submission names the
/// absolute offset it targets.
pub trait OverlappedDevice: Send {
    /// Submit `region` to be written at `offset`.
    ///
    /// `region.len()` never exceeds [`max_transfer`](Self::max_transfer).
    fn submit_write(&mut self, region: SharedRegion, offset: u64) -> Result<Box<dyn PendingWrite>>;

    /// Largest chunk a single descriptor can express
    fn max_transfer(&self) -> usize {
        u32::MAX as usize
    }

    /// Current size of the underlying file in bytes
    fn size(&self) -> Result<u64>;

    /// Release the native handle
    fn close(&mut self) -> Result<()>;
}
