//! Buffer configuration shared by every stream type

use bridge_traits::Unit;

use crate::error::{Result, StreamError};

/// Buffering requested through `setbuf`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferMode<U> {
    /// Every call goes straight to the device
    Unbuffered,
    /// Allocate a buffer holding this many units
    Capacity(usize),
    /// Use the caller's storage; its length is the capacity
    Provided(Vec<U>),
}

/// Allocate `units` default-initialized units, reporting exhaustion instead of aborting.
pub(crate) fn allocate<U: Unit>(units: usize) -> Result<Vec<U>> {
    let mut storage = Vec::new();
    storage
        .try_reserve_exact(units)
        .map_err(|_| StreamError::OutOfMemory {
            requested: units.saturating_mul(U::WIDTH),
        })?;
    storage.resize(units, U::default());
    Ok(storage)
}

/// Turn a requested mode into backing storage; `None` means unbuffered.
pub(crate) fn storage_for<U: Unit>(mode: BufferMode<U>) -> Result<Option<Vec<U>>> {
    match mode {
        BufferMode::Unbuffered => Ok(None),
        BufferMode::Capacity(0) => Err(StreamError::Misuse(
            "buffer capacity must be greater than 0".to_string(),
        )),
        BufferMode::Capacity(units) => allocate(units).map(Some),
        BufferMode::Provided(storage) if storage.is_empty() => Err(StreamError::Misuse(
            "provided buffer must not be empty".to_string(),
        )),
        BufferMode::Provided(storage) => Ok(Some(storage)),
    }
}
