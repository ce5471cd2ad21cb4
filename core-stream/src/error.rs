use std::io;

use bridge_traits::{BridgeError, OpenMode};
use thiserror::Error;

/// Stream engine errors.
///
/// Variants fall into three groups: misuse of the API, failures reported by
/// the platform device, and resource exhaustion. None of them is retried.
#[derive(Error, Debug)]
pub enum StreamError {
    // ============================================================================
    // Misuse
    // ============================================================================
    #[error("Stream is not open")]
    NotOpen,

    #[error("Open mode {mode:?} is not valid for {stream}")]
    InvalidMode { mode: OpenMode, stream: &'static str },

    #[error("Misuse: {0}")]
    Misuse(String),

    // ============================================================================
    // Device
    // ============================================================================
    #[error("Device {operation} failed: {source}")]
    Device {
        operation: &'static str,
        #[source]
        source: BridgeError,
    },

    // ============================================================================
    // Resources
    // ============================================================================
    #[error("Out of memory allocating {requested} bytes")]
    OutOfMemory { requested: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StreamError {
    /// Adapter for `map_err` that tags a platform failure with the operation.
    pub(crate) fn device(operation: &'static str) -> impl FnOnce(BridgeError) -> StreamError {
        move |source| StreamError::Device { operation, source }
    }

    /// True for errors caused by calling the API incorrectly
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            StreamError::NotOpen | StreamError::InvalidMode { .. } | StreamError::Misuse(_)
        )
    }

    /// True for failures reported by the platform device
    pub fn is_device_error(&self) -> bool {
        matches!(self, StreamError::Device { .. })
    }

    /// Native error code of a device failure, if the platform supplied one
    pub fn os_code(&self) -> Option<i32> {
        match self {
            StreamError::Device { source, .. } => source.os_code(),
            _ => None,
        }
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        let kind = match &err {
            StreamError::NotOpen | StreamError::InvalidMode { .. } | StreamError::Misuse(_) => {
                io::ErrorKind::InvalidInput
            }
            StreamError::Device {
                source: BridgeError::Io(inner),
                ..
            } => inner.kind(),
            StreamError::OutOfMemory { .. } => io::ErrorKind::OutOfMemory,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(StreamError::NotOpen.is_misuse());
        assert!(StreamError::Misuse("x".into()).is_misuse());
        assert!(!StreamError::OutOfMemory { requested: 8 }.is_misuse());

        let err = StreamError::device("write")(BridgeError::Io(io::Error::from_raw_os_error(28)));
        assert!(err.is_device_error());
        assert_eq!(err.os_code(), Some(28));
        assert!(err.to_string().contains("write"));
    }

    #[test]
    fn test_io_conversion_keeps_kind() {
        let err = StreamError::device("read")(BridgeError::Io(io::Error::from(
            io::ErrorKind::UnexpectedEof,
        )));
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);

        let io_err: io::Error = StreamError::NotOpen.into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidInput);
    }
}
