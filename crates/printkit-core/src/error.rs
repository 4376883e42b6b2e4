//! Error handling for PrintKit
//!
//! One error type crosses the public API: `DeviceError`. It groups all
//! connection, read, and write failures regardless of the underlying
//! transport, carrying the originating I/O error as its source when one
//! exists.

use thiserror::Error;

/// Raised on any connection error.
///
/// One error groups all connection failures regardless of the underlying
/// transport or error type. The `cause` field holds the originating error
/// when the failure wraps a lower-level one (serial, socket, resolver).
#[derive(Error, Debug)]
#[error("{message}")]
pub struct DeviceError {
    /// Human-readable description of the failure.
    pub message: String,

    /// Underlying error, if any.
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DeviceError {
    /// Create an error from a message alone.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Create an error wrapping an underlying cause.
    pub fn with_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }
}

/// Result type using `DeviceError`.
pub type Result<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_only() {
        let e = DeviceError::new("no port specified");
        assert_eq!(e.to_string(), "no port specified");
        assert!(e.cause.is_none());
    }

    #[test]
    fn wraps_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e = DeviceError::with_cause("could not open '/dev/ttyUSB0'", io);
        assert_eq!(e.to_string(), "could not open '/dev/ttyUSB0'");
        let source = std::error::Error::source(&e).expect("source present");
        assert_eq!(source.to_string(), "gone");
    }
}
