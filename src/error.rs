//! Error types for clearpath-core

use std::io;
use thiserror::Error;

/// Result type alias using StreamError
pub type Result<T> = std::result::Result<T, StreamError>;

/// Streaming pipeline error types
///
/// All errors in the capture-and-streaming core. None of these is fatal to
/// the process: capture-level errors are swallowed at the scheduler
/// boundary and steady-state connection errors surface as channel state
/// changes rather than propagated failures.
#[derive(Debug, Error)]
pub enum StreamError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Camera enumeration failed (platform denied access, no camera stack)
    #[error("Device enumeration error: {0}")]
    DeviceEnumeration(String),

    /// Opening a camera device failed
    #[error("Device open error: {0}")]
    DeviceOpen(String),

    /// A single capture attempt failed (stale handle, hardware error)
    #[error("Capture error: {0}")]
    Capture(String),

    /// Frame encoding failed
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Connecting to the inference backend failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// The channel has been disposed and cannot be used again
    #[error("Channel is closed")]
    ChannelClosed,
}

impl StreamError {
    /// Create a DeviceEnumeration error
    pub fn enumeration(msg: impl Into<String>) -> Self {
        Self::DeviceEnumeration(msg.into())
    }

    /// Create a DeviceOpen error
    pub fn device_open(msg: impl Into<String>) -> Self {
        Self::DeviceOpen(msg.into())
    }

    /// Create a Capture error
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    /// Create an Encoding error
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Create a Connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = StreamError::connection("refused");
        assert!(matches!(err, StreamError::Connection(_)));
    }

    #[test]
    fn test_error_display() {
        let err = StreamError::capture("handle released");
        assert_eq!(err.to_string(), "Capture error: handle released");
    }
}
