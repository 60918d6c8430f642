//! Error types for wsbridge-client.

use thiserror::Error;

/// Main error type for all wsbridge operations.
#[derive(Debug, Error)]
pub enum WsBridgeError {
    /// Transport failure: refused connection, read/write error, timeout.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The HTTP upgrade exchange was rejected or malformed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Wire-level violation (corrupt header, unsupported opcode,
    /// inconsistent declared length).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization of an outbound message failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The connection is gone; the frame was never written.
    #[error("connection closed")]
    ConnectionClosed,
}

impl WsBridgeError {
    /// Transport error for an elapsed bounded wait.
    pub(crate) fn timed_out(what: &str) -> Self {
        WsBridgeError::Transport(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            what.to_string(),
        ))
    }
}

/// Result type alias using WsBridgeError.
pub type Result<T> = std::result::Result<T, WsBridgeError>;
