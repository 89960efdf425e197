//! Error types for rwsplit
//!
//! Provides a unified error type for all operations.

use bytes::Bytes;
use thiserror::Error;

/// Result type alias using ProxyError
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Unified error type for rwsplit operations
#[derive(Debug, Error)]
pub enum ProxyError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Malformed integer: {0:?}")]
    MalformedInteger(String),

    /// A `-` reply, surfaced as a result by callers that do not relay it
    #[error("Upstream error: {}", String::from_utf8_lossy(.0))]
    Upstream(Bytes),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Connection closed")]
    Closed,
}

impl ProxyError {
    /// True when the error means the peer simply went away
    ///
    /// EOF, reset, aborted and broken pipe all land here. Sessions log
    /// these at debug rather than warn.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProxyError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
            ),
            ProxyError::Closed => true,
            _ => false,
        }
    }

    pub(crate) fn framing(msg: impl Into<String>) -> Self {
        ProxyError::Framing(msg.into())
    }
}
