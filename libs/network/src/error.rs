//! Transport Error Types
//!
//! Socket and framing failures. They cross crate boundaries as
//! [`RuntimeError`]: I/O problems are server-side and retryable, bad frames
//! are protocol errors.

use codec::ProtocolError;
use std::io;
use thiserror::Error;
use types::RuntimeError;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Socket-level failure
    #[error("Connection error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Peer closed the connection before a complete frame arrived
    #[error("Connection closed by peer: {endpoint}")]
    Closed { endpoint: String },

    /// Length prefix above the configured maximum
    #[error("Frame too large: {size} bytes exceeds limit {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    /// Frame arrived but did not decode
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl TransportError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn closed(endpoint: impl Into<String>) -> Self {
        Self::Closed {
            endpoint: endpoint.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }
}

impl From<TransportError> for RuntimeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Protocol(protocol) => protocol.into(),
            TransportError::FrameTooLarge { size, limit } => RuntimeError::invalid_message(
                format!("frame of {} bytes exceeds limit {}", size, limit),
            ),
            TransportError::Timeout {
                operation,
                timeout_ms,
            } => RuntimeError::Timeout {
                operation,
                timeout_ms,
            },
            other => RuntimeError::transport(other.to_string()),
        }
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;
