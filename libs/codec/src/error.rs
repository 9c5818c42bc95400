//! Protocol-level errors for binary message processing
//!
//! Each variant carries enough context to diagnose a bad frame from logs
//! alone: what was expected, what was found, and where.

use thiserror::Error;
use types::RuntimeError;

/// Encoding/decoding errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// Buffer is too short, truncated, or structurally inconsistent
    #[error("Invalid message: {reason} (buffer: {buffer_size} bytes)")]
    InvalidMessage { reason: String, buffer_size: usize },

    /// Header version differs from [`crate::PROTOCOL_VERSION`]
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    ProtocolVersionMismatch { expected: u8, actual: u8 },

    /// Payload exceeds protocol limits
    #[error("Payload too large: {size} bytes exceeds limit {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    /// JSON body could not be produced or parsed
    #[error("Body serialization failed for {context}: {message}")]
    Serialization { context: String, message: String },
}

impl ProtocolError {
    pub fn invalid_message(reason: impl Into<String>, buffer_size: usize) -> Self {
        Self::InvalidMessage {
            reason: reason.into(),
            buffer_size,
        }
    }

    pub fn serialization(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Serialization {
            context: context.into(),
            message: err.to_string(),
        }
    }
}

impl From<ProtocolError> for RuntimeError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidMessage { .. } | ProtocolError::Serialization { .. } => {
                RuntimeError::invalid_message(err.to_string())
            }
            ProtocolError::ProtocolVersionMismatch { expected, actual } => {
                RuntimeError::ProtocolVersionMismatch { expected, actual }
            }
            ProtocolError::PayloadTooLarge { size, limit } => {
                RuntimeError::PayloadTooLarge { size, limit }
            }
        }
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
