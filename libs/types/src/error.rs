//! Runtime Error Taxonomy
//!
//! Every failure the core reports to a caller is a [`RuntimeError`]. Each
//! variant belongs to exactly one [`ErrorCategory`], which decides whether
//! the caller may retry:
//!
//! - **Client**: malformed atom, unknown handler key, oversized payload.
//!   Never retryable, reported verbatim.
//! - **Server**: handler failure, resource exhaustion, timeout, no reactor.
//!   Retryable, optionally after a server-suggested delay.
//! - **Protocol**: version mismatch or truncated/invalid frame.
//!   Connection-level, not retryable without renegotiation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error classification used for retry decisions and wire reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Client,
    Server,
    Protocol,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Client => f.write_str("client"),
            ErrorCategory::Server => f.write_str("server"),
            ErrorCategory::Protocol => f.write_str("protocol"),
        }
    }
}

/// Main runtime error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// Atom failed validation
    #[error("Invalid atom: {reason}")]
    InvalidAtom { reason: String },

    /// No handler bound to the atom's (group, element) key
    #[error("Unsupported packet type {group}:{element}")]
    UnsupportedPacketType { group: String, element: String },

    /// Payload exceeds a configured limit
    #[error("Payload too large: {size} bytes exceeds limit {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Handler key already bound and hot-swap was not requested
    #[error("Duplicate handler for {group}:{element} (use hot_swap to replace)")]
    DuplicateHandler { group: String, element: String },

    /// Handler returned an error or panicked
    #[error("Handler failed for {atom_id}: {message}")]
    HandlerFailed { atom_id: String, message: String },

    /// Deadline exceeded
    #[error("Timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Concurrency bound or pool capacity reached
    #[error("Resource exhausted: {resource}: {message}")]
    ResourceExhausted {
        resource: String,
        message: String,
        retry_after_ms: Option<u64>,
    },

    /// Router found no healthy candidate
    #[error("No available reactor for group {group}: {reason}")]
    NoAvailableReactor { group: String, reason: String },

    /// Network or connection failure between nodes
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Frame could not be decoded
    #[error("Invalid message: {reason}")]
    InvalidMessage { reason: String },

    /// Peer speaks a different protocol version
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    ProtocolVersionMismatch { expected: u8, actual: u8 },
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

impl RuntimeError {
    pub fn invalid_atom(reason: impl Into<String>) -> Self {
        Self::InvalidAtom {
            reason: reason.into(),
        }
    }

    pub fn unsupported(group: impl fmt::Display, element: impl Into<String>) -> Self {
        Self::UnsupportedPacketType {
            group: group.to_string(),
            element: element.into(),
        }
    }

    pub fn duplicate_handler(group: impl fmt::Display, element: impl Into<String>) -> Self {
        Self::DuplicateHandler {
            group: group.to_string(),
            element: element.into(),
        }
    }

    pub fn handler_failed(atom_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerFailed {
            atom_id: atom_id.into(),
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn resource_exhausted(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            resource: resource.into(),
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Resource exhaustion with a server-suggested retry delay
    pub fn resource_exhausted_retry_after(
        resource: impl Into<String>,
        message: impl Into<String>,
        retry_after: Duration,
    ) -> Self {
        Self::ResourceExhausted {
            resource: resource.into(),
            message: message.into(),
            retry_after_ms: Some(retry_after.as_millis() as u64),
        }
    }

    pub fn no_available_reactor(group: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::NoAvailableReactor {
            group: group.to_string(),
            reason: reason.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn invalid_message(reason: impl Into<String>) -> Self {
        Self::InvalidMessage {
            reason: reason.into(),
        }
    }

    /// Category this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidAtom { .. }
            | Self::UnsupportedPacketType { .. }
            | Self::PayloadTooLarge { .. }
            | Self::DuplicateHandler { .. } => ErrorCategory::Client,
            Self::HandlerFailed { .. }
            | Self::Timeout { .. }
            | Self::ResourceExhausted { .. }
            | Self::NoAvailableReactor { .. }
            | Self::Transport { .. } => ErrorCategory::Server,
            Self::InvalidMessage { .. } | Self::ProtocolVersionMismatch { .. } => {
                ErrorCategory::Protocol
            }
        }
    }

    /// Stable machine-readable code, used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAtom { .. } => "invalid_atom",
            Self::UnsupportedPacketType { .. } => "unsupported_packet_type",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::DuplicateHandler { .. } => "duplicate_handler",
            Self::HandlerFailed { .. } => "handler_failed",
            Self::Timeout { .. } => "timeout",
            Self::ResourceExhausted { .. } => "resource_exhausted",
            Self::NoAvailableReactor { .. } => "no_available_reactor",
            Self::Transport { .. } => "transport",
            Self::InvalidMessage { .. } => "invalid_message",
            Self::ProtocolVersionMismatch { .. } => "protocol_version_mismatch",
        }
    }

    /// Only server-side failures may be retried by the caller
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Server
    }

    /// Server-suggested retry delay, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::ResourceExhausted {
                retry_after_ms: Some(ms),
                ..
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }

    /// Rebuild an error from its wire code and message.
    ///
    /// The structured fields of the original variant are not transmitted, so
    /// the message text is carried in the most descriptive field available.
    pub fn from_wire(
        code: &str,
        atom_id: &str,
        message: impl Into<String>,
        retry_after_ms: Option<u64>,
    ) -> Self {
        let message = message.into();
        match code {
            "invalid_atom" => Self::InvalidAtom { reason: message },
            "unsupported_packet_type" => {
                let (group, element) = message
                    .rsplit_once(' ')
                    .and_then(|(_, key)| key.split_once(':'))
                    .map(|(g, e)| (g.to_string(), e.to_string()))
                    .unwrap_or_else(|| (String::new(), message.clone()));
                Self::UnsupportedPacketType { group, element }
            }
            "payload_too_large" => Self::InvalidAtom { reason: message },
            "duplicate_handler" => Self::InvalidAtom { reason: message },
            "timeout" => Self::Timeout {
                operation: message,
                timeout_ms: 0,
            },
            "resource_exhausted" => Self::ResourceExhausted {
                resource: "remote".to_string(),
                message,
                retry_after_ms,
            },
            "no_available_reactor" => Self::NoAvailableReactor {
                group: String::new(),
                reason: message,
            },
            "transport" => Self::Transport { message },
            "invalid_message" => Self::InvalidMessage { reason: message },
            "protocol_version_mismatch" => Self::InvalidMessage { reason: message },
            _ => Self::HandlerFailed {
                atom_id: atom_id.to_string(),
                message,
            },
        }
    }
}
