//! Protocol constants
//!
//! These values define the wire format and must stay stable across every
//! node speaking the protocol.

/// Only version this runtime accepts
pub const PROTOCOL_VERSION: u8 = 1;

/// `version(1) | type(1) | sequence(4) | timestamp(4) | source_id(2) |
/// dest_id(2) | priority(1) | ttl(2) | payload_len(4)`
pub const HEADER_SIZE: usize = 21;

/// Largest payload `encode` accepts (16 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Correlation length is a u16 on the wire
pub const MAX_CORRELATION_LEN: usize = u16::MAX as usize;

/// Default time-to-live stamped on new messages, in seconds
pub const DEFAULT_TTL_S: u16 = 30;

/// Default priority stamped on new messages
pub const DEFAULT_PRIORITY: u8 = types::DEFAULT_PRIORITY;
