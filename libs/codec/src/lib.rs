//! # Nucleus Wire Codec
//!
//! ## Purpose
//!
//! Bit-exact encoding and decoding of the binary envelope that carries atoms
//! and control messages between clients and reactors, and between reactors.
//!
//! ## Frame Layout
//!
//! ```text
//! ┌──────────────────────────┬──────────────────────┬─────────────────────────────┐
//! │ MessageHeader (21 bytes) │ payload (payload_len)│ [corr_len u16 | corr bytes] │
//! └──────────────────────────┴──────────────────────┴─────────────────────────────┘
//! ```
//!
//! All multi-byte header fields are little-endian. The correlation section is
//! optional; its absence is signalled by the buffer ending right after the
//! payload.
//!
//! ## What This Crate Contains
//! - [`MessageHeader`]: zerocopy view over the fixed header
//! - [`BinaryMessage`]: owned envelope with `encode`/`decode`
//! - [`MessageType`]: submit, result, error, ping, register, batch_submit
//! - Payload bodies (`ResultBody`, `ErrorBody`, ...) carried as JSON
//! - [`ProtocolError`]: decode/encode failures
//!
//! ## What This Crate Does NOT Contain
//! - Socket management or stream framing (belongs in `network`)
//! - Handler execution (belongs in `reactor`)
//!
//! ## Round-trip Law
//!
//! ```rust
//! use codec::{BinaryMessage, MessageType};
//!
//! let msg = BinaryMessage::new(MessageType::Submit, "hello").with_sequence(12345);
//! let bytes = msg.encode().unwrap();
//! let decoded = BinaryMessage::decode(&bytes).unwrap();
//! assert_eq!(decoded, msg);
//! assert_eq!(decoded.encode().unwrap(), bytes);
//! ```

pub mod body;
pub mod constants;
pub mod error;
pub mod header;
pub mod message;

pub use body::{BatchItem, BatchResultBody, ErrorBody, ResultBody};
pub use constants::{
    DEFAULT_TTL_S, HEADER_SIZE, MAX_CORRELATION_LEN, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION,
};
pub use error::{ProtocolError, ProtocolResult};
pub use header::MessageHeader;
pub use message::{BinaryMessage, MessageType};
