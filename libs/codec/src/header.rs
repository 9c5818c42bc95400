//! Message Header Implementation
//!
//! The header is identical for every message type and carries routing and
//! framing information.

use crate::constants::{HEADER_SIZE, PROTOCOL_VERSION};
use crate::error::{ProtocolError, ProtocolResult};
use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Ref, Unaligned};

/// Message Header (21 bytes)
///
/// Every field is byte-aligned so the struct has no padding and its memory
/// image is exactly the wire image. DO NOT REORDER: the field order is the
/// wire order.
///
/// ```text
/// offset  0: version      u8
/// offset  1: msg_type     u8
/// offset  2: sequence     u32 LE
/// offset  6: timestamp    u32 LE (seconds since epoch)
/// offset 10: source_id    u16 LE
/// offset 12: dest_id      u16 LE
/// offset 14: priority     u8
/// offset 15: ttl          u16 LE (seconds)
/// offset 17: payload_len  u32 LE
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes, Unaligned)]
pub struct MessageHeader {
    pub version: u8,
    pub msg_type: u8,
    pub sequence: U32<LittleEndian>,
    pub timestamp: U32<LittleEndian>,
    pub source_id: U16<LittleEndian>,
    pub dest_id: U16<LittleEndian>,
    pub priority: u8,
    pub ttl: U16<LittleEndian>,
    pub payload_len: U32<LittleEndian>,
}
// Total: EXACTLY 21 bytes with zero padding

impl MessageHeader {
    pub const SIZE: usize = HEADER_SIZE;

    /// Zero-copy view over the first [`HEADER_SIZE`] bytes of `data`.
    ///
    /// Only checks that enough bytes exist; version and type validation is
    /// done by [`crate::BinaryMessage::decode`].
    pub fn view(data: &[u8]) -> ProtocolResult<&MessageHeader> {
        let (header, _rest) = Ref::<_, MessageHeader>::new_unaligned_from_prefix(data)
            .ok_or_else(|| {
                ProtocolError::invalid_message(
                    format!("need {} header bytes, got {}", HEADER_SIZE, data.len()),
                    data.len(),
                )
            })?;
        Ok(header.into_ref())
    }

    pub fn is_supported_version(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(std::mem::size_of::<MessageHeader>(), MessageHeader::SIZE);
        assert_eq!(MessageHeader::SIZE, 21);
    }

    #[test]
    fn test_header_fields_are_little_endian() {
        let header = MessageHeader {
            version: 1,
            msg_type: 4,
            sequence: U32::new(0x0403_0201),
            timestamp: U32::new(0),
            source_id: U16::new(0x0201),
            dest_id: U16::new(0),
            priority: 5,
            ttl: U16::new(30),
            payload_len: U32::new(0),
        };
        let bytes = header.as_bytes();
        assert_eq!(&bytes[2..6], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[10..12], &[0x01, 0x02]);
        assert_eq!(bytes[14], 5);
        assert_eq!(&bytes[15..17], &[30, 0]);
    }

    #[test]
    fn test_view_rejects_short_buffers() {
        assert!(MessageHeader::view(&[0u8; 20]).is_err());
        let header = MessageHeader::view(&[0u8; 32]).unwrap();
        assert!(!header.is_supported_version());
    }
}
