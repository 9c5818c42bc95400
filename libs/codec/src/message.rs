//! # BinaryMessage - wire envelope
//!
//! Owned representation of one frame. `decode` is strict: every byte of the
//! input must be accounted for, which is what makes
//! `encode(decode(x)) == x` hold for every accepted `x`.

use crate::body::{BatchResultBody, ErrorBody, ResultBody};
use crate::constants::{
    DEFAULT_PRIORITY, DEFAULT_TTL_S, HEADER_SIZE, MAX_CORRELATION_LEN, MAX_PAYLOAD_SIZE,
    PROTOCOL_VERSION,
};
use crate::error::{ProtocolError, ProtocolResult};
use crate::header::MessageHeader;
use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::de::DeserializeOwned;
use serde::Serialize;
use types::{current_timestamp_secs, Atom, ReactorDescriptor};
use zerocopy::byteorder::{U16, U32};
use zerocopy::AsBytes;

/// Frame type carried in header byte 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MessageType {
    Submit = 1,
    Result = 2,
    Error = 3,
    Ping = 4,
    Register = 5,
    BatchSubmit = 6,
}

/// Decoded wire frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMessage {
    pub version: u8,
    pub message_type: MessageType,
    pub sequence: u32,
    /// Seconds since the Unix epoch
    pub timestamp: u32,
    pub source_id: u16,
    pub dest_id: u16,
    pub priority: u8,
    /// Seconds
    pub ttl: u16,
    pub payload: Bytes,
    pub correlation_id: Option<Bytes>,
}

impl BinaryMessage {
    /// New message stamped with the current time and protocol defaults
    pub fn new(message_type: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message_type,
            sequence: 0,
            timestamp: current_timestamp_secs(),
            source_id: 0,
            dest_id: 0,
            priority: DEFAULT_PRIORITY,
            ttl: DEFAULT_TTL_S,
            payload: payload.into(),
            correlation_id: None,
        }
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_route(mut self, source_id: u16, dest_id: u16) -> Self {
        self.source_id = source_id;
        self.dest_id = dest_id;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ttl(mut self, ttl: u16) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<Bytes>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Correlation id as UTF-8, if present and valid
    pub fn correlation_str(&self) -> Option<&str> {
        self.correlation_id
            .as_ref()
            .and_then(|c| std::str::from_utf8(c).ok())
    }

    /// Exact number of bytes `encode` produces
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE
            + self.payload.len()
            + self.correlation_id.as_ref().map_or(0, |c| 2 + c.len())
    }

    pub fn header(&self) -> MessageHeader {
        MessageHeader {
            version: self.version,
            msg_type: self.message_type.into(),
            sequence: U32::new(self.sequence),
            timestamp: U32::new(self.timestamp),
            source_id: U16::new(self.source_id),
            dest_id: U16::new(self.dest_id),
            priority: self.priority,
            ttl: U16::new(self.ttl),
            payload_len: U32::new(self.payload.len() as u32),
        }
    }

    /// Encode to the wire image
    pub fn encode(&self) -> ProtocolResult<Bytes> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                limit: MAX_PAYLOAD_SIZE,
            });
        }
        if let Some(correlation) = &self.correlation_id {
            if correlation.len() > MAX_CORRELATION_LEN {
                return Err(ProtocolError::PayloadTooLarge {
                    size: correlation.len(),
                    limit: MAX_CORRELATION_LEN,
                });
            }
        }

        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(self.header().as_bytes());
        buf.put_slice(&self.payload);
        if let Some(correlation) = &self.correlation_id {
            buf.put_u16_le(correlation.len() as u16);
            buf.put_slice(correlation);
        }
        Ok(buf.freeze())
    }

    /// Decode one complete frame
    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        let header = MessageHeader::view(data)?;

        if !header.is_supported_version() {
            return Err(ProtocolError::ProtocolVersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: header.version,
            });
        }

        let message_type = MessageType::try_from(header.msg_type).map_err(|_| {
            ProtocolError::invalid_message(
                format!("unknown message type {}", header.msg_type),
                data.len(),
            )
        })?;

        let payload_len = header.payload_len.get() as usize;
        let rest = &data[HEADER_SIZE..];
        if payload_len > rest.len() {
            return Err(ProtocolError::invalid_message(
                format!(
                    "declared payload length {} exceeds remaining {} bytes",
                    payload_len,
                    rest.len()
                ),
                data.len(),
            ));
        }
        let (payload, trailer) = rest.split_at(payload_len);

        let correlation_id = match trailer.len() {
            0 => None,
            1 => {
                return Err(ProtocolError::invalid_message(
                    "truncated correlation length",
                    data.len(),
                ))
            }
            _ => {
                let corr_len = u16::from_le_bytes([trailer[0], trailer[1]]) as usize;
                let corr = &trailer[2..];
                if corr.len() != corr_len {
                    return Err(ProtocolError::invalid_message(
                        format!(
                            "correlation length {} does not match {} trailing bytes",
                            corr_len,
                            corr.len()
                        ),
                        data.len(),
                    ));
                }
                Some(Bytes::copy_from_slice(corr))
            }
        };

        Ok(Self {
            version: header.version,
            message_type,
            sequence: header.sequence.get(),
            timestamp: header.timestamp.get(),
            source_id: header.source_id.get(),
            dest_id: header.dest_id.get(),
            priority: header.priority,
            ttl: header.ttl.get(),
            payload: Bytes::copy_from_slice(payload),
            correlation_id,
        })
    }

    /// Parse the JSON payload into a typed body
    pub fn decode_body<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        serde_json::from_slice(&self.payload).map_err(|e| {
            ProtocolError::serialization(format!("{:?} payload", self.message_type), e)
        })
    }

    fn json_payload<T: Serialize>(context: &str, body: &T) -> ProtocolResult<Bytes> {
        serde_json::to_vec(body)
            .map(Bytes::from)
            .map_err(|e| ProtocolError::serialization(context, e))
    }

    /// Submit frame carrying one atom, correlated by atom id
    pub fn submit(atom: &Atom) -> ProtocolResult<Self> {
        let payload = Self::json_payload("submit", atom)?;
        Ok(Self::new(MessageType::Submit, payload)
            .with_priority(atom.priority)
            .with_ttl(atom.timeout_s.min(u16::MAX as u64) as u16)
            .with_correlation(atom.id.clone()))
    }

    pub fn batch_submit(atoms: &[Atom]) -> ProtocolResult<Self> {
        let payload = Self::json_payload("batch_submit", &atoms)?;
        let ttl = atoms.iter().map(|a| a.timeout_s).max().unwrap_or(0);
        Ok(Self::new(MessageType::BatchSubmit, payload)
            .with_ttl(ttl.min(u16::MAX as u64) as u16))
    }

    pub fn ping() -> Self {
        Self::new(MessageType::Ping, Bytes::new())
    }

    pub fn register(descriptor: &ReactorDescriptor) -> ProtocolResult<Self> {
        let payload = Self::json_payload("register", descriptor)?;
        Ok(Self::new(MessageType::Register, payload).with_correlation(descriptor.id.clone()))
    }

    /// Reply skeleton: same sequence and correlation, route reversed
    pub fn reply_to(request: &BinaryMessage, message_type: MessageType, payload: Bytes) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message_type,
            sequence: request.sequence,
            timestamp: current_timestamp_secs(),
            source_id: request.dest_id,
            dest_id: request.source_id,
            priority: request.priority,
            ttl: request.ttl,
            payload,
            correlation_id: request.correlation_id.clone(),
        }
    }

    pub fn result(request: &BinaryMessage, body: &ResultBody) -> ProtocolResult<Self> {
        let payload = Self::json_payload("result", body)?;
        Ok(Self::reply_to(request, MessageType::Result, payload))
    }

    pub fn batch_result(request: &BinaryMessage, body: &BatchResultBody) -> ProtocolResult<Self> {
        let payload = Self::json_payload("batch_result", body)?;
        Ok(Self::reply_to(request, MessageType::Result, payload))
    }

    pub fn error(request: &BinaryMessage, body: &ErrorBody) -> ProtocolResult<Self> {
        let payload = Self::json_payload("error", body)?;
        Ok(Self::reply_to(request, MessageType::Error, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use types::PacketGroup;

    #[test]
    fn test_submit_roundtrip_scenario() {
        let msg = BinaryMessage::new(MessageType::Submit, "hello").with_sequence(12345);
        let bytes = msg.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 5);

        let decoded = BinaryMessage::decode(&bytes).unwrap();
        assert_eq!(decoded.sequence, 12345);
        assert_eq!(decoded.message_type, MessageType::Submit);
        assert_eq!(&decoded.payload[..], b"hello");
        assert_eq!(decoded.correlation_id, None);
    }

    #[test]
    fn test_correlation_section_roundtrips() {
        let msg = BinaryMessage::new(MessageType::Result, "{}")
            .with_route(3, 9)
            .with_correlation("a1");
        let bytes = msg.encode().unwrap();
        assert_eq!(&bytes[bytes.len() - 4..], &[2, 0, b'a', b'1']);

        let decoded = BinaryMessage::decode(&bytes).unwrap();
        assert_eq!(decoded.correlation_str(), Some("a1"));
        assert_eq!(decoded.source_id, 3);
        assert_eq!(decoded.dest_id, 9);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_empty_correlation_is_distinct_from_absent() {
        let msg = BinaryMessage::ping().with_correlation(Bytes::new());
        let decoded = BinaryMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.correlation_id, Some(Bytes::new()));
    }

    #[test]
    fn test_short_buffer_is_invalid() {
        let err = BinaryMessage::decode(&[1u8; 10]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage { .. }));
    }

    #[test]
    fn test_version_mismatch() {
        let mut bytes = BinaryMessage::ping().encode().unwrap().to_vec();
        bytes[0] = 2;
        let err = BinaryMessage::decode(&bytes).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::ProtocolVersionMismatch {
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn test_overlong_payload_length_is_invalid() {
        let mut bytes = BinaryMessage::new(MessageType::Submit, "abc")
            .encode()
            .unwrap()
            .to_vec();
        bytes[17] = 200;
        let err = BinaryMessage::decode(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage { .. }));
    }

    #[test]
    fn test_unknown_type_and_trailing_garbage_are_invalid() {
        let mut bytes = BinaryMessage::ping().encode().unwrap().to_vec();
        bytes[1] = 42;
        assert!(BinaryMessage::decode(&bytes).is_err());

        let mut bytes = BinaryMessage::ping().encode().unwrap().to_vec();
        bytes.push(7);
        assert!(BinaryMessage::decode(&bytes).is_err());

        let mut bytes = BinaryMessage::ping()
            .with_correlation("abc")
            .encode()
            .unwrap()
            .to_vec();
        bytes.pop();
        assert!(BinaryMessage::decode(&bytes).is_err());
    }

    #[test]
    fn test_submit_frame_carries_atom() {
        let atom = Atom::new("a1", PacketGroup::CF, "ping", json!({"echo": "x"}))
            .with_priority(8)
            .with_timeout(12);
        let msg = BinaryMessage::submit(&atom).unwrap();
        assert_eq!(msg.priority, 8);
        assert_eq!(msg.ttl, 12);
        assert_eq!(msg.correlation_str(), Some("a1"));

        let decoded = BinaryMessage::decode(&msg.encode().unwrap()).unwrap();
        let back: Atom = decoded.decode_body().unwrap();
        assert_eq!(back, atom);
    }

    #[test]
    fn test_reply_reverses_route() {
        let request = BinaryMessage::ping().with_route(4, 7).with_sequence(99);
        let reply = BinaryMessage::reply_to(&request, MessageType::Ping, Bytes::new());
        assert_eq!(reply.source_id, 7);
        assert_eq!(reply.dest_id, 4);
        assert_eq!(reply.sequence, 99);
    }
}
