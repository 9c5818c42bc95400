//! Stream framing
//!
//! ```text
//! ┌────────────────┬──────────────────────────────┐
//! │ frame_len u32LE│ encoded BinaryMessage        │
//! └────────────────┴──────────────────────────────┘
//! ```
//!
//! The length is checked against the limit before the body is allocated.

use crate::error::{TransportError, TransportResult};
use bytes::Bytes;
use codec::BinaryMessage;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const FRAME_PREFIX_SIZE: usize = 4;

/// Encode and write one message, then flush
pub async fn write_message<W>(writer: &mut W, message: &BinaryMessage) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
{
    let encoded = message.encode()?;
    write_frame(writer, &encoded).await
}

pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(FRAME_PREFIX_SIZE + frame.len());
    buf.extend_from_slice(&(frame.len() as u32).to_le_bytes());
    buf.extend_from_slice(frame);
    writer
        .write_all(&buf)
        .await
        .map_err(|e| TransportError::io("write frame", e))?;
    writer
        .flush()
        .await
        .map_err(|e| TransportError::io("flush frame", e))
}

/// Read one raw frame. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> TransportResult<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; FRAME_PREFIX_SIZE];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(TransportError::io("read frame length", e)),
    }

    let len = u32::from_le_bytes(prefix) as usize;
    if len > max_frame_size {
        return Err(TransportError::FrameTooLarge {
            size: len,
            limit: max_frame_size,
        });
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| TransportError::io("read frame body", e))?;
    Ok(Some(Bytes::from(body)))
}

/// Read and decode one message
pub async fn read_message<R>(
    reader: &mut R,
    max_frame_size: usize,
) -> TransportResult<Option<BinaryMessage>>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader, max_frame_size).await? {
        Some(frame) => Ok(Some(BinaryMessage::decode(&frame)?)),
        None => Ok(None),
    }
}
