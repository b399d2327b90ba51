//! Length-prefixed codec for network framing
//!
//! All network frames are laid out as:
//! ```text
//! [ 4 bytes: length (u32, big-endian) ][ N bytes: JSON message body ]
//! ```
//!
//! This preserves message boundaries over TCP streams.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::limits::MAX_NETWORK_FRAME;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Invalid frame length: {0}")]
    InvalidLength(u32),

    #[error("Checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Truncated frame: claimed {claimed} byte body")]
    TruncatedFrame { claimed: usize },

    #[error("Unknown message tag: {0:#04x}")]
    UnknownTag(u8),

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Invalid field: {0}")]
    InvalidField(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protobuf decode error: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

impl CodecError {
    /// True for inbound failures that mean "this frame is garbage, drop it"
    pub fn is_malformed(&self) -> bool {
        !matches!(self, CodecError::MessageTooLarge { .. })
    }
}

/// Wrap a message body in a length-prefixed frame
pub fn encode(body: &[u8]) -> Result<Bytes, CodecError> {
    if body.len() > MAX_NETWORK_FRAME as usize {
        return Err(CodecError::MessageTooLarge {
            size: body.len(),
            max: MAX_NETWORK_FRAME as usize,
        });
    }

    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.extend_from_slice(body);

    Ok(buf.freeze())
}

/// Try to decode a length-prefixed body from a buffer
///
/// Returns:
/// - `Ok(Some(body))` if a complete frame was decoded
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the length prefix is invalid
pub fn decode(buf: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
    if buf.len() < 4 {
        return Ok(None);
    }

    // Peek at the length prefix without consuming
    let body_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

    if body_len == 0 || body_len > MAX_NETWORK_FRAME {
        return Err(CodecError::InvalidLength(body_len));
    }

    let total_len = 4 + body_len as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(4);
    Ok(Some(buf.split_to(body_len as usize).freeze()))
}

/// Decoder state machine for streaming decoding
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Partial frame data being accumulated
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete frames
    pub fn decode_next(&mut self) -> Result<Option<Bytes>, CodecError> {
        decode(&mut self.buffer)
    }

    /// Drop everything buffered, e.g. after a reconnect
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}
