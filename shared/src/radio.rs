//! Checksummed framing for serial radio links
//!
//! Every radio frame is laid out as:
//! ```text
//! [ 0xC3 sync ][ u16 BE body length ][ body ][ u16 BE CRC-16 of length + body ]
//! ```
//!
//! Radio links drop and garble bytes, so the decoder never trusts a frame
//! until its length is in range and its checksum matches. On any mismatch it
//! discards the sync byte and rescans, which keeps one bad frame from
//! swallowing the frames behind it.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::crc::{crc16, crc16_parts};
use crate::limits::MAX_RADIO_BODY;
use crate::CodecError;

/// Start-of-frame marker
pub const SYNC: u8 = 0xC3;

/// sync + length
const HEADER_LEN: usize = 3;
const CRC_LEN: usize = 2;

/// Largest possible frame on the wire
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_RADIO_BODY + CRC_LEN;

/// Wrap a body in a radio frame
pub fn encode_frame(body: &[u8]) -> Result<Bytes, CodecError> {
    if body.is_empty() {
        return Err(CodecError::EmptyFrame);
    }
    if body.len() > MAX_RADIO_BODY {
        return Err(CodecError::MessageTooLarge {
            size: body.len(),
            max: MAX_RADIO_BODY,
        });
    }

    let len = (body.len() as u16).to_be_bytes();
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len() + CRC_LEN);
    buf.put_u8(SYNC);
    buf.extend_from_slice(&len);
    buf.extend_from_slice(body);
    buf.put_u16(crc16_parts(&[&len, body]));

    Ok(buf.freeze())
}

/// Streaming decoder that resynchronises after corruption
#[derive(Debug, Default)]
pub struct RadioDecoder {
    buffer: BytesMut,
    discarded: u64,
}

impl RadioDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_FRAME_LEN * 2),
            discarded: 0,
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame body
    ///
    /// Returns:
    /// - `Ok(Some(body))` for a validated frame
    /// - `Ok(None)` when more bytes are needed
    /// - `Err(...)` when a candidate frame was rejected; the offending sync
    ///   byte has already been skipped, so calling again continues the scan
    pub fn decode_next(&mut self) -> Result<Option<Bytes>, CodecError> {
        match self.buffer.iter().position(|&b| b == SYNC) {
            Some(0) => {}
            Some(pos) => {
                self.buffer.advance(pos);
                self.discarded += pos as u64;
            }
            None => {
                self.discarded += self.buffer.len() as u64;
                self.buffer.clear();
                return Ok(None);
            }
        }

        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }

        let body_len = u16::from_be_bytes([self.buffer[1], self.buffer[2]]) as usize;
        if body_len == 0 || body_len > MAX_RADIO_BODY {
            self.skip_sync();
            return Err(CodecError::InvalidLength(body_len as u32));
        }

        let total_len = HEADER_LEN + body_len + CRC_LEN;
        if self.buffer.len() < total_len {
            // A complete frame behind this candidate means it was cut short
            if let Some(pos) = self.next_complete_frame() {
                self.buffer.advance(pos);
                self.discarded += pos as u64;
                return Err(CodecError::TruncatedFrame { claimed: body_len });
            }
            return Ok(None);
        }

        let expected = u16::from_be_bytes([self.buffer[total_len - 2], self.buffer[total_len - 1]]);
        let actual = crc16(&self.buffer[1..total_len - CRC_LEN]);
        if expected != actual {
            self.skip_sync();
            return Err(CodecError::ChecksumMismatch { expected, actual });
        }

        self.buffer.advance(HEADER_LEN);
        let body = self.buffer.split_to(body_len).freeze();
        self.buffer.advance(CRC_LEN);

        Ok(Some(body))
    }

    /// True when bytes of an incomplete frame are buffered
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Drop a partial frame that will never complete
    ///
    /// Only the candidate's bytes up to the next sync byte go; anything that
    /// may start a later frame stays buffered for the next decode.
    pub fn discard_partial(&mut self) -> usize {
        if self.buffer.is_empty() {
            return 0;
        }
        let dropped = self.buffer[1..]
            .iter()
            .position(|&b| b == SYNC)
            .map_or(self.buffer.len(), |pos| pos + 1);
        self.buffer.advance(dropped);
        self.discarded += dropped as u64;
        dropped
    }

    /// Total bytes thrown away while hunting for frames
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    /// Offset of the first later sync byte that starts a complete, valid frame
    fn next_complete_frame(&self) -> Option<usize> {
        (1..self.buffer.len())
            .filter(|&pos| self.buffer[pos] == SYNC)
            .find(|&pos| is_complete_frame(&self.buffer[pos..]))
    }

    fn skip_sync(&mut self) {
        self.buffer.advance(1);
        self.discarded += 1;
    }
}

/// True when `buf` starts with a whole frame whose checksum matches
fn is_complete_frame(buf: &[u8]) -> bool {
    if buf.len() < HEADER_LEN || buf[0] != SYNC {
        return false;
    }
    let body_len = u16::from_be_bytes([buf[1], buf[2]]) as usize;
    if body_len == 0 || body_len > MAX_RADIO_BODY {
        return false;
    }
    let total_len = HEADER_LEN + body_len + CRC_LEN;
    if buf.len() < total_len {
        return false;
    }
    let expected = u16::from_be_bytes([buf[total_len - 2], buf[total_len - 1]]);
    crc16(&buf[1..total_len - CRC_LEN]) == expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{decode_body, encode_body, Message, WireFormat};
    use crate::{SensorData, SensorReading};

    fn telemetry_body(device: &str) -> Bytes {
        let data = SensorData::new(device, 5).with_reading(SensorReading::new("temperature", 25.0, "C", 5));
        encode_body(WireFormat::Compact, &Message::Telemetry(data)).unwrap()
    }

    /// Decode everything currently buffered, skipping rejected candidates
    fn drain(decoder: &mut RadioDecoder) -> (Vec<Bytes>, usize) {
        let mut bodies = Vec::new();
        let mut errors = 0;
        loop {
            match decoder.decode_next() {
                Ok(Some(body)) => bodies.push(body),
                Ok(None) => break,
                Err(_) => errors += 1,
            }
        }
        (bodies, errors)
    }

    #[test]
    fn test_frame_roundtrip() {
        let body = telemetry_body("env_station_kl_001");
        let frame = encode_frame(&body).unwrap();
        assert_eq!(frame[0], SYNC);
        assert_eq!(frame.len(), body.len() + HEADER_LEN + CRC_LEN);

        let mut decoder = RadioDecoder::new();
        decoder.extend(&frame);
        let decoded = decoder.decode_next().unwrap().unwrap();
        assert_eq!(decoded, body);
        assert!(!decoder.has_partial());
        assert!(matches!(decode_body(WireFormat::Compact, &decoded), Ok(Message::Telemetry(_))));
    }

    #[test]
    fn test_partial_frame_waits() {
        let frame = encode_frame(&telemetry_body("dev")).unwrap();
        let mut decoder = RadioDecoder::new();
        decoder.extend(&frame[..4]);
        assert!(decoder.decode_next().unwrap().is_none());
        decoder.extend(&frame[4..]);
        assert!(decoder.decode_next().unwrap().is_some());
    }

    #[test]
    fn test_truncated_frame_does_not_poison_next() {
        let first = encode_frame(&telemetry_body("first")).unwrap();
        let second_body = telemetry_body("second");
        let second = encode_frame(&second_body).unwrap();

        let mut decoder = RadioDecoder::new();
        decoder.extend(&first[..first.len() - 4]);
        decoder.extend(&second);

        let (bodies, errors) = drain(&mut decoder);
        assert_eq!(bodies, vec![second_body]);
        assert!(errors >= 1);
        assert!(decoder.discarded_bytes() > 0);
    }

    #[test]
    fn test_corrupted_byte_detected() {
        let mut frame = encode_frame(&telemetry_body("dev")).unwrap().to_vec();
        let mid = frame.len() / 2;
        frame[mid] ^= 0x20;

        let mut decoder = RadioDecoder::new();
        decoder.extend(&frame);
        assert!(matches!(decoder.decode_next(), Err(CodecError::ChecksumMismatch { .. })));
        let (bodies, _) = drain(&mut decoder);
        assert!(bodies.is_empty());
    }

    #[test]
    fn test_leading_noise_skipped() {
        let body = telemetry_body("dev");
        let mut decoder = RadioDecoder::new();
        decoder.extend(&[0x00, 0x11, 0x22]);
        decoder.extend(&encode_frame(&body).unwrap());
        assert_eq!(decoder.decode_next().unwrap(), Some(body));
        assert_eq!(decoder.discarded_bytes(), 3);
    }

    #[test]
    fn test_out_of_range_length_rejected() {
        let mut decoder = RadioDecoder::new();
        decoder.extend(&[SYNC, 0xFF, 0xFF, 0x01]);
        assert!(matches!(decoder.decode_next(), Err(CodecError::InvalidLength(0xFFFF))));
    }

    #[test]
    fn test_encode_limits() {
        assert!(matches!(encode_frame(&[]), Err(CodecError::EmptyFrame)));
        let big = vec![1u8; MAX_RADIO_BODY + 1];
        assert!(matches!(encode_frame(&big), Err(CodecError::MessageTooLarge { .. })));
    }

    #[test]
    fn test_short_frame_behind_long_truncated_frame() {
        let long = encode_frame(&[0x55; 200]).unwrap();
        let short_body: &[u8] = b"\x02\n\x03abc";
        let short = encode_frame(short_body).unwrap();
        assert_eq!(short.len(), 11);

        let mut decoder = RadioDecoder::new();
        decoder.extend(&long[..10]);
        decoder.extend(&short);

        let (bodies, errors) = drain(&mut decoder);
        assert_eq!(bodies, vec![Bytes::from_static(short_body)]);
        assert_eq!(errors, 1);
        assert!(!decoder.has_partial());
        assert_eq!(decoder.discarded_bytes(), 10);
    }

    #[test]
    fn test_discard_partial_keeps_following_candidate() {
        let long = encode_frame(&[0x55; 200]).unwrap();
        let short = encode_frame(b"\x02\n\x03abc").unwrap();

        let mut decoder = RadioDecoder::new();
        decoder.extend(&long[..10]);
        decoder.extend(&short[..5]);
        assert!(decoder.decode_next().unwrap().is_none());

        assert_eq!(decoder.discard_partial(), 10);
        assert!(decoder.has_partial());
        decoder.extend(&short[5..]);
        assert_eq!(decoder.decode_next().unwrap(), Some(Bytes::copy_from_slice(&short[3..9])));
    }

    #[test]
    fn test_discard_partial() {
        let frame = encode_frame(&telemetry_body("dev")).unwrap();
        let mut decoder = RadioDecoder::new();
        decoder.extend(&frame[..6]);
        assert!(decoder.decode_next().unwrap().is_none());
        assert_eq!(decoder.discard_partial(), 6);
        decoder.extend(&frame);
        assert!(decoder.decode_next().unwrap().is_some());
    }
}
