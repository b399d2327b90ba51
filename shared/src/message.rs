//! Message envelope exchanged between a device and the hub
//!
//! On IP links a message body is JSON with an explicit discriminator:
//! ```text
//! { "type": "telemetry", "payload": { ... } }
//! ```
//! On radio links the same messages use the compact encoding in
//! [`crate::compact`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{compact, Alert, CodecError, Command, Registration, SensorData};

/// Connect-time credentials presented on handshake-capable links
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub device_id: String,
    pub api_key: String,
}

/// Every message a device sends or receives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Message {
    Auth(AuthRequest),
    AuthOk,
    AuthRejected { reason: String },
    Register(Registration),
    Telemetry(SensorData),
    Alert(Alert),
    Command(Command),
}

/// Discriminator of a [`Message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Register,
    Telemetry,
    Alert,
    Command,
    Auth,
    AuthOk,
    AuthRejected,
}

impl MessageKind {
    /// Discriminator string used in the JSON envelope
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Register => "register",
            MessageKind::Telemetry => "telemetry",
            MessageKind::Alert => "alert",
            MessageKind::Command => "command",
            MessageKind::Auth => "auth",
            MessageKind::AuthOk => "auth_ok",
            MessageKind::AuthRejected => "auth_rejected",
        }
    }

    /// One-byte tag used in compact radio bodies
    pub fn tag(self) -> u8 {
        match self {
            MessageKind::Register => 0x01,
            MessageKind::Telemetry => 0x02,
            MessageKind::Alert => 0x03,
            MessageKind::Command => 0x04,
            MessageKind::Auth => 0x05,
            MessageKind::AuthOk => 0x06,
            MessageKind::AuthRejected => 0x07,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0x01 => Ok(MessageKind::Register),
            0x02 => Ok(MessageKind::Telemetry),
            0x03 => Ok(MessageKind::Alert),
            0x04 => Ok(MessageKind::Command),
            0x05 => Ok(MessageKind::Auth),
            0x06 => Ok(MessageKind::AuthOk),
            0x07 => Ok(MessageKind::AuthRejected),
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Auth(_) => MessageKind::Auth,
            Message::AuthOk => MessageKind::AuthOk,
            Message::AuthRejected { .. } => MessageKind::AuthRejected,
            Message::Register(_) => MessageKind::Register,
            Message::Telemetry(_) => MessageKind::Telemetry,
            Message::Alert(_) => MessageKind::Alert,
            Message::Command(_) => MessageKind::Command,
        }
    }
}

/// Body encoding spoken by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// JSON envelope, used on IP links
    Json,
    /// Tag byte plus protobuf body, used on radio links
    Compact,
}

/// Encode a message into a frame body for the given format
pub fn encode_body(format: WireFormat, message: &Message) -> Result<Bytes, CodecError> {
    match format {
        WireFormat::Json => Ok(Bytes::from(serde_json::to_vec(message)?)),
        WireFormat::Compact => compact::encode(message),
    }
}

/// Decode a frame body produced by [`encode_body`]
pub fn decode_body(format: WireFormat, body: &[u8]) -> Result<Message, CodecError> {
    if body.is_empty() {
        return Err(CodecError::EmptyFrame);
    }
    match format {
        WireFormat::Json => Ok(serde_json::from_slice(body)?),
        WireFormat::Compact => compact::decode(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AlertLevel, SensorReading};

    #[test]
    fn test_json_envelope_discriminator() {
        let msg = Message::Telemetry(SensorData::new("dev-1", 42));
        let body = encode_body(WireFormat::Json, &msg).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["type"], "telemetry");
        assert_eq!(value["payload"]["device_id"], "dev-1");

        let ok = encode_body(WireFormat::Json, &Message::AuthOk).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&ok).unwrap();
        assert_eq!(value["type"], "auth_ok");
    }

    #[test]
    fn test_json_telemetry_preserves_reading_order() {
        for n in [0usize, 1, 5] {
            let mut data = SensorData::new("dev-1", 7);
            for i in 0..n {
                data = data.with_reading(SensorReading::new(format!("s{i}"), i as f64, "u", i as u64));
            }
            let body = encode_body(WireFormat::Json, &Message::Telemetry(data.clone())).unwrap();
            assert_eq!(decode_body(WireFormat::Json, &body).unwrap(), Message::Telemetry(data));
        }
    }

    #[test]
    fn test_decode_inbound_command_from_hub() {
        let raw = br#"{"type":"command","payload":{"id":"c-9","name":"reboot","timestamp":5}}"#;
        let msg = decode_body(WireFormat::Json, raw).unwrap();
        match msg {
            Message::Command(cmd) => {
                assert_eq!(cmd.name, "reboot");
                assert!(cmd.payload.is_empty());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_json_is_reported() {
        let err = decode_body(WireFormat::Json, br#"{"type":"alert","payload":{}}"#).unwrap_err();
        assert!(err.is_malformed());
        assert!(matches!(decode_body(WireFormat::Json, b""), Err(CodecError::EmptyFrame)));
    }

    #[test]
    fn test_kind_tags_roundtrip() {
        let alert = Alert::new("a", "fire", AlertLevel::Critical, "smoke");
        for kind in [
            Message::Alert(alert).kind(),
            MessageKind::Register,
            MessageKind::AuthRejected,
        ] {
            assert_eq!(MessageKind::from_tag(kind.tag()).unwrap(), kind);
        }
        assert!(matches!(MessageKind::from_tag(0x7f), Err(CodecError::UnknownTag(0x7f))));
    }
}
