//! Compact body encoding for bandwidth-starved radio links
//!
//! A body is a one-byte message tag followed by a protobuf message:
//! ```text
//! [ 1 byte: MessageKind tag ][ N bytes: protobuf ]
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use prost::Message as _;

use crate::message::{AuthRequest, Message, MessageKind};
use crate::{Alert, AlertLevel, CodecError, Command, Location, Registration, SensorData, SensorReading};

#[derive(Clone, PartialEq, prost::Message)]
struct WireLocation {
    #[prost(double, tag = "1")]
    lat: f64,
    #[prost(double, tag = "2")]
    lon: f64,
}

#[derive(Clone, PartialEq, prost::Message)]
struct WireRegistration {
    #[prost(string, tag = "1")]
    device_id: String,
    #[prost(string, tag = "2")]
    device_type: String,
    #[prost(string, optional, tag = "3")]
    api_key: Option<String>,
    #[prost(message, optional, tag = "4")]
    location: Option<WireLocation>,
    #[prost(string, repeated, tag = "5")]
    capabilities: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
struct WireReading {
    #[prost(string, tag = "1")]
    sensor_type: String,
    #[prost(double, tag = "2")]
    value: f64,
    #[prost(string, tag = "3")]
    unit: String,
    #[prost(uint64, tag = "4")]
    timestamp: u64,
}

#[derive(Clone, PartialEq, prost::Message)]
struct WireSensorData {
    #[prost(string, tag = "1")]
    device_id: String,
    #[prost(uint64, tag = "2")]
    timestamp: u64,
    #[prost(message, repeated, tag = "3")]
    readings: Vec<WireReading>,
}

#[derive(Clone, PartialEq, prost::Message)]
struct WireAlert {
    #[prost(string, tag = "1")]
    id: String,
    #[prost(string, tag = "2")]
    kind: String,
    #[prost(uint32, tag = "3")]
    level: u32,
    #[prost(string, tag = "4")]
    message: String,
    #[prost(uint64, tag = "5")]
    timestamp: u64,
}

#[derive(Clone, PartialEq, prost::Message)]
struct WireCommand {
    #[prost(string, tag = "1")]
    id: String,
    #[prost(string, tag = "2")]
    name: String,
    #[prost(string, tag = "3")]
    payload: String,
    #[prost(uint64, tag = "4")]
    timestamp: u64,
}

#[derive(Clone, PartialEq, prost::Message)]
struct WireAuth {
    #[prost(string, tag = "1")]
    device_id: String,
    #[prost(string, tag = "2")]
    api_key: String,
}

#[derive(Clone, PartialEq, prost::Message)]
struct WireRejection {
    #[prost(string, tag = "1")]
    reason: String,
}

fn proto_of(message: &Message) -> Vec<u8> {
    match message {
        Message::Auth(auth) => WireAuth {
            device_id: auth.device_id.clone(),
            api_key: auth.api_key.clone(),
        }
        .encode_to_vec(),
        Message::AuthOk => Vec::new(),
        Message::AuthRejected { reason } => WireRejection {
            reason: reason.clone(),
        }
        .encode_to_vec(),
        Message::Register(reg) => WireRegistration {
            device_id: reg.device_id.clone(),
            device_type: reg.device_type.clone(),
            api_key: reg.api_key.clone(),
            location: Some(WireLocation {
                lat: reg.location.lat,
                lon: reg.location.lon,
            }),
            capabilities: reg.capabilities.clone(),
        }
        .encode_to_vec(),
        Message::Telemetry(data) => WireSensorData {
            device_id: data.device_id.clone(),
            timestamp: data.timestamp,
            readings: data
                .readings
                .iter()
                .map(|r| WireReading {
                    sensor_type: r.sensor_type.clone(),
                    value: r.value,
                    unit: r.unit.clone(),
                    timestamp: r.timestamp,
                })
                .collect(),
        }
        .encode_to_vec(),
        Message::Alert(alert) => WireAlert {
            id: alert.id.clone(),
            kind: alert.kind.clone(),
            level: alert.level.as_u8() as u32,
            message: alert.message.clone(),
            timestamp: alert.timestamp,
        }
        .encode_to_vec(),
        Message::Command(cmd) => WireCommand {
            id: cmd.id.clone(),
            name: cmd.name.clone(),
            payload: cmd.payload.clone(),
            timestamp: cmd.timestamp,
        }
        .encode_to_vec(),
    }
}

/// Encode a message as `[tag][protobuf]`
pub fn encode(message: &Message) -> Result<Bytes, CodecError> {
    let proto = proto_of(message);
    let mut buf = BytesMut::with_capacity(1 + proto.len());
    buf.put_u8(message.kind().tag());
    buf.extend_from_slice(&proto);
    Ok(buf.freeze())
}

/// Decode a `[tag][protobuf]` body
pub fn decode(body: &[u8]) -> Result<Message, CodecError> {
    let (&tag, proto) = body.split_first().ok_or(CodecError::EmptyFrame)?;

    let message = match MessageKind::from_tag(tag)? {
        MessageKind::Auth => {
            let wire = WireAuth::decode(proto)?;
            Message::Auth(AuthRequest {
                device_id: wire.device_id,
                api_key: wire.api_key,
            })
        }
        MessageKind::AuthOk => Message::AuthOk,
        MessageKind::AuthRejected => Message::AuthRejected {
            reason: WireRejection::decode(proto)?.reason,
        },
        MessageKind::Register => {
            let wire = WireRegistration::decode(proto)?;
            let location = wire
                .location
                .map(|l| Location::new(l.lat, l.lon))
                .unwrap_or_default();
            Message::Register(Registration {
                device_id: wire.device_id,
                device_type: wire.device_type,
                api_key: wire.api_key,
                location,
                capabilities: wire.capabilities,
            })
        }
        MessageKind::Telemetry => {
            let wire = WireSensorData::decode(proto)?;
            Message::Telemetry(SensorData {
                device_id: wire.device_id,
                timestamp: wire.timestamp,
                readings: wire
                    .readings
                    .into_iter()
                    .map(|r| SensorReading {
                        sensor_type: r.sensor_type,
                        value: r.value,
                        unit: r.unit,
                        timestamp: r.timestamp,
                    })
                    .collect(),
            })
        }
        MessageKind::Alert => {
            let wire = WireAlert::decode(proto)?;
            let level = u8::try_from(wire.level)
                .ok()
                .and_then(AlertLevel::from_u8)
                .ok_or(CodecError::InvalidField("level"))?;
            Message::Alert(Alert {
                id: wire.id,
                kind: wire.kind,
                level,
                message: wire.message,
                timestamp: wire.timestamp,
            })
        }
        MessageKind::Command => {
            let wire = WireCommand::decode(proto)?;
            Message::Command(Command {
                id: wire.id,
                name: wire.name,
                payload: wire.payload,
                timestamp: wire.timestamp,
            })
        }
    };

    Ok(message)
}
