//! Hub Shared Protocol Types
//!
//! This crate provides the data model, message envelope, wire codecs and the
//! session state machine shared by every transport of a hub-connected device.
//! Nothing in here performs I/O.

pub mod codec;
pub mod compact;
pub mod crc;
pub mod message;
pub mod radio;
pub mod state_machine;

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub use codec::CodecError;
pub use message::{Message, MessageKind, WireFormat};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Protocol limits and timing defaults
pub mod limits {
    /// Largest JSON body accepted on a network link (64 KiB)
    pub const MAX_NETWORK_FRAME: u32 = 64 * 1024;

    /// Largest radio frame body; keeps a whole frame inside one LoRa packet
    pub const MAX_RADIO_BODY: usize = 250;

    /// Connect / handshake timeout in milliseconds
    pub const CONNECT_TIMEOUT_MS: u64 = 5000;

    /// Per-frame write timeout in milliseconds
    pub const IO_TIMEOUT_MS: u64 = 3000;

    /// Upper bound of a single `receive()` wait in milliseconds
    pub const POLL_INTERVAL_MS: u64 = 100;

    /// A partial radio frame idle for longer than this is discarded
    pub const INTER_FRAME_GAP_MS: u64 = 1000;

    /// Default LoRa serial baud rate
    pub const DEFAULT_LORA_BAUD: u32 = 9600;
}

/// Geographic position of a device
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Identity and capability descriptor supplied once by the owning application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique, stable device identifier
    pub device_id: String,
    /// Category tag, e.g. "environmental_station"
    pub device_type: String,
    /// Opaque credential presented to the hub
    pub api_key: String,
    pub location: Location,
    /// Sensor-type tags in declaration order
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl DeviceConfig {
    /// Reject configurations the hub could never accept
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.device_id.trim().is_empty() {
            return Err(CodecError::InvalidField("device_id"));
        }
        Ok(())
    }
}

/// One sensor sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_type: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: u64,
}

impl SensorReading {
    pub fn new(
        sensor_type: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            sensor_type: sensor_type.into(),
            value,
            unit: unit.into(),
            timestamp,
        }
    }
}

/// Telemetry payload: an ordered batch of readings from one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorData {
    pub device_id: String,
    pub timestamp: u64,
    #[serde(default)]
    pub readings: Vec<SensorReading>,
}

impl SensorData {
    /// Create an empty telemetry batch
    pub fn new(device_id: impl Into<String>, timestamp: u64) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp,
            readings: Vec::new(),
        }
    }

    /// Append a reading, preserving insertion order
    pub fn with_reading(mut self, reading: SensorReading) -> Self {
        self.readings.push(reading);
        self
    }
}

/// Alert severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl AlertLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AlertLevel::Low),
            2 => Some(AlertLevel::Medium),
            3 => Some(AlertLevel::High),
            4 => Some(AlertLevel::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertLevel::Low => "LOW",
            AlertLevel::Medium => "MEDIUM",
            AlertLevel::High => "HIGH",
            AlertLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

impl FromStr for AlertLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(AlertLevel::Low),
            "medium" => Ok(AlertLevel::Medium),
            "high" => Ok(AlertLevel::High),
            "critical" => Ok(AlertLevel::Critical),
            other => Err(format!("unknown alert level: {other}")),
        }
    }
}

/// Event-triggered message, device-originated or pushed by the hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub level: AlertLevel,
    pub message: String,
    pub timestamp: u64,
}

impl Alert {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        level: AlertLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            level,
            message: message.into(),
            timestamp: now_ms(),
        }
    }
}

/// Instruction pushed by the hub to a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub name: String,
    /// Opaque command arguments, interpreted by the application
    #[serde(default)]
    pub payload: String,
    pub timestamp: u64,
}

/// Body of a `register` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub device_id: String,
    pub device_type: String,
    /// Only carried on links without a connect-time handshake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub location: Location,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl Registration {
    /// Build a registration from the device descriptor
    pub fn from_config(config: &DeviceConfig, include_key: bool) -> Self {
        Self {
            device_id: config.device_id.clone(),
            device_type: config.device_type.clone(),
            api_key: include_key.then(|| config.api_key.clone()),
            location: config.location,
            capabilities: config.capabilities.clone(),
        }
    }
}
