//! Hub Device SDK
//!
//! Connects a field device (sensor station, robot, camera node) to a central
//! hub over LoRa radio, WiFi or cellular links. The [`HubClient`] facade hides
//! the transport: the same calls register the device, push telemetry and
//! alerts, and deliver hub-originated alerts and commands to callbacks.

pub mod client;
pub mod config;
pub mod error;
pub mod transport;
pub mod video;

pub use client::{AlertHandler, CommandHandler, HubClient};
pub use config::{ClientConfig, TimeoutConfig, VideoConfig};
pub use error::TransportError;
pub use transport::{LinkTimeouts, Transport, TransportKind, TransportSettings};
pub use video::{StreamDescriptor, VideoError, VideoStreamClient};

pub use hub_shared::state_machine::SessionState;
pub use hub_shared::{
    Alert, AlertLevel, Command, DeviceConfig, Location, Registration, SensorData, SensorReading,
};
