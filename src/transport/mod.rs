//! Device links to the hub
//!
//! Two transport variants implement [`Transport`]:
//! - [`RadioTransport`]: LoRa modem on a serial port, compact checksummed frames
//! - [`NetworkTransport`]: WiFi or cellular IP link, authenticated JSON frames

pub mod network;
pub mod radio;
pub mod serial;
pub mod tcp;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use hub_shared::limits;
use hub_shared::message::AuthRequest;
use hub_shared::DeviceConfig;
use serde::{Deserialize, Serialize};

pub use network::NetworkTransport;
pub use radio::RadioTransport;
pub use serial::{SerialConnector, SerialSettings, SerialTransportStream};
pub use tcp::{TcpConnector, TcpTransportStream};
pub use traits::{Transport, TransportConnector, TransportKind, TransportStream};

/// Bounded waits applied by every transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTimeouts {
    /// Opening the link, including the hub handshake
    pub connect: Duration,
    /// Writing one frame
    pub io: Duration,
    /// Longest single `receive()` wait
    pub poll: Duration,
    /// Radio only: idle time after which a partial frame is discarded
    pub inter_frame: Duration,
}

impl Default for LinkTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(limits::CONNECT_TIMEOUT_MS),
            io: Duration::from_millis(limits::IO_TIMEOUT_MS),
            poll: Duration::from_millis(limits::POLL_INTERVAL_MS),
            inter_frame: Duration::from_millis(limits::INTER_FRAME_GAP_MS),
        }
    }
}

/// Transport selection, each variant carrying only its own parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportSettings {
    Wifi {
        address: String,
    },
    Cellular {
        address: String,
    },
    Lora {
        #[serde(default = "default_lora_port")]
        port: String,
        #[serde(default = "default_lora_baud")]
        baud: u32,
    },
}

fn default_lora_port() -> String {
    SerialSettings::default().port
}

fn default_lora_baud() -> u32 {
    limits::DEFAULT_LORA_BAUD
}

impl TransportSettings {
    pub fn lora(port: impl Into<String>, baud: u32) -> Self {
        TransportSettings::Lora {
            port: port.into(),
            baud,
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            TransportSettings::Wifi { .. } => TransportKind::Wifi,
            TransportSettings::Cellular { .. } => TransportKind::Cellular,
            TransportSettings::Lora { .. } => TransportKind::Lora,
        }
    }
}

/// Construct the transport matching `settings` for this device
pub fn build(
    settings: &TransportSettings,
    device: &DeviceConfig,
    timeouts: LinkTimeouts,
) -> Box<dyn Transport> {
    let credentials = AuthRequest {
        device_id: device.device_id.clone(),
        api_key: device.api_key.clone(),
    };

    match settings {
        TransportSettings::Wifi { address } => {
            Box::new(NetworkTransport::wifi(address.clone(), credentials, timeouts))
        }
        TransportSettings::Cellular { address } => {
            Box::new(NetworkTransport::cellular(address.clone(), credentials, timeouts))
        }
        TransportSettings::Lora { port, baud } => Box::new(RadioTransport::open(
            SerialSettings::new(port.clone(), *baud),
            timeouts,
        )),
    }
}
