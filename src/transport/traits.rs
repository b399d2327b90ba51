//! Transport trait abstraction for pluggable device links

use std::fmt;
use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use hub_shared::WireFormat;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::TransportError;

/// A byte stream that can read and write
#[async_trait]
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Close the stream gracefully
    async fn shutdown(&mut self) -> io::Result<()>;
}

/// Factory for opening byte streams (serial port, TCP socket, test pipe)
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// The stream type this connector produces
    type Stream: TransportStream;

    /// Attempt to open the stream
    async fn connect(&self) -> io::Result<Self::Stream>;

    /// Human-readable endpoint description for logs
    fn describe(&self) -> String;
}

/// Which physical link a transport rides on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Wifi,
    Cellular,
    Lora,
}

impl TransportKind {
    /// Body encoding spoken on this kind of link
    pub fn wire_format(self) -> WireFormat {
        match self {
            TransportKind::Wifi | TransportKind::Cellular => WireFormat::Json,
            TransportKind::Lora => WireFormat::Compact,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TransportKind::Wifi => "WiFi",
            TransportKind::Cellular => "Cellular",
            TransportKind::Lora => "LoRa",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Frame-level channel between the device and the hub
///
/// `send` takes one encoded message body and applies the link's framing.
/// `receive` waits at most the configured poll interval for one complete
/// body and returns `Ok(None)` when nothing arrived in that window; it never
/// blocks without a bound.
#[async_trait]
pub trait Transport: Send {
    /// Bring the link up (open port, or connect and authenticate)
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Transmit one message body
    async fn send(&mut self, body: &[u8]) -> Result<(), TransportError>;

    /// Poll for the next inbound message body
    async fn receive(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Tear the link down; safe to call when already closed
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    fn kind(&self) -> TransportKind;

    fn wire_format(&self) -> WireFormat {
        self.kind().wire_format()
    }
}
