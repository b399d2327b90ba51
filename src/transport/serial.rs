//! Serial port plumbing for LoRa radio modems

use crate::transport::traits::{TransportConnector, TransportStream};
use async_trait::async_trait;
use hub_shared::limits::DEFAULT_LORA_BAUD;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::info;

/// Port identifier and line speed of a radio modem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Device path, e.g. "/dev/ttyUSB0"
    pub port: String,
    pub baud: u32,
}

impl SerialSettings {
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self {
            port: port.into(),
            baud,
        }
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self::new("/dev/ttyUSB0", DEFAULT_LORA_BAUD)
    }
}

/// Serial stream wrapper implementing TransportStream
pub struct SerialTransportStream {
    inner: SerialStream,
}

impl AsyncRead for SerialTransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for SerialTransportStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[async_trait]
impl TransportStream for SerialTransportStream {
    async fn shutdown(&mut self) -> io::Result<()> {
        tokio::io::AsyncWriteExt::shutdown(&mut self.inner).await
    }
}

/// Opens the modem's serial port as 8N1 without flow control
pub struct SerialConnector {
    settings: SerialSettings,
}

impl SerialConnector {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

#[async_trait]
impl TransportConnector for SerialConnector {
    type Stream = SerialTransportStream;

    async fn connect(&self) -> io::Result<Self::Stream> {
        let inner = tokio_serial::new(self.settings.port.as_str(), self.settings.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()?;

        info!(
            port = %self.settings.port,
            baud = self.settings.baud,
            "Opened serial port"
        );
        Ok(SerialTransportStream { inner })
    }

    fn describe(&self) -> String {
        format!("serial://{}@{}", self.settings.port, self.settings.baud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = SerialSettings::default();
        assert_eq!(settings.port, "/dev/ttyUSB0");
        assert_eq!(settings.baud, 9600);
        assert_eq!(SerialConnector::new(settings).describe(), "serial:///dev/ttyUSB0@9600");
    }

    #[tokio::test]
    async fn test_missing_port_fails() {
        let connector = SerialConnector::new(SerialSettings::new("/dev/hub-device-no-such-port", 9600));
        assert!(connector.connect().await.is_err());
    }
}
