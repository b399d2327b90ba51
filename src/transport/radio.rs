//! LoRa radio transport over a serial modem
//!
//! Bodies are wrapped in checksummed radio frames (see `hub_shared::radio`).
//! Corrupt or truncated frames are logged and dropped here; they never reach
//! the caller and never stall the frames behind them.

use async_trait::async_trait;
use bytes::Bytes;
use hub_shared::radio::{self, RadioDecoder, MAX_FRAME_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use super::serial::{SerialConnector, SerialSettings};
use super::traits::{Transport, TransportConnector, TransportKind, TransportStream};
use super::LinkTimeouts;
use crate::error::TransportError;

/// Serial radio link
pub struct RadioTransport<C: TransportConnector = SerialConnector> {
    settings: SerialSettings,
    connector: C,
    timeouts: LinkTimeouts,
    stream: Option<C::Stream>,
    decoder: RadioDecoder,
    read_buf: Vec<u8>,
    last_rx: Instant,
}

impl RadioTransport<SerialConnector> {
    /// Radio link on a real serial port
    pub fn open(settings: SerialSettings, timeouts: LinkTimeouts) -> Self {
        let connector = SerialConnector::new(settings.clone());
        Self::with_connector(settings, connector, timeouts)
    }
}

impl<C: TransportConnector> RadioTransport<C> {
    /// Radio link over any byte stream (used for bench modems and tests)
    pub fn with_connector(settings: SerialSettings, connector: C, timeouts: LinkTimeouts) -> Self {
        Self {
            settings,
            connector,
            timeouts,
            stream: None,
            decoder: RadioDecoder::new(),
            read_buf: vec![0u8; MAX_FRAME_LEN],
            last_rx: Instant::now(),
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    /// Next validated body already buffered, dropping garbage on the way
    fn next_buffered(&mut self) -> Option<Bytes> {
        loop {
            match self.decoder.decode_next() {
                Ok(body) => return body,
                Err(e) => {
                    warn!(port = %self.settings.port, error = %e, "Dropping malformed radio frame");
                }
            }
        }
    }
}

#[async_trait]
impl<C: TransportConnector> Transport for RadioTransport<C> {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = match timeout(self.timeouts.connect, self.connector.connect()).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(TransportError::IoFailure(e.to_string())),
            Err(_) => return Err(TransportError::Timeout),
        };

        self.decoder = RadioDecoder::new();
        self.last_rx = Instant::now();
        self.stream = Some(stream);
        info!("[LoRa] Link up on {}", self.connector.describe());
        Ok(())
    }

    async fn send(&mut self, body: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let frame = radio::encode_frame(body)?;

        let write = async {
            stream.write_all(&frame).await?;
            stream.flush().await
        };
        match timeout(self.timeouts.io, write).await {
            Ok(Ok(())) => {
                debug!("[LoRa] Sent {} byte frame", frame.len());
                Ok(())
            }
            Ok(Err(e)) => {
                self.stream = None;
                Err(e.into())
            }
            Err(_) => {
                // Part of the frame may already be on the air
                self.stream = None;
                Err(TransportError::Timeout)
            }
        }
    }

    async fn receive(&mut self) -> Result<Option<Bytes>, TransportError> {
        if self.stream.is_none() {
            return Err(TransportError::NotConnected);
        }
        if let Some(body) = self.next_buffered() {
            return Ok(Some(body));
        }

        if self.decoder.has_partial() && self.last_rx.elapsed() > self.timeouts.inter_frame {
            let dropped = self.decoder.discard_partial();
            warn!(port = %self.settings.port, dropped, "Discarding stale partial radio frame");
            if let Some(body) = self.next_buffered() {
                return Ok(Some(body));
            }
        }

        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        let read = match timeout(self.timeouts.poll, stream.read(&mut self.read_buf)).await {
            Err(_) => return Ok(None),
            Ok(result) => result,
        };

        match read {
            Ok(0) => {
                self.stream = None;
                Err(TransportError::IoFailure("serial port closed".into()))
            }
            Ok(n) => {
                self.last_rx = Instant::now();
                self.decoder.extend(&self.read_buf[..n]);
                Ok(self.next_buffered())
            }
            Err(e) => {
                self.stream = None;
                Err(e.into())
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = timeout(self.timeouts.io, TransportStream::shutdown(&mut stream))
                .await
                .unwrap_or(Ok(()))
            {
                debug!(error = %e, "[LoRa] Shutdown error ignored");
            }
            info!("[LoRa] Link down on {}", self.settings.port);
        }
        self.decoder = RadioDecoder::new();
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Lora
    }
}
