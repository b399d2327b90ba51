//! IP transport (WiFi / cellular) to the hub
//!
//! One persistent TCP connection per session, carrying length-prefixed JSON
//! bodies (see `hub_shared::codec`). Connecting performs an auth exchange:
//!
//! ```text
//! device -> hub : {"type":"auth","payload":{"device_id":..,"api_key":..}}
//! hub -> device : {"type":"auth_ok"} | {"type":"auth_rejected","payload":{"reason":..}}
//! ```
//!
//! Every send is a single delivery attempt; a write error or timeout is
//! returned to the caller and never retried here. Either one closes the link,
//! since part of the frame may already be on the stream.

use async_trait::async_trait;
use bytes::Bytes;
use hub_shared::codec::{self, FrameDecoder};
use hub_shared::message::{decode_body, encode_body, AuthRequest, Message, WireFormat};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::tcp::TcpConnector;
use super::traits::{Transport, TransportConnector, TransportKind, TransportStream};
use super::LinkTimeouts;
use crate::error::TransportError;

const READ_BUF_SIZE: usize = 4096;

/// Authenticated stream link to the hub
pub struct NetworkTransport<C: TransportConnector = TcpConnector> {
    kind: TransportKind,
    connector: C,
    credentials: AuthRequest,
    timeouts: LinkTimeouts,
    stream: Option<C::Stream>,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
}

impl NetworkTransport<TcpConnector> {
    /// WiFi link to the hub at `address` ("host:port")
    pub fn wifi(address: impl Into<String>, credentials: AuthRequest, timeouts: LinkTimeouts) -> Self {
        Self::with_connector(TransportKind::Wifi, TcpConnector::new(address), credentials, timeouts)
    }

    /// Cellular link to the hub at `address` ("host:port")
    pub fn cellular(address: impl Into<String>, credentials: AuthRequest, timeouts: LinkTimeouts) -> Self {
        Self::with_connector(TransportKind::Cellular, TcpConnector::new(address), credentials, timeouts)
    }
}

impl<C: TransportConnector> NetworkTransport<C> {
    pub fn with_connector(
        kind: TransportKind,
        connector: C,
        credentials: AuthRequest,
        timeouts: LinkTimeouts,
    ) -> Self {
        Self {
            kind,
            connector,
            credentials,
            timeouts,
            stream: None,
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; READ_BUF_SIZE],
        }
    }

    fn drop_link(&mut self) {
        self.stream = None;
        self.decoder.clear();
    }
}

/// Send the auth request and wait for the hub's verdict
async fn handshake<S: TransportStream>(
    stream: &mut S,
    decoder: &mut FrameDecoder,
    read_buf: &mut [u8],
    credentials: &AuthRequest,
) -> Result<(), TransportError> {
    let body = encode_body(WireFormat::Json, &Message::Auth(credentials.clone()))?;
    let frame = codec::encode(&body)?;
    stream.write_all(&frame).await?;
    stream.flush().await?;

    loop {
        while let Some(body) = decoder.decode_next()? {
            match decode_body(WireFormat::Json, &body) {
                Ok(Message::AuthOk) => return Ok(()),
                Ok(Message::AuthRejected { reason }) => {
                    return Err(TransportError::AuthRejected(reason));
                }
                Ok(other) => debug!("Ignoring {} before auth completed", other.kind()),
                Err(e) => warn!(error = %e, "Dropping malformed handshake frame"),
            }
        }

        let n = stream.read(read_buf).await?;
        if n == 0 {
            return Err(TransportError::IoFailure(
                "hub closed connection during handshake".into(),
            ));
        }
        decoder.extend(&read_buf[..n]);
    }
}

#[async_trait]
impl<C: TransportConnector> Transport for NetworkTransport<C> {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let deadline = Instant::now() + self.timeouts.connect;
        let mut stream = match timeout_at(deadline, self.connector.connect()).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(TransportError::IoFailure(e.to_string())),
            Err(_) => return Err(TransportError::Timeout),
        };

        self.decoder.clear();
        let verdict = timeout_at(
            deadline,
            handshake(&mut stream, &mut self.decoder, &mut self.read_buf, &self.credentials),
        )
        .await;

        match verdict {
            Ok(Ok(())) => {
                info!("[{}] Authenticated with hub at {}", self.kind, self.connector.describe());
                self.stream = Some(stream);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("[{}] Handshake failed: {}", self.kind, e);
                let _ = TransportStream::shutdown(&mut stream).await;
                self.decoder.clear();
                Err(e)
            }
            Err(_) => {
                self.decoder.clear();
                Err(TransportError::Timeout)
            }
        }
    }

    async fn send(&mut self, body: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let frame = codec::encode(body)?;

        let write = async {
            stream.write_all(&frame).await?;
            stream.flush().await
        };
        match timeout(self.timeouts.io, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.drop_link();
                Err(e.into())
            }
            Err(_) => {
                // A half-written frame would desync every frame after it
                self.drop_link();
                Err(TransportError::Timeout)
            }
        }
    }

    async fn receive(&mut self) -> Result<Option<Bytes>, TransportError> {
        if self.stream.is_none() {
            return Err(TransportError::NotConnected);
        }

        match self.decoder.decode_next() {
            Ok(Some(body)) => return Ok(Some(body)),
            Ok(None) => {}
            Err(e) => {
                // A bad length prefix means the byte stream is out of step
                self.drop_link();
                return Err(TransportError::IoFailure(format!("stream desynchronized: {e}")));
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
                self.drop_link();
                Err(TransportError::IoFailure("hub closed connection".into()))
            }
            Ok(n) => {
                self.decoder.extend(&self.read_buf[..n]);
                match self.decoder.decode_next() {
                    Ok(body) => Ok(body),
                    Err(e) => {
                        self.drop_link();
                        Err(TransportError::IoFailure(format!("stream desynchronized: {e}")))
                    }
                }
            }
            Err(e) => {
                self.drop_link();
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
                debug!(error = %e, "[{}] Shutdown error ignored", self.kind);
            }
            info!("[{}] Disconnected from hub", self.kind);
        }
        self.decoder.clear();
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::PipeConnector;
    use bytes::BytesMut;
    use hub_shared::{Alert, AlertLevel};
    use std::time::Duration;
    use tokio::io::DuplexStream;

    fn credentials() -> AuthRequest {
        AuthRequest {
            device_id: "robot_001".into(),
            api_key: "api_key".into(),
        }
    }

    fn fast_timeouts() -> LinkTimeouts {
        LinkTimeouts {
            connect: Duration::from_millis(300),
            poll: Duration::from_millis(20),
            ..LinkTimeouts::default()
        }
    }

    /// Read one frame from the far end of the pipe
    async fn read_message(peer: &mut DuplexStream) -> Message {
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 1024];
        loop {
            if let Some(body) = decoder.decode_next().unwrap() {
                return decode_body(WireFormat::Json, &body).unwrap();
            }
            let n = peer.read(&mut buf).await.unwrap();
            assert!(n > 0, "device closed the pipe");
            decoder.extend(&buf[..n]);
        }
    }

    async fn write_message(peer: &mut DuplexStream, message: &Message) {
        let body = encode_body(WireFormat::Json, message).unwrap();
        peer.write_all(&codec::encode(&body).unwrap()).await.unwrap();
    }

    fn transport(connector: PipeConnector) -> NetworkTransport<PipeConnector> {
        NetworkTransport::with_connector(TransportKind::Wifi, connector, credentials(), fast_timeouts())
    }

    #[tokio::test]
    async fn test_handshake_success() {
        let (connector, mut peer) = PipeConnector::pair(4096);
        let hub = tokio::spawn(async move {
            let auth = read_message(&mut peer).await;
            assert_eq!(auth, Message::Auth(credentials()));
            write_message(&mut peer, &Message::AuthOk).await;
            peer
        });

        let mut link = transport(connector);
        link.connect().await.unwrap();
        assert!(link.is_connected());
        assert_eq!(link.wire_format(), WireFormat::Json);
        let _peer = hub.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_rejected() {
        let (connector, mut peer) = PipeConnector::pair(4096);
        let hub = tokio::spawn(async move {
            let _ = read_message(&mut peer).await;
            write_message(
                &mut peer,
                &Message::AuthRejected {
                    reason: "Invalid API key".into(),
                },
            )
            .await;
            peer
        });

        let mut link = transport(connector);
        let err = link.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::AuthRejected(ref r) if r == "Invalid API key"));
        assert!(!link.is_connected());
        let _peer = hub.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_times_out() {
        let (connector, _peer) = PipeConnector::pair(4096);
        let mut link = transport(connector);
        assert!(matches!(link.connect().await, Err(TransportError::Timeout)));
        assert!(!link.is_connected());
    }

    #[tokio::test]
    async fn test_frames_pushed_after_auth_are_kept() {
        let (connector, mut peer) = PipeConnector::pair(4096);
        let alert = Alert::new("hub-1", "flood", AlertLevel::High, "river rising");
        let pushed = Message::Alert(alert.clone());
        let hub = tokio::spawn(async move {
            let _ = read_message(&mut peer).await;
            // auth_ok and an alert land in the same read
            let mut both = BytesMut::new();
            for msg in [Message::AuthOk, pushed] {
                let body = encode_body(WireFormat::Json, &msg).unwrap();
                both.extend_from_slice(&codec::encode(&body).unwrap());
            }
            peer.write_all(&both).await.unwrap();
            peer
        });

        let mut link = transport(connector);
        link.connect().await.unwrap();
        let body = link.receive().await.unwrap().expect("buffered alert");
        assert_eq!(decode_body(WireFormat::Json, &body).unwrap(), Message::Alert(alert));
        let _peer = hub.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_timeout_drops_link() {
        let (connector, mut peer) = PipeConnector::pair(64);
        let timeouts = LinkTimeouts {
            io: Duration::from_millis(50),
            ..fast_timeouts()
        };
        let mut link = NetworkTransport::with_connector(TransportKind::Wifi, connector, credentials(), timeouts);
        let hub = tokio::spawn(async move {
            let _ = read_message(&mut peer).await;
            write_message(&mut peer, &Message::AuthOk).await;
            // Stop reading; the device's writes back up
            peer
        });
        link.connect().await.unwrap();
        let _peer = hub.await.unwrap();

        let alert = Alert::new("a-1", "seismic", AlertLevel::High, "x".repeat(300));
        let body = encode_body(WireFormat::Json, &Message::Alert(alert)).unwrap();
        assert!(matches!(link.send(&body).await, Err(TransportError::Timeout)));
        assert!(!link.is_connected());
        assert!(matches!(link.send(&body).await, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_send_and_receive_after_connect() {
        let (connector, mut peer) = PipeConnector::pair(4096);
        let mut link = transport(connector);
        let hub = tokio::spawn(async move {
            let _ = read_message(&mut peer).await;
            write_message(&mut peer, &Message::AuthOk).await;
            let got = read_message(&mut peer).await;
            assert!(matches!(got, Message::Telemetry(_)));
            peer
        });
        link.connect().await.unwrap();

        let data = hub_shared::SensorData::new("robot_001", 3);
        let body = encode_body(WireFormat::Json, &Message::Telemetry(data)).unwrap();
        link.send(&body).await.unwrap();
        let peer = hub.await.unwrap();

        assert!(link.receive().await.unwrap().is_none());
        drop(peer);
        assert!(matches!(link.receive().await, Err(TransportError::IoFailure(_))));
        assert!(matches!(link.send(&body).await, Err(TransportError::NotConnected)));
    }
}
