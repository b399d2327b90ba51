//! In-memory connectors standing in for serial ports and sockets in tests

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::DuplexStream;

use super::traits::{TransportConnector, TransportStream};

#[async_trait]
impl TransportStream for DuplexStream {
    async fn shutdown(&mut self) -> io::Result<()> {
        tokio::io::AsyncWriteExt::shutdown(self).await
    }
}

/// Hands out pre-made pipe ends, one per `connect()`
pub struct PipeConnector {
    pending: Mutex<VecDeque<DuplexStream>>,
}

impl PipeConnector {
    /// Connector with a single pipe; the second value is the far end
    pub fn pair(capacity: usize) -> (Self, DuplexStream) {
        let (near, far) = tokio::io::duplex(capacity);
        let connector = Self {
            pending: Mutex::new(VecDeque::from([near])),
        };
        (connector, far)
    }

    /// Connector whose device never shows up
    pub fn unavailable() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl TransportConnector for PipeConnector {
    type Stream = DuplexStream;

    async fn connect(&self) -> io::Result<Self::Stream> {
        let next = self
            .pending
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "pipe connector poisoned"))?
            .pop_front();
        next.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such device"))
    }

    fn describe(&self) -> String {
        "pipe".into()
    }
}
