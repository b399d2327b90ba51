//! Error taxonomy shared by transports and the client facade

use hub_shared::CodecError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Operation attempted outside the Connected state
    #[error("not connected")]
    NotConnected,

    /// Send/receive failed at the transport level
    #[error("I/O failure: {0}")]
    IoFailure(String),

    /// A bounded wait expired
    #[error("operation timed out")]
    Timeout,

    /// The hub refused the device credentials during the handshake
    #[error("hub rejected credentials: {0}")]
    AuthRejected(String),

    /// Outbound message could not be encoded for this link
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl TransportError {
    pub fn is_not_connected(&self) -> bool {
        matches!(self, TransportError::NotConnected)
    }

    /// Errors after which the underlying link can no longer be trusted
    ///
    /// A timed-out write may have left part of a frame on the link, so
    /// `Timeout` counts as well.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, TransportError::IoFailure(_) | TransportError::Timeout)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => TransportError::Timeout,
            std::io::ErrorKind::NotConnected => TransportError::NotConnected,
            _ => TransportError::IoFailure(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_error_mapping() {
        let err: TransportError = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert!(matches!(err, TransportError::Timeout));
        assert!(err.is_link_failure());

        let err: TransportError = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(err.is_link_failure());
        assert!(!err.is_not_connected());

        assert!(!TransportError::NotConnected.is_link_failure());
        assert!(!TransportError::AuthRejected("denied".into()).is_link_failure());
    }
}
