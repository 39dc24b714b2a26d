//! Transport abstraction traits for AMA.
//!
//! The server pushes notifications to subscribers through [`Connection`],
//! which keeps the broadcaster independent of the concrete socket type.

use ama_protocol::{codec, Notification};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Identifies one connection in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a random connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0.simple())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ama_protocol::ProtocolError),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// The server side of one subscriber's persistent connection.
///
/// Implementations must be usable through a shared reference: the session
/// that owns the connection and any number of concurrent broadcasts hold it
/// at the same time.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Encode and send a notification.
    async fn send(&self, notification: &Notification) -> Result<(), TransportError> {
        let data = codec::encode(notification)?;
        self.send_raw(data).await
    }

    /// Send an already encoded notification.
    ///
    /// A broadcast encodes once and hands the same bytes to every subscriber.
    async fn send_raw(&self, data: Bytes) -> Result<(), TransportError>;

    /// Close the connection. Closing twice is not an error.
    async fn close(&self) -> Result<(), TransportError>;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_ne!(a, b);
        assert_ne!(a.as_uuid(), b.as_uuid());
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::generate();
        let shown = id.to_string();
        assert!(shown.starts_with("conn_"));
        assert_eq!(shown.len(), "conn_".len() + 32);
    }
}
