//! WebSocket transport implementation.
//!
//! This module adapts an upgraded axum [`WebSocket`] to the [`Connection`]
//! trait. The socket is split: the sink becomes the shared
//! [`WebSocketConnection`], the stream becomes a [`PeerStream`] whose only job
//! is to notice the peer going away.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::traits::{Connection, ConnectionId, TransportError};

/// The send half of an upgraded WebSocket.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WebSocket, Message>>,
    remote_addr: Option<SocketAddr>,
    is_open: AtomicBool,
}

/// The receive half of an upgraded WebSocket.
pub struct PeerStream {
    id: ConnectionId,
    stream: SplitStream<WebSocket>,
}

/// How the peer side of a WebSocket ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerClose {
    /// The peer sent a close frame.
    CloseFrame,
    /// The stream ended without a close frame.
    Ended,
    /// Reading failed.
    Error(String),
}

impl WebSocketConnection {
    /// Split an upgraded socket into its shared send half and its read half.
    #[must_use]
    pub fn split(socket: WebSocket, remote_addr: Option<SocketAddr>) -> (Arc<Self>, PeerStream) {
        let id = ConnectionId::generate();
        let (sink, stream) = socket.split();

        let conn = Arc::new(Self {
            id,
            sink: Mutex::new(sink),
            remote_addr,
            is_open: AtomicBool::new(true),
        });

        (conn, PeerStream { id, stream })
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn send_raw(&self, data: Bytes) -> Result<(), TransportError> {
        if !self.is_open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let text = String::from_utf8(data.to_vec())
            .map_err(|e| TransportError::Other(format!("Notification is not UTF-8: {}", e)))?;

        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text)).await.map_err(|e| {
            self.is_open.store(false, Ordering::SeqCst);
            TransportError::SendFailed(e.to_string())
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return Ok(()); // Already closed
        }

        let mut sink = self.sink.lock().await;
        sink.close()
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.map(|addr| addr.to_string())
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }
}

impl PeerStream {
    /// Get the ID of the connection this stream belongs to.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Read until the peer goes away.
    ///
    /// The channel is push-only: application messages from the client are
    /// discarded. Pings are answered by the underlying socket.
    pub async fn closed(mut self) -> PeerClose {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Close(_))) => {
                    debug!(connection = %self.id, "Received close frame");
                    return PeerClose::CloseFrame;
                }
                Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                    trace!(connection = %self.id, "Ignoring inbound message");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    warn!(connection = %self.id, error = %e, "WebSocket error");
                    return PeerClose::Error(e.to_string());
                }
                None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    return PeerClose::Ended;
                }
            }
        }
    }
}
