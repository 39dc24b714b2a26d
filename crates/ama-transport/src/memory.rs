//! In-process transport.
//!
//! A [`MemoryConnection`] hands every sent payload to its paired
//! [`MemoryPeer`]. Sends can be forced to fail or to hang, which makes it the
//! tool of choice for exercising eviction without real sockets.

use ama_protocol::{codec, Notification};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::trace;

use crate::traits::{Connection, ConnectionId, TransportError};

/// An in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    sender: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    is_open: AtomicBool,
    fail_sends: AtomicBool,
    stall_sends: AtomicBool,
    send_attempts: AtomicUsize,
}

/// The receiving end of a [`MemoryConnection`].
pub struct MemoryPeer {
    receiver: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryConnection {
    /// Create a connected pair.
    #[must_use]
    pub fn pair() -> (Arc<Self>, MemoryPeer) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let conn = Arc::new(Self {
            id: ConnectionId::generate(),
            sender: Mutex::new(Some(sender)),
            is_open: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            stall_sends: AtomicBool::new(false),
            send_attempts: AtomicUsize::new(0),
        });
        (conn, MemoryPeer { receiver })
    }

    /// Make every following send fail, as a dead socket would.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Make every following send hang forever, as a stalled peer would.
    pub fn stall_sends(&self) {
        self.stall_sends.store(true, Ordering::SeqCst);
    }

    /// Number of sends attempted on this connection, failed ones included.
    #[must_use]
    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn send_raw(&self, data: Bytes) -> Result<(), TransportError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);

        if self.stall_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("simulated failure".to_string()));
        }

        let guard = self.sender.lock().await;
        let Some(sender) = guard.as_ref() else {
            return Err(TransportError::ConnectionClosed);
        };

        trace!(connection = %self.id, bytes = data.len(), "Memory send");
        sender
            .send(data)
            .map_err(|_| TransportError::SendFailed("peer dropped".to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.is_open.store(false, Ordering::SeqCst);
        self.sender.lock().await.take();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }
}

impl MemoryPeer {
    /// Wait for the next payload. Returns `None` once the connection is closed
    /// and everything sent before has been received.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }

    /// Take the next payload if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.receiver.try_recv().ok()
    }

    /// Wait for the next payload and decode it.
    pub async fn recv_notification(&mut self) -> Option<Notification> {
        let data = self.recv().await?;
        codec::decode(&data).ok()
    }

    /// Drain every payload already waiting.
    pub fn drain(&mut self) -> Vec<Bytes> {
        let mut received = Vec::new();
        while let Some(data) = self.try_recv() {
            received.push(data);
        }
        received
    }
}
