//! Subscriber handles.
//!
//! A [`Subscriber`] is what the registry stores for one live connection: the
//! connection itself plus the token that ends its session. Handles are cheap
//! to clone and every clone cancels the same session.

use ama_transport::{Connection, ConnectionId, TransportError};
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique subscriber identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocate the next identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

/// A handle to one live subscription.
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    connection: Arc<dyn Connection>,
    token: CancellationToken,
}

impl Subscriber {
    /// Create a subscriber with its own root token.
    #[must_use]
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self::with_token(connection, CancellationToken::new())
    }

    /// Create a subscriber whose session ends when `token` is cancelled.
    ///
    /// Pass a child of a process-wide token to have shutdown reach every
    /// session.
    #[must_use]
    pub fn with_token(connection: Arc<dyn Connection>, token: CancellationToken) -> Self {
        Self {
            id: SubscriberId::next(),
            connection,
            token,
        }
    }

    /// Get the subscriber ID.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Get the underlying connection's ID.
    #[must_use]
    pub fn connection_id(&self) -> &ConnectionId {
        self.connection.id()
    }

    /// Get the underlying connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Push an encoded notification to this subscriber.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the write fails.
    pub async fn deliver(&self, data: Bytes) -> Result<(), TransportError> {
        self.connection.send_raw(data).await
    }

    /// End this subscriber's session. Safe to call any number of times.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the session has been told to end.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the session has been told to end.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscriber {}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("connection", self.connection.id())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
