//! Connection sessions.
//!
//! A session follows one subscriber connection through
//! `Connecting -> Upgraded -> Subscribed -> Closed`. While subscribed it parks
//! on its cancellation token; it wakes once, when the peer goes away, when a
//! failed delivery evicts it, or when the process shuts down. Leaving the
//! `Subscribed` state removes the subscriber from the registry exactly once,
//! including when the session is simply dropped.

use crate::registry::Registry;
use crate::room::RoomId;
use crate::subscriber::Subscriber;
use ama_transport::Connection;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Admitted, waiting for the protocol upgrade.
    Connecting,
    /// Upgraded, not yet registered.
    Upgraded,
    /// Registered and receiving events.
    Subscribed,
    /// Terminal.
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed the connection or its request went away.
    PeerClosed,
    /// A delivery to this subscriber failed.
    Evicted,
    /// The server is shutting down.
    Shutdown,
}

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The requested transition is not allowed from the current state.
    #[error("Invalid session transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Current state.
        from: SessionState,
        /// Requested state.
        to: SessionState,
    },
}

/// Removes the subscriber from the registry when dropped.
struct Registration {
    registry: Arc<Registry>,
    room_id: RoomId,
    subscriber: Subscriber,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.subscriber.cancel();
        self.registry.unregister(&self.room_id, self.subscriber.id());
    }
}

/// One subscriber connection's lifecycle.
pub struct Session {
    room_id: RoomId,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
    state: SessionState,
    connection: Option<Arc<dyn Connection>>,
    registration: Option<Registration>,
}

impl Session {
    /// Create a session for an admitted room.
    ///
    /// `shutdown` is the process-wide token; the subscriber's own token is
    /// derived from it.
    #[must_use]
    pub fn new(room_id: RoomId, registry: Arc<Registry>, shutdown: CancellationToken) -> Self {
        Self {
            room_id,
            registry,
            shutdown,
            state: SessionState::Connecting,
            connection: None,
            registration: None,
        }
    }

    /// Get the room this session observes.
    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get the subscriber handle while subscribed.
    #[must_use]
    pub fn subscriber(&self) -> Option<&Subscriber> {
        self.registration.as_ref().map(|r| &r.subscriber)
    }

    fn transition(&mut self, from: SessionState, to: SessionState) -> Result<(), SessionError> {
        if self.state != from {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Attach the upgraded connection.
    ///
    /// # Errors
    ///
    /// Returns an error unless the session is `Connecting`.
    pub fn upgraded(&mut self, connection: Arc<dyn Connection>) -> Result<(), SessionError> {
        self.transition(SessionState::Connecting, SessionState::Upgraded)?;
        debug!(room = %self.room_id, connection = %connection.id(), "Connection upgraded");
        self.connection = Some(connection);
        Ok(())
    }

    /// Register with the registry and start receiving events.
    ///
    /// # Errors
    ///
    /// Returns an error unless the session is `Upgraded`.
    pub fn subscribe(&mut self) -> Result<Subscriber, SessionError> {
        let connection = match (&self.state, &self.connection) {
            (SessionState::Upgraded, Some(connection)) => Arc::clone(connection),
            _ => {
                return Err(SessionError::InvalidTransition {
                    from: self.state,
                    to: SessionState::Subscribed,
                })
            }
        };

        let subscriber = Subscriber::with_token(connection, self.shutdown.child_token());
        self.registry.register(&self.room_id, subscriber.clone());
        self.registration = Some(Registration {
            registry: Arc::clone(&self.registry),
            room_id: self.room_id,
            subscriber: subscriber.clone(),
        });
        self.state = SessionState::Subscribed;

        let remote = subscriber.connection().remote_addr();
        info!(
            room = %self.room_id,
            subscriber = %subscriber.id(),
            remote = remote.as_deref().unwrap_or("unknown"),
            "New subscriber"
        );

        Ok(subscriber)
    }

    /// Park until the session ends, then close it.
    ///
    /// `peer_closed` resolves when the client side goes away. Nothing is
    /// polled in the meantime.
    ///
    /// # Errors
    ///
    /// Returns an error unless the session is `Subscribed`.
    pub async fn wait_closed<F>(&mut self, peer_closed: F) -> Result<CloseReason, SessionError>
    where
        F: Future + Send,
    {
        let subscriber = match (&self.state, &self.registration) {
            (SessionState::Subscribed, Some(registration)) => registration.subscriber.clone(),
            _ => {
                return Err(SessionError::InvalidTransition {
                    from: self.state,
                    to: SessionState::Closed,
                })
            }
        };

        let reason = tokio::select! {
            biased;

            _ = subscriber.cancelled() => {
                if self.shutdown.is_cancelled() {
                    CloseReason::Shutdown
                } else {
                    CloseReason::Evicted
                }
            }
            _ = peer_closed => CloseReason::PeerClosed,
        };

        self.close(reason).await;
        Ok(reason)
    }

    /// Attach, subscribe and park until closed.
    ///
    /// # Errors
    ///
    /// Returns an error unless the session is `Connecting`.
    pub async fn run<F>(
        mut self,
        connection: Arc<dyn Connection>,
        peer_closed: F,
    ) -> Result<CloseReason, SessionError>
    where
        F: Future + Send,
    {
        self.upgraded(connection)?;
        self.subscribe()?;
        self.wait_closed(peer_closed).await
    }

    async fn close(&mut self, reason: CloseReason) {
        self.state = SessionState::Closed;
        let subscriber_id = self.subscriber().map(Subscriber::id);

        // Dropping the registration cancels the token and unregisters.
        drop(self.registration.take());

        if reason != CloseReason::PeerClosed {
            if let Some(connection) = &self.connection {
                if let Err(e) = connection.close().await {
                    debug!(connection = %connection.id(), error = %e, "Close failed");
                }
            }
        }

        info!(
            room = %self.room_id,
            subscriber = ?subscriber_id,
            reason = ?reason,
            "Subscriber closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ama_transport::MemoryConnection;
    use tokio::sync::oneshot;

    fn session(registry: &Arc<Registry>, shutdown: &CancellationToken) -> (Session, RoomId) {
        let room = RoomId::new_v4();
        (
            Session::new(room, Arc::clone(registry), shutdown.clone()),
            room,
        )
    }

    #[test]
    fn test_transitions() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let (mut session, room) = session(&registry, &shutdown);
        let (conn, _peer) = MemoryConnection::pair();

        assert_eq!(session.state(), SessionState::Connecting);
        assert!(session.subscribe().is_err());

        session.upgraded(conn.clone()).unwrap();
        assert_eq!(session.state(), SessionState::Upgraded);
        assert!(session.upgraded(conn).is_err());
        assert_eq!(registry.subscriber_count(&room), 0);

        let subscriber = session.subscribe().unwrap();
        assert_eq!(session.state(), SessionState::Subscribed);
        assert!(registry.contains(&room, subscriber.id()));
        assert!(session.subscribe().is_err());
    }

    #[tokio::test]
    async fn test_wait_closed_requires_subscription() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let (mut session, _room) = session(&registry, &shutdown);

        assert!(matches!(
            session.wait_closed(async {}).await,
            Err(SessionError::InvalidTransition {
                from: SessionState::Connecting,
                to: SessionState::Closed,
            })
        ));
    }

    #[tokio::test]
    async fn test_eviction_closes_and_unregisters() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let (mut session, room) = session(&registry, &shutdown);
        let (conn, mut peer) = MemoryConnection::pair();

        session.upgraded(conn.clone()).unwrap();
        let subscriber = session.subscribe().unwrap();

        let task = tokio::spawn(async move {
            let reason = session.wait_closed(std::future::pending::<()>()).await;
            (reason.unwrap(), session.state())
        });

        subscriber.cancel();
        subscriber.cancel();

        let (reason, state) = task.await.unwrap();
        assert_eq!(reason, CloseReason::Evicted);
        assert_eq!(state, SessionState::Closed);
        assert!(!registry.contains(&room, subscriber.id()));
        assert!(!conn.is_open());
        assert!(peer.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_peer_close_unregisters() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let (session, room) = session(&registry, &shutdown);
        let (conn, _peer) = MemoryConnection::pair();
        let (closed_tx, closed_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(session.run(conn.clone(), closed_rx));

        while registry.subscriber_count(&room) == 0 {
            tokio::task::yield_now().await;
        }
        closed_tx.send(()).unwrap();

        assert_eq!(task.await.unwrap().unwrap(), CloseReason::PeerClosed);
        assert_eq!(registry.subscriber_count(&room), 0);
        assert!(registry.snapshot(&room).is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_reaches_session() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let (mut session, room) = session(&registry, &shutdown);
        let (conn, _peer) = MemoryConnection::pair();

        session.upgraded(conn.clone()).unwrap();
        session.subscribe().unwrap();
        let task = tokio::spawn(async move {
            session
                .wait_closed(std::future::pending::<()>())
                .await
                .unwrap()
        });

        shutdown.cancel();

        assert_eq!(task.await.unwrap(), CloseReason::Shutdown);
        assert_eq!(registry.subscriber_count(&room), 0);
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_eviction_racing_peer_close() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let (mut session, room) = session(&registry, &shutdown);
        let (conn, _peer) = MemoryConnection::pair();

        session.upgraded(conn).unwrap();
        let subscriber = session.subscribe().unwrap();

        // Broadcaster evicts while the peer is already gone.
        subscriber.cancel();
        assert!(registry.unregister(&room, subscriber.id()));

        let reason = session.wait_closed(async {}).await.unwrap();
        assert_eq!(reason, CloseReason::Evicted);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!registry.unregister(&room, subscriber.id()));
    }

    #[tokio::test]
    async fn test_aborted_session_unregisters() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let (mut session, room) = session(&registry, &shutdown);
        let (conn, _peer) = MemoryConnection::pair();

        session.upgraded(conn).unwrap();
        let subscriber = session.subscribe().unwrap();
        let task = tokio::spawn(async move {
            let _ = session.wait_closed(std::future::pending::<()>()).await;
        });
        tokio::task::yield_now().await;

        task.abort();
        let _ = task.await;

        assert!(!registry.contains(&room, subscriber.id()));
        assert!(subscriber.is_cancelled());
    }

    #[test]
    fn test_dropped_session_unregisters() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let (mut session, room) = session(&registry, &shutdown);
        let (conn, _peer) = MemoryConnection::pair();

        session.upgraded(conn).unwrap();
        session.subscribe().unwrap();
        assert_eq!(registry.subscriber_count(&room), 1);

        drop(session);
        assert_eq!(registry.subscriber_count(&room), 0);
    }
}
