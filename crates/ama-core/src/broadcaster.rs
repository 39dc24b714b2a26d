//! Room fan-out.
//!
//! The broadcaster delivers one event to every subscriber registered for its
//! room at the moment of the call. Delivery is best-effort and at most once:
//! a failed or timed-out write evicts the subscriber, nothing is retried, and
//! an event for a room without subscribers is simply dropped.

use crate::event::Event;
use crate::registry::Registry;
use crate::room::RoomId;
use crate::subscriber::Subscriber;
use ama_protocol::codec;
use bytes::Bytes;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Default time a single delivery may take before the subscriber is evicted.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Broadcaster configuration.
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Upper bound for one delivery; a slower write counts as failed.
    pub send_timeout: Duration,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers a delivery was attempted to.
    pub attempted: usize,
    /// Deliveries that succeeded.
    pub delivered: usize,
    /// Subscribers evicted because their delivery failed.
    pub evicted: usize,
}

/// Receives the outcome of every broadcast.
pub trait BroadcastObserver: Send + Sync {
    /// Called after each broadcast completes.
    fn on_broadcast(&self, event: &Event, report: &BroadcastReport, elapsed: Duration);
}

/// Delivers events to the subscribers of their room.
pub struct Broadcaster {
    registry: Arc<Registry>,
    config: BroadcasterConfig,
    observer: Option<Arc<dyn BroadcastObserver>>,
}

impl Broadcaster {
    /// Create a broadcaster with default configuration.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_config(registry, BroadcasterConfig::default())
    }

    /// Create a broadcaster with custom configuration.
    #[must_use]
    pub fn with_config(registry: Arc<Registry>, config: BroadcasterConfig) -> Self {
        Self {
            registry,
            config,
            observer: None,
        }
    }

    /// Attach an observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn BroadcastObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get the registry this broadcaster reads from.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Deliver `event` to every current subscriber of its room.
    ///
    /// Deliveries run concurrently and independently. Subscribers whose
    /// delivery fails are cancelled and removed from the registry before this
    /// returns.
    pub async fn broadcast(&self, event: &Event) -> BroadcastReport {
        let start = Instant::now();
        let report = self.fan_out(event).await;

        if let Some(observer) = &self.observer {
            observer.on_broadcast(event, &report, start.elapsed());
        }

        report
    }

    async fn fan_out(&self, event: &Event) -> BroadcastReport {
        let subscribers = self.registry.snapshot(&event.room_id);
        if subscribers.is_empty() {
            trace!(room = %event.room_id, category = %event.category(), "No subscribers");
            return BroadcastReport::default();
        }

        let data = match codec::encode(&event.notification) {
            Ok(data) => data,
            Err(e) => {
                warn!(room = %event.room_id, error = %e, "Failed to encode notification");
                return BroadcastReport::default();
            }
        };

        let outcomes = join_all(
            subscribers
                .iter()
                .map(|subscriber| self.deliver(&event.room_id, subscriber, data.clone())),
        )
        .await;

        let delivered = outcomes.iter().filter(|ok| **ok).count();
        let report = BroadcastReport {
            attempted: subscribers.len(),
            delivered,
            evicted: subscribers.len() - delivered,
        };

        trace!(
            room = %event.room_id,
            category = %event.category(),
            delivered = report.delivered,
            evicted = report.evicted,
            "Broadcast complete"
        );

        report
    }

    /// Returns whether the delivery succeeded; evicts on failure.
    async fn deliver(&self, room_id: &RoomId, subscriber: &Subscriber, data: Bytes) -> bool {
        let error = match tokio::time::timeout(self.config.send_timeout, subscriber.deliver(data))
            .await
        {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("send timed out after {:?}", self.config.send_timeout),
        };

        warn!(
            room = %room_id,
            subscriber = %subscriber.id(),
            connection = %subscriber.connection_id(),
            error = %error,
            "Failed to send message to subscriber"
        );
        self.evict(room_id, subscriber);
        false
    }

    fn evict(&self, room_id: &RoomId, subscriber: &Subscriber) {
        subscriber.cancel();
        self.registry.unregister(room_id, subscriber.id());
    }
}
