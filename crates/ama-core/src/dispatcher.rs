//! Bounded notification dispatch.
//!
//! Producers hand events to a [`Notifier`], which enqueues them without ever
//! waiting. A fixed pool of worker tasks drains the queue and runs the
//! broadcaster, so a burst of writes cannot spawn unbounded fan-out work. When
//! the queue is full the event is dropped, which is consistent with
//! best-effort delivery.

use crate::broadcaster::Broadcaster;
use crate::event::Event;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of worker tasks running broadcasts.
    pub workers: usize,
    /// Events that may wait for a worker before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

/// Notify errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    /// The queue is full; the event was dropped.
    #[error("Notification queue is full")]
    QueueFull,

    /// The dispatcher has stopped.
    #[error("Notification dispatcher is closed")]
    Closed,
}

/// Producer-side handle for queueing events.
#[derive(Clone)]
pub struct Notifier {
    sender: mpsc::Sender<Event>,
}

impl Notifier {
    /// Create a notifier and the queue it feeds.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Queue an event for broadcast. Never waits.
    ///
    /// Call this only after the write the event describes has succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue is full or the dispatcher has stopped.
    /// The event is dropped in both cases.
    pub fn notify(&self, event: Event) -> Result<(), NotifyError> {
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(event) => {
                warn!(
                    room = %event.room_id,
                    category = %event.category(),
                    "Notification queue full, dropping event"
                );
                NotifyError::QueueFull
            }
            TrySendError::Closed(_) => NotifyError::Closed,
        })
    }

    /// Free slots in the queue.
    #[must_use]
    pub fn available(&self) -> usize {
        self.sender.capacity()
    }
}

/// The worker pool draining a [`Notifier`]'s queue.
pub struct Dispatcher {
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Start the worker pool.
    ///
    /// Workers stop when `shutdown` is cancelled or every [`Notifier`] has
    /// been dropped.
    #[must_use]
    pub fn spawn(
        broadcaster: Arc<Broadcaster>,
        config: DispatcherConfig,
        shutdown: CancellationToken,
    ) -> (Notifier, Self) {
        let (notifier, receiver) = Notifier::channel(config.queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let worker_count = config.workers.max(1);

        let workers = (0..worker_count)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&broadcaster),
                    Arc::clone(&receiver),
                    shutdown.clone(),
                ))
            })
            .collect();

        info!(
            workers = worker_count,
            queue_capacity = config.queue_capacity,
            "Notification dispatcher started"
        );

        (notifier, Self { workers })
    }

    /// Number of worker tasks.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to stop.
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Dispatcher worker failed");
            }
        }
        info!("Notification dispatcher stopped");
    }
}

async fn run_worker(
    worker: usize,
    broadcaster: Arc<Broadcaster>,
    receiver: Arc<Mutex<mpsc::Receiver<Event>>>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;

            _ = shutdown.cancelled() => None,
            event = async { receiver.lock().await.recv().await } => event,
        };

        let Some(event) = next else {
            break;
        };

        broadcaster.broadcast(&event).await;
    }

    debug!(worker, "Dispatcher worker stopped");
}
