//! # ama-core
//!
//! Live-update core for AMA rooms.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Registry** - Which subscribers are listening to which room
//! - **Session** - One subscriber connection's lifecycle
//! - **Broadcaster** - Fan-out of an event to a room, evicting dead peers
//! - **Dispatcher** - Bounded queue and worker pool in front of the broadcaster
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  register/unregister  ┌─────────────┐
//! │   Session   │──────────────────────▶│  Registry   │
//! └─────────────┘                       └─────────────┘
//!        ▲                                     │ snapshot
//!        │ cancel (eviction)                   ▼
//! ┌─────────────┐      events         ┌─────────────────┐
//! │ Broadcaster │◀────────────────────│   Dispatcher    │◀── Notifier::notify
//! └─────────────┘                     └─────────────────┘
//! ```

pub mod broadcaster;
pub mod dispatcher;
pub mod event;
pub mod registry;
pub mod room;
pub mod session;
pub mod subscriber;

pub use broadcaster::{BroadcastObserver, BroadcastReport, Broadcaster, BroadcasterConfig};
pub use dispatcher::{Dispatcher, DispatcherConfig, Notifier, NotifyError};
pub use event::Event;
pub use registry::{Registry, RegistryConfig, RegistryStats};
pub use room::{RoomId, RoomIdError};
pub use session::{CloseReason, Session, SessionError, SessionState};
pub use subscriber::{Subscriber, SubscriberId};
