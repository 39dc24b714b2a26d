//! # ama-transport
//!
//! Transport abstraction layer for AMA room subscribers.
//!
//! The broadcaster only ever pushes pre-encoded notifications to a
//! connection and, on failure, closes it. This crate defines that narrow
//! interface and its implementations:
//!
//! - **WebSocket** - an upgraded axum socket, split into a send half shared
//!   with the broadcaster and a read half that only watches for the peer
//!   going away
//! - **Memory** - an in-process connection for tests and benchmarks, which
//!   can be told to fail or stall its sends
//!
//! ```rust,ignore
//! use ama_transport::Connection;
//!
//! async fn push(conn: &dyn Connection, data: bytes::Bytes) {
//!     if let Err(e) = conn.send_raw(data).await {
//!         tracing::warn!(connection = %conn.id(), error = %e, "Push failed");
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryConnection, MemoryPeer};
pub use traits::{Connection, ConnectionId, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{PeerClose, PeerStream, WebSocketConnection};
