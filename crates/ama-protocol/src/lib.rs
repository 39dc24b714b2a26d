//! # ama-protocol
//!
//! Wire schema for the notifications AMA pushes to room subscribers.
//!
//! Every notification is a single JSON text frame of the shape
//!
//! ```text
//! { "category": <string>, "value": { "id": <string>, "text": <string>, "count": <integer> } }
//! ```
//!
//! The room a notification belongs to is a routing concern of the server and is
//! never part of the payload.
//!
//! ## Example
//!
//! ```rust
//! use ama_protocol::{codec, Notification};
//!
//! let notification = Notification::question_created("q1", "hi");
//! let encoded = codec::encode(&notification).unwrap();
//! assert_eq!(
//!     &encoded[..],
//!     br#"{"category":"question_created","value":{"id":"q1","text":"hi","count":0}}"#
//! );
//! ```

pub mod category;
pub mod codec;
pub mod notification;

pub use category::Category;
pub use codec::{decode, encode, ProtocolError};
pub use notification::{Notification, QuestionValue};
