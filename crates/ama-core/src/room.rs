//! Room identifiers.
//!
//! Rooms are created and owned by the persistence layer; the core only routes
//! by their identifier, which must be a well-formed UUID.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error returned for a malformed room identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid room ID: {raw}")]
pub struct RoomIdError {
    raw: String,
}

/// A room identifier, the routing key for subscriptions and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(Uuid);

impl RoomId {
    /// Parse a room identifier from its textual form.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not a UUID.
    pub fn parse(raw: &str) -> Result<Self, RoomIdError> {
        Uuid::parse_str(raw).map(Self).map_err(|_| RoomIdError {
            raw: raw.to_string(),
        })
    }

    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RoomId {
    type Err = RoomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for RoomId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
