//! Events handed to the broadcaster.

use crate::room::RoomId;
use ama_protocol::{Category, Notification};

/// A notification together with the room it is routed to.
///
/// The room is only a routing key; subscribers receive the notification alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Target room.
    pub room_id: RoomId,
    /// What subscribers receive.
    pub notification: Notification,
}

impl Event {
    /// Create a new event.
    #[must_use]
    pub fn new(room_id: RoomId, notification: Notification) -> Self {
        Self {
            room_id,
            notification,
        }
    }

    /// Get the event's category.
    #[must_use]
    pub fn category(&self) -> Category {
        self.notification.category
    }

    /// A question was created in `room_id`.
    #[must_use]
    pub fn question_created(
        room_id: RoomId,
        question_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(room_id, Notification::question_created(question_id, text))
    }

    /// A question's reaction tally went up.
    #[must_use]
    pub fn reaction_increased(room_id: RoomId, question_id: impl Into<String>, count: i64) -> Self {
        Self::new(room_id, Notification::reaction_increased(question_id, count))
    }

    /// A question's reaction tally went down.
    #[must_use]
    pub fn reaction_decreased(room_id: RoomId, question_id: impl Into<String>, count: i64) -> Self {
        Self::new(room_id, Notification::reaction_decreased(question_id, count))
    }

    /// A question was marked as answered.
    #[must_use]
    pub fn question_answered(
        room_id: RoomId,
        question_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(room_id, Notification::question_answered(question_id, text))
    }
}
