//! Room and question storage.
//!
//! Handlers talk to storage through [`RoomStore`]. The server ships with
//! [`MemoryStore`], which keeps everything in process memory and loses it on
//! restart.

use ama_core::RoomId;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No room with this ID.
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    /// No question with this ID in the room.
    #[error("Question not found: {0}")]
    QuestionNotFound(Uuid),

    /// Rejected input.
    #[error("{0}")]
    Invalid(&'static str),
}

/// A room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    pub id: RoomId,
    pub theme: String,
    pub created_at: u64,
    pub updated_at: u64,
}

/// A question asked in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    pub id: Uuid,
    pub room_id: RoomId,
    pub text: String,
    pub reaction_count: i64,
    pub answered: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Persistence for rooms and their questions.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Create a room.
    async fn create_room(&self, theme: &str) -> Result<Room, StoreError>;

    /// List all rooms, oldest first.
    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError>;

    /// Get a room.
    async fn get_room(&self, room_id: &RoomId) -> Result<Room, StoreError>;

    /// Add a question to a room.
    async fn create_question(&self, room_id: &RoomId, text: &str) -> Result<Question, StoreError>;

    /// List a room's questions, oldest first.
    async fn list_questions(&self, room_id: &RoomId) -> Result<Vec<Question>, StoreError>;

    /// Get one question.
    async fn get_question(&self, room_id: &RoomId, question_id: Uuid)
        -> Result<Question, StoreError>;

    /// Add a reaction; returns the updated question.
    async fn react(&self, room_id: &RoomId, question_id: Uuid) -> Result<Question, StoreError>;

    /// Remove a reaction, never going below zero; returns the updated question.
    async fn unreact(&self, room_id: &RoomId, question_id: Uuid) -> Result<Question, StoreError>;

    /// Mark a question answered; returns the updated question.
    async fn mark_answered(&self, room_id: &RoomId, question_id: Uuid)
        -> Result<Question, StoreError>;
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

struct RoomEntry {
    room: Room,
    questions: Vec<Question>,
}

/// In-memory [`RoomStore`].
#[derive(Default)]
pub struct MemoryStore {
    rooms: DashMap<RoomId, RoomEntry>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn update_question<F>(
        &self,
        room_id: &RoomId,
        question_id: Uuid,
        apply: F,
    ) -> Result<Question, StoreError>
    where
        F: FnOnce(&mut Question),
    {
        let mut entry = self
            .rooms
            .get_mut(room_id)
            .ok_or(StoreError::RoomNotFound(*room_id))?;
        let question = entry
            .questions
            .iter_mut()
            .find(|q| q.id == question_id)
            .ok_or(StoreError::QuestionNotFound(question_id))?;

        apply(question);
        question.updated_at = now_millis();
        Ok(question.clone())
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn create_room(&self, theme: &str) -> Result<Room, StoreError> {
        let theme = theme.trim();
        if theme.is_empty() {
            return Err(StoreError::Invalid("Room theme cannot be empty"));
        }

        let now = now_millis();
        let room = Room {
            id: RoomId::new_v4(),
            theme: theme.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.rooms.insert(
            room.id,
            RoomEntry {
                room: room.clone(),
                questions: Vec::new(),
            },
        );

        debug!(room = %room.id, "Created room");
        Ok(room)
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|e| e.room.clone()).collect();
        rooms.sort_by_key(|room| room.created_at);
        Ok(rooms)
    }

    async fn get_room(&self, room_id: &RoomId) -> Result<Room, StoreError> {
        self.rooms
            .get(room_id)
            .map(|e| e.room.clone())
            .ok_or(StoreError::RoomNotFound(*room_id))
    }

    async fn create_question(&self, room_id: &RoomId, text: &str) -> Result<Question, StoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::Invalid("Question text cannot be empty"));
        }

        let mut entry = self
            .rooms
            .get_mut(room_id)
            .ok_or(StoreError::RoomNotFound(*room_id))?;

        let now = now_millis();
        let question = Question {
            id: Uuid::new_v4(),
            room_id: *room_id,
            text: text.to_string(),
            reaction_count: 0,
            answered: false,
            created_at: now,
            updated_at: now,
        };
        entry.questions.push(question.clone());

        debug!(room = %room_id, question = %question.id, "Created question");
        Ok(question)
    }

    async fn list_questions(&self, room_id: &RoomId) -> Result<Vec<Question>, StoreError> {
        self.rooms
            .get(room_id)
            .map(|e| e.questions.clone())
            .ok_or(StoreError::RoomNotFound(*room_id))
    }

    async fn get_question(
        &self,
        room_id: &RoomId,
        question_id: Uuid,
    ) -> Result<Question, StoreError> {
        let entry = self
            .rooms
            .get(room_id)
            .ok_or(StoreError::RoomNotFound(*room_id))?;
        entry
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .cloned()
            .ok_or(StoreError::QuestionNotFound(question_id))
    }

    async fn react(&self, room_id: &RoomId, question_id: Uuid) -> Result<Question, StoreError> {
        self.update_question(room_id, question_id, |q| q.reaction_count += 1)
    }

    async fn unreact(&self, room_id: &RoomId, question_id: Uuid) -> Result<Question, StoreError> {
        self.update_question(room_id, question_id, |q| {
            q.reaction_count = (q.reaction_count - 1).max(0);
        })
    }

    async fn mark_answered(
        &self,
        room_id: &RoomId,
        question_id: Uuid,
    ) -> Result<Question, StoreError> {
        self.update_question(room_id, question_id, |q| q.answered = true)
    }
}
