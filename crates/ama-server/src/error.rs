//! HTTP error responses.

use crate::store::StoreError;
use ama_core::RoomIdError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid room ID")]
    InvalidRoomId,
    #[error("Invalid question ID")]
    InvalidQuestionId,
    #[error("{0}")]
    BadRequest(String),
    #[error("Room not found")]
    RoomNotFound,
    #[error("Question not found")]
    QuestionNotFound,
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::InvalidRoomId => (StatusCode::BAD_REQUEST, "INVALID_ROOM_ID"),
            ApiError::InvalidQuestionId => (StatusCode::BAD_REQUEST, "INVALID_QUESTION_ID"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::RoomNotFound => (StatusCode::NOT_FOUND, "ROOM_NOT_FOUND"),
            ApiError::QuestionNotFound => (StatusCode::NOT_FOUND, "QUESTION_NOT_FOUND"),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<RoomIdError> for ApiError {
    fn from(_: RoomIdError) -> Self {
        ApiError::InvalidRoomId
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RoomNotFound(_) => ApiError::RoomNotFound,
            StoreError::QuestionNotFound(_) => ApiError::QuestionNotFound,
            StoreError::Invalid(message) => ApiError::BadRequest(message.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        error!(error = %err, "Failed to serialize response");
        ApiError::Internal
    }
}
