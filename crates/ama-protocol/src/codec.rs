//! Codec for encoding and decoding AMA notifications.
//!
//! Notifications travel as one JSON document per WebSocket text frame, so no
//! length prefix or framing is needed beyond the transport's own.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::notification::Notification;

/// Maximum encoded notification size (64 KiB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Encoded message exceeds maximum size.
    #[error("Message size {0} exceeds maximum {MAX_MESSAGE_SIZE}")]
    MessageTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a notification to JSON bytes.
///
/// The result is shared between all recipients of a broadcast, so it is
/// returned as cheaply clonable [`Bytes`].
///
/// # Errors
///
/// Returns an error if the notification is too large or serialization fails.
pub fn encode(notification: &Notification) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::with_capacity(128);
    encode_into(notification, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a notification into an existing buffer.
///
/// On error the buffer is left as it was.
///
/// # Errors
///
/// Returns an error if the notification is too large or serialization fails.
pub fn encode_into(notification: &Notification, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let payload = serde_json::to_vec(notification)?;

    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(payload.len()));
    }

    buf.reserve(payload.len());
    buf.put_slice(&payload);
    Ok(())
}

/// Decode a notification from JSON bytes.
///
/// # Errors
///
/// Returns an error if the data is too large or not a valid notification.
pub fn decode(data: &[u8]) -> Result<Notification, ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(data.len()));
    }

    Ok(serde_json::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Category, QuestionValue};

    #[test]
    fn test_encode_exact_wire_format() {
        let notification = Notification::question_created("q1", "hi");
        let encoded = encode(&notification).unwrap();
        assert_eq!(
            std::str::from_utf8(&encoded).unwrap(),
            r#"{"category":"question_created","value":{"id":"q1","text":"hi","count":0}}"#
        );
    }

    #[test]
    fn test_encode_reaction() {
        let encoded = encode(&Notification::reaction_decreased("q9", 4)).unwrap();
        assert_eq!(
            std::str::from_utf8(&encoded).unwrap(),
            r#"{"category":"question_reaction_decrease","value":{"id":"q9","text":"","count":4}}"#
        );
    }

    #[test]
    fn test_decode_client_payload() {
        let decoded =
            decode(br#"{"category":"question_answered","value":{"id":"q2","text":"why?"}}"#)
                .unwrap();
        assert_eq!(decoded.category, Category::QuestionAnswered);
        assert_eq!(
            decoded.value,
            QuestionValue {
                id: "q2".to_string(),
                text: "why?".to_string(),
                count: 0,
            }
        );
    }

    #[test]
    fn test_decode_unknown_category() {
        match decode(br#"{"category":"message_created","value":{"id":"x"}}"#) {
            Err(ProtocolError::Json(_)) => {}
            other => panic!("Expected Json error, got {:?}", other),
        }
    }

    #[test]
    fn test_message_too_large() {
        let notification = Notification::question_created("q", "a".repeat(MAX_MESSAGE_SIZE));

        match encode(&notification) {
            Err(ProtocolError::MessageTooLarge(_)) => {}
            other => panic!("Expected MessageTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_into_appends() {
        let mut buf = BytesMut::new();
        encode_into(&Notification::question_created("a", ""), &mut buf).unwrap();
        let first_len = buf.len();
        encode_into(&Notification::question_answered("b", ""), &mut buf).unwrap();
        assert!(buf.len() > first_len);
        assert_eq!(decode(&buf[..first_len]).unwrap().value.id, "a");
    }
}
