//! Notification payloads.

use crate::category::Category;
use serde::{Deserialize, Serialize};

/// The value carried by every question notification.
///
/// `count` is only meaningful for reaction categories, where it holds the
/// tally after the change. `text` carries the question text for created and
/// answered notifications.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestionValue {
    /// Question identifier.
    pub id: String,
    /// Human-readable summary.
    #[serde(default)]
    pub text: String,
    /// Reaction tally.
    #[serde(default)]
    pub count: i64,
}

/// A notification as sent to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// What happened.
    pub category: Category,
    /// Category-specific value.
    pub value: QuestionValue,
}

impl Notification {
    /// Create a notification.
    #[must_use]
    pub fn new(category: Category, value: QuestionValue) -> Self {
        Self { category, value }
    }

    /// A question was created.
    #[must_use]
    pub fn question_created(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            Category::QuestionCreated,
            QuestionValue {
                id: id.into(),
                text: text.into(),
                count: 0,
            },
        )
    }

    /// A question's reaction tally went up to `count`.
    #[must_use]
    pub fn reaction_increased(id: impl Into<String>, count: i64) -> Self {
        Self::new(
            Category::QuestionReactionIncrease,
            QuestionValue {
                id: id.into(),
                text: String::new(),
                count,
            },
        )
    }

    /// A question's reaction tally went down to `count`.
    #[must_use]
    pub fn reaction_decreased(id: impl Into<String>, count: i64) -> Self {
        Self::new(
            Category::QuestionReactionDecrease,
            QuestionValue {
                id: id.into(),
                text: String::new(),
                count,
            },
        )
    }

    /// A question was marked as answered.
    #[must_use]
    pub fn question_answered(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            Category::QuestionAnswered,
            QuestionValue {
                id: id.into(),
                text: text.into(),
                count: 0,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_category() {
        assert_eq!(
            Notification::question_created("q", "t").category,
            Category::QuestionCreated
        );
        assert_eq!(
            Notification::reaction_increased("q", 3).category,
            Category::QuestionReactionIncrease
        );
        assert_eq!(
            Notification::reaction_decreased("q", 2).category,
            Category::QuestionReactionDecrease
        );
        assert_eq!(
            Notification::question_answered("q", "t").category,
            Category::QuestionAnswered
        );
    }

    #[test]
    fn test_reaction_carries_count() {
        let notification = Notification::reaction_increased("q1", 7);
        assert_eq!(notification.value.count, 7);
        assert!(notification.value.text.is_empty());
    }
}
