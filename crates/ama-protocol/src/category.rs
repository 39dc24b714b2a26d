//! Notification categories.
//!
//! A category tells a subscriber how to apply the accompanying value to its
//! local view of the room.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of state change a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Category {
    /// A question was posted to the room.
    QuestionCreated,
    /// A question received one more reaction.
    QuestionReactionIncrease,
    /// A question lost a reaction.
    QuestionReactionDecrease,
    /// A question was marked as answered.
    QuestionAnswered,
}

impl Category {
    /// All known categories.
    pub const ALL: [Category; 4] = [
        Category::QuestionCreated,
        Category::QuestionReactionIncrease,
        Category::QuestionReactionDecrease,
        Category::QuestionAnswered,
    ];

    /// The wire name of this category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Category::QuestionCreated => "question_created",
            Category::QuestionReactionIncrease => "question_reaction_increase",
            Category::QuestionReactionDecrease => "question_reaction_decrease",
            Category::QuestionAnswered => "question_answered",
        }
    }

    /// Whether `count` carries a reaction tally for this category.
    #[must_use]
    pub const fn is_reaction(self) -> bool {
        matches!(
            self,
            Category::QuestionReactionIncrease | Category::QuestionReactionDecrease
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or("Unknown notification category")
    }
}
