use serde::{Deserialize, Serialize};

/// A single part of a content turn.
///
/// Only text parts are produced by this client. Parts of other kinds sent
/// back by the API (function calls, inline data) deserialize with `text`
/// unset and are ignored when assembling an answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    /// The text of this part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Set when the part carries the model's internal reasoning rather than answer text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

impl Part {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            thought: None,
        }
    }

    /// Returns true if this part is reasoning output rather than answer text.
    pub fn is_thought(&self) -> bool {
        self.thought.unwrap_or(false)
    }
}
