//! The locally displayed conversation.

use serde::Serialize;

/// Who wrote a message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

impl Author {
    /// Short label used when replaying history.
    pub fn label(&self) -> &'static str {
        match self {
            Author::User => "You",
            Author::Assistant => "Assistant",
        }
    }
}

/// One committed message; immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    author: Author,
    text: String,
}

impl Message {
    pub fn new(author: Author, text: impl Into<String>) -> Self {
        Self {
            author,
            text: text.into(),
        }
    }

    pub fn author(&self) -> Author {
        self.author
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Ordered list of committed messages.
///
/// Messages can only be appended, and the only removal is clearing the
/// whole transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one user/assistant exchange.
    pub fn push_exchange(&mut self, user_text: impl Into<String>, assistant_text: impl Into<String>) {
        self.messages.push(Message::new(Author::User, user_text));
        self.messages.push(Message::new(Author::Assistant, assistant_text));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of completed exchanges.
    pub fn exchange_count(&self) -> usize {
        self.messages.len() / 2
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
