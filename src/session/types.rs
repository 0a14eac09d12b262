//! Conversation data model
//!
//! Messages, source references and archived history entries, plus the
//! generation token that ties in-flight updates to the turn they belong to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::service::ServiceMode;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking questions
    User,
    /// The backend answering them
    Assistant,
}

/// A source cited by an answer
///
/// `citation` is a locator: a page number for document retrieval, a URL
/// for web search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Human readable title of the source
    pub title: String,
    /// Page number or URL
    pub citation: String,
}

impl Reference {
    /// Build a reference from a title and a locator
    pub fn new(title: impl Into<String>, citation: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            citation: citation.into(),
        }
    }
}

/// One turn of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who wrote the message
    pub role: Role,
    /// Message text; grows while an assistant turn streams
    pub content: String,
    /// Service that generated an assistant turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceMode>,
    /// Sources cited by an assistant turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<Reference>>,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use qastream::session::{Message, Role};
    ///
    /// let msg = Message::user("What is the closing price of ACME?");
    /// assert_eq!(msg.role, Role::User);
    /// assert!(msg.references.is_none());
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            service: None,
            references: None,
        }
    }

    /// Creates an empty assistant turn tagged with the generating service
    pub fn assistant_turn(service: ServiceMode) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            service: Some(service),
            references: None,
        }
    }

    /// Merge a partial update into this message
    pub fn apply(&mut self, patch: MessagePatch) {
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(references) = patch.references {
            self.references = Some(references);
        }
    }
}

/// Partial update for the last message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    /// Replacement content (the full cumulative text, not a delta)
    pub content: Option<String>,
    /// Replacement reference list
    pub references: Option<Vec<Reference>>,
}

impl MessagePatch {
    /// Patch that replaces the content
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            references: None,
        }
    }

    /// Patch that replaces the references
    pub fn references(references: Vec<Reference>) -> Self {
        Self {
            content: None,
            references: Some(references),
        }
    }
}

/// An archived, re-selectable conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Session id
    pub id: String,
    /// The question that produced the final answer; used as the entry label
    pub input: String,
    /// When the entry was archived or last updated
    pub timestamp: DateTime<Utc>,
    /// Full message list at archive time
    pub messages: Vec<Message>,
}

impl HistoryEntry {
    /// Snapshot `messages` under `id`
    ///
    /// The seed input is the message before the final reply, or empty when
    /// the session holds fewer than two messages.
    pub fn snapshot(id: impl Into<String>, messages: Vec<Message>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            input: seed_input(&messages),
            timestamp,
            messages,
        }
    }
}

/// Text of the message preceding the final reply
pub fn seed_input(messages: &[Message]) -> String {
    messages
        .len()
        .checked_sub(2)
        .and_then(|i| messages.get(i))
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

/// Identifies one generation (one assistant turn)
///
/// Minted by the reducer when an assistant turn is opened; content and
/// reference updates must present the token of the currently open turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenerationToken(u64);

impl GenerationToken {
    /// Wrap a raw generation number
    pub fn new(n: u64) -> Self {
        Self(n)
    }

    /// Raw generation number
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for GenerationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_turn_starts_empty() {
        let msg = Message::assistant_turn(ServiceMode::Rag);
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.content.is_empty());
        assert_eq!(msg.service, Some(ServiceMode::Rag));
    }

    #[test]
    fn test_apply_patch_merges_fields() {
        let mut msg = Message::assistant_turn(ServiceMode::Search);
        msg.apply(MessagePatch::content("Hello"));
        msg.apply(MessagePatch::references(vec![Reference::new("Doc", "p.1")]));
        assert_eq!(msg.content, "Hello");
        assert_eq!(msg.references.as_ref().unwrap().len(), 1);

        msg.apply(MessagePatch::content("Hello!"));
        assert_eq!(msg.content, "Hello!");
        assert!(msg.references.is_some());
    }

    #[test]
    fn test_seed_input_uses_message_before_reply() {
        let messages = vec![
            Message::user("first"),
            Message::assistant_turn(ServiceMode::Tools),
            Message::user("second"),
            Message::assistant_turn(ServiceMode::Tools),
        ];
        assert_eq!(seed_input(&messages), "second");
        assert_eq!(seed_input(&messages[..1]), "");
        assert_eq!(seed_input(&[]), "");
    }

    #[test]
    fn test_message_serialization_shape() {
        let mut msg = Message::assistant_turn(ServiceMode::Rag);
        msg.content = "answer".into();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["service"], "rag");
        assert!(json.get("references").is_none());
    }

    #[test]
    fn test_generation_token_display() {
        assert_eq!(GenerationToken::new(7).to_string(), "gen-7");
    }
}
