//! Conversation data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::{ChatMessage, Role};

/// One recorded message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// A chat thread with the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    /// Display name; assigned after the first exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub entries: Vec<ChatEntry>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            title: None,
            entries: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) -> &ChatEntry {
        self.entries.push(ChatEntry::new(role, content));
        &self.entries[self.entries.len() - 1]
    }

    /// Remove and return the newest entry.
    pub fn pop(&mut self) -> Option<ChatEntry> {
        self.entries.pop()
    }

    /// The last `limit` entries as request messages, oldest first.
    pub fn history(&self, limit: usize) -> Vec<ChatMessage> {
        let start = self.entries.len().saturating_sub(limit);
        self.entries[start..]
            .iter()
            .map(|e| ChatMessage {
                role: e.role,
                content: e.content.clone(),
            })
            .collect()
    }

    pub fn first_user_message(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.role == Role::User)
            .map(|e| e.content.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_limited_and_ordered() {
        let mut conv = Conversation::new();
        conv.push(Role::User, "one");
        conv.push(Role::Assistant, "two");
        conv.push(Role::User, "three");

        let history = conv.history(2);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ChatMessage::assistant("two"));
        assert_eq!(history[1], ChatMessage::user("three"));

        assert_eq!(conv.history(10).len(), 3);
    }

    #[test]
    fn first_user_message_and_counts() {
        let mut conv = Conversation::new();
        assert!(conv.first_user_message().is_none());
        conv.push(Role::User, "plan my week");
        conv.push(Role::Assistant, "ok");
        conv.push(Role::User, "thanks");
        assert_eq!(conv.first_user_message(), Some("plan my week"));
        assert_eq!(conv.len(), 3);
    }

    #[test]
    fn pop_removes_newest() {
        let mut conv = Conversation::new();
        conv.push(Role::User, "a");
        conv.push(Role::User, "b");
        assert_eq!(conv.pop().unwrap().content, "b");
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn serde_roundtrip_keeps_title() {
        let mut conv = Conversation::new();
        conv.title = Some("Weekly plan".into());
        conv.push(Role::User, "hi");
        let json = serde_json::to_string(&conv).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        let parsed: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Weekly plan"));
        assert_eq!(parsed.entries.len(), 1);
    }
}
