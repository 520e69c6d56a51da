//! Chat data model shared by the store, the backends and the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a chat session.
pub type SessionId = Uuid;
/// Unique identifier for a message.
pub type MessageId = Uuid;

/// Title given to sessions before their first message.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";
/// Number of characters of the first user message used as the session title.
pub const TITLE_MAX_CHARS: usize = 30;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Speaker role for a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
            Role::System => "system",
        }
    }
}

/// Concrete backend that serves a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Cloud,
    Local,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Cloud => f.write_str("cloud"),
            BackendKind::Local => f.write_str("local"),
        }
    }
}

/// Message content, tagged by whether a response is still streaming into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Partial text of a response that is still streaming.
    Pending(String),
    /// Committed text; never changes again.
    Final(String),
}

impl MessageBody {
    pub fn text(&self) -> &str {
        match self {
            MessageBody::Pending(text) | MessageBody::Final(text) => text,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, MessageBody::Pending(_))
    }
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "MessageRecord", into = "MessageRecord")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub body: MessageBody,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
    pub is_error: bool,
}

impl Message {
    /// Build a committed user message stamped with the current time.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            body: MessageBody::Final(content.into()),
            timestamp: now_millis(),
            is_error: false,
        }
    }

    /// Build a committed model message.
    pub fn model(id: MessageId, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id,
            role: Role::Model,
            body: MessageBody::Final(content.into()),
            timestamp,
            is_error: false,
        }
    }

    /// Build the visible record of a failed turn.
    pub fn error(detail: impl fmt::Display) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Model,
            body: MessageBody::Final(format!("Error: {detail}")),
            timestamp: now_millis(),
            is_error: true,
        }
    }

    pub fn content(&self) -> &str {
        self.body.text()
    }
}

/// On-disk shape of a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRecord {
    id: MessageId,
    role: Role,
    content: String,
    timestamp: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    is_error: bool,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            role: record.role,
            body: MessageBody::Final(record.content),
            timestamp: record.timestamp,
            is_error: record.is_error,
        }
    }
}

impl From<Message> for MessageRecord {
    fn from(message: Message) -> Self {
        let content = match message.body {
            MessageBody::Pending(text) | MessageBody::Final(text) => text,
        };
        Self {
            id: message.id,
            role: message.role,
            content,
            timestamp: message.timestamp,
            is_error: message.is_error,
        }
    }
}

/// A conversation and its transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: SessionId,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ChatSession {
    /// Create an empty session titled "New Chat".
    pub fn new(now: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: DEFAULT_SESSION_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a user message, deriving the title when it is the first one.
    pub fn push_user_message(&mut self, message: Message) {
        if self.messages.is_empty() {
            self.title = derive_title(message.content());
        }
        self.push_message(message);
    }

    /// Append any message and refresh `updated_at`.
    pub fn push_message(&mut self, message: Message) {
        self.updated_at = self.updated_at.max(message.timestamp);
        self.messages.push(message);
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    /// Fold one streamed delta into the response message `response_id`.
    ///
    /// The first delta appends a pending model message; later deltas grow it
    /// in place.
    pub fn with_delta(mut self, response_id: MessageId, delta: &str, now: i64) -> Self {
        self.apply_delta(response_id, delta, now);
        self
    }

    /// In-place form of [`ChatSession::with_delta`].
    pub fn apply_delta(&mut self, response_id: MessageId, delta: &str, now: i64) {
        if let Some(last) = self.messages.last_mut()
            && last.id == response_id
            && let MessageBody::Pending(text) = &mut last.body
        {
            text.push_str(delta);
            return;
        }
        self.push_message(Message {
            id: response_id,
            role: Role::Model,
            body: MessageBody::Pending(delta.to_string()),
            timestamp: now,
            is_error: false,
        });
    }

    /// Freeze a pending response message, returning whether one was found.
    pub fn finalize_message(&mut self, response_id: MessageId) -> bool {
        let Some(message) = self
            .messages
            .iter_mut()
            .find(|message| message.id == response_id)
        else {
            return false;
        };
        if let MessageBody::Pending(text) = &mut message.body {
            message.body = MessageBody::Final(std::mem::take(text));
        }
        true
    }

    /// Replace the message with the same id, or append it.
    pub fn upsert_message(&mut self, message: Message) {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => self.push_message(message),
        }
    }
}

/// First `TITLE_MAX_CHARS` characters of the message.
pub fn derive_title(content: &str) -> String {
    content.chars().take(TITLE_MAX_CHARS).collect()
}

/// Sort sessions most recently updated first.
pub fn sort_by_recency(sessions: &mut [ChatSession]) {
    sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}
