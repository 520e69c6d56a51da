//! Events published by the chat controller.

use crate::provider::Availability;
use crate::types::{BackendKind, MessageId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a turn.
pub type TurnId = Uuid;

/// Wrapper for events emitted by the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMsg {
    /// Unique id for the event.
    pub id: Uuid,
    /// Session the event concerns, when there is one.
    pub session_id: Option<SessionId>,
    pub created_at: DateTime<Utc>,
    pub payload: ChatEvent,
}

impl EventMsg {
    pub fn new(session_id: Option<SessionId>, payload: ChatEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            created_at: Utc::now(),
            payload,
        }
    }
}

/// All observable state changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum ChatEvent {
    /// The session list or the active session changed.
    SessionsChanged { active: Option<SessionId> },
    /// A turn was accepted and routed to a backend.
    TurnStarted {
        turn_id: TurnId,
        backend: BackendKind,
    },
    /// Streaming response delta.
    MessageDelta {
        turn_id: TurnId,
        message_id: MessageId,
        delta: String,
    },
    /// The full response was committed to the store.
    TurnCommitted {
        turn_id: TurnId,
        message_id: MessageId,
        content: String,
    },
    /// The turn ended with an error message appended to the session.
    TurnFailed { turn_id: TurnId, message: String },
    CapabilityChanged { availability: Availability },
    ConnectivityChanged { online: bool },
}

/// Sink interface for controller events.
pub trait EventSink: Send + Sync {
    /// Emit an event to downstream listeners.
    fn emit(&self, event: EventMsg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn payload_serializes_with_type_tag() {
        let turn_id = Uuid::nil();
        let event = ChatEvent::TurnStarted {
            turn_id,
            backend: BackendKind::Local,
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            value,
            json!({
                "type": "turn_started",
                "payload": {"turn_id": turn_id.to_string(), "backend": "local"}
            })
        );
    }
}
