use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Conversation memory
// =============================================================================

/// Author of a memory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged message in a session's rolling history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub role: Role,
    pub text: String,
}

impl MemoryEntry {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

// =============================================================================
// IP log
// =============================================================================

/// A record of which network address sent a message for which session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpLogEntry {
    pub ip: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub ts: DateTime<Utc>,
}

// =============================================================================
// Chat request
// =============================================================================

/// Body of `POST /chat/stream`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(
        default,
        rename = "sessionId",
        skip_serializing_if = "Option::is_none"
    )]
    pub session_id: Option<String>,
}

// =============================================================================
// Stream events
// =============================================================================

/// Opaque message carried by the in-stream `error` event.
pub const STREAM_FAILED_MESSAGE: &str = "Streaming failed";

/// A single event delivered over the chat event stream.
///
/// A well-formed stream is one `Init`, any number of `Text`, then exactly
/// one of `Done` or `Error`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Init { ip: String, session_id: String },
    Text { chunk: String, session_id: String },
    Done,
    Error { message: String },
}

impl StreamEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }

    /// Encode as the JSON payload of a `data:` line.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&EventPayload::from(self))
    }

    /// Decode a `data:` line payload.
    ///
    /// Returns `None` when the text is not JSON or has no recognizable
    /// shape; callers skip such payloads.
    pub fn from_json(text: &str) -> Option<Self> {
        let payload: EventPayload = serde_json::from_str(text).ok()?;
        payload.into_event()
    }
}

/// Wire shape shared by every event payload.
///
/// Events are distinguished by which fields are present rather than by a
/// tag, e.g. `{"init":true,"ip":"…","sessionId":"…"}` or `{"done":true}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(
        default,
        rename = "sessionId",
        skip_serializing_if = "Option::is_none"
    )]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventPayload {
    /// Classify the payload, checking `init`, `text`, `done`, then `error`.
    pub fn into_event(self) -> Option<StreamEvent> {
        if self.init == Some(true) {
            return Some(StreamEvent::Init {
                ip: self.ip.unwrap_or_default(),
                session_id: self.session_id.unwrap_or_default(),
            });
        }
        if let Some(chunk) = self.text.filter(|t| !t.is_empty()) {
            return Some(StreamEvent::Text {
                chunk,
                session_id: self.session_id.unwrap_or_default(),
            });
        }
        if self.done == Some(true) {
            return Some(StreamEvent::Done);
        }
        self.error.map(|message| StreamEvent::Error { message })
    }
}

impl From<&StreamEvent> for EventPayload {
    fn from(event: &StreamEvent) -> Self {
        match event {
            StreamEvent::Init { ip, session_id } => EventPayload {
                init: Some(true),
                ip: Some(ip.clone()),
                session_id: Some(session_id.clone()),
                ..Default::default()
            },
            StreamEvent::Text { chunk, session_id } => EventPayload {
                text: Some(chunk.clone()),
                session_id: Some(session_id.clone()),
                ..Default::default()
            },
            StreamEvent::Done => EventPayload {
                done: Some(true),
                ..Default::default()
            },
            StreamEvent::Error { message } => EventPayload {
                error: Some(message.clone()),
                ..Default::default()
            },
        }
    }
}
