//! Event stream decoding and conversation state.

use std::ops::ControlFlow;

use tracing::debug;

use kai_core::types::{Role, StreamEvent};

/// Assistant message shown when the server rejects a request.
pub const SERVER_ERROR_TEXT: &str = "Server error";

// =============================================================================
// Frame decoding
// =============================================================================

/// Incremental decoder for `text/event-stream` bodies.
///
/// Bytes may arrive split anywhere, including inside a multi-byte UTF-8
/// sequence or between the two newlines of a frame delimiter.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a blank line.
    buffer: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return the `data:` payloads of every frame they
    /// complete, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        self.decode_pending();

        let mut payloads = Vec::new();
        while let Some(idx) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..idx + 2).collect();
            for line in frame.trim().split('\n') {
                if let Some(rest) = line.strip_prefix("data:") {
                    payloads.push(rest.trim_start().to_string());
                }
            }
        }
        payloads
    }

    /// Move every complete UTF-8 sequence from `pending` into `buffer`.
    /// Invalid bytes become U+FFFD.
    fn decode_pending(&mut self) {
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                    }
                }
            }
        }
    }

    /// Text received but not yet closed by a blank line.
    pub fn remainder(&self) -> &str {
        &self.buffer
    }
}

/// Outcome of parsing one `data:` payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Event(StreamEvent),
    /// Not JSON, or JSON with no recognizable event shape. Skipped.
    Ignored,
}

pub fn parse_payload(text: &str) -> Payload {
    match StreamEvent::from_json(text) {
        Some(event) => Payload::Event(event),
        None => Payload::Ignored,
    }
}

// =============================================================================
// Conversation state
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: Role,
    pub text: String,
}

impl ChatMessage {
    fn new(sender: Role, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
        }
    }
}

/// Client-side conversation: the message list, typing indicator, session
/// identity, and the reply being assembled.
#[derive(Clone, Debug, Default)]
pub struct ChatView {
    messages: Vec<ChatMessage>,
    typing: bool,
    session_id: Option<String>,
    client_ip: Option<String>,
    reply: String,
}

impl ChatView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a known session, e.g. one persisted from an earlier run.
    pub fn with_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }

    /// Assistant text accumulated during the current turn.
    pub fn reply(&self) -> &str {
        &self.reply
    }

    /// Begin a turn with user input.
    ///
    /// Returns the trimmed message to send, or `None` for blank input, in
    /// which case nothing changes.
    pub fn begin_send(&mut self, input: &str) -> Option<String> {
        let text = input.trim();
        if text.is_empty() {
            return None;
        }
        self.messages.push(ChatMessage::new(Role::User, text));
        self.typing = true;
        self.reply.clear();
        Some(text.to_string())
    }

    /// Fold one event into the view. `Break` means stop reading the stream.
    pub fn apply(&mut self, event: StreamEvent) -> ControlFlow<()> {
        match event {
            StreamEvent::Init { ip, session_id } => {
                if !ip.is_empty() {
                    self.client_ip = Some(ip);
                }
                if self.session_id.is_none() && !session_id.is_empty() {
                    self.session_id = Some(session_id);
                }
            }
            StreamEvent::Text { chunk, .. } => {
                self.reply.push_str(&chunk);
                match self.messages.last_mut() {
                    Some(last) if last.sender == Role::Assistant => {
                        last.text.clone_from(&self.reply);
                    }
                    _ => self
                        .messages
                        .push(ChatMessage::new(Role::Assistant, self.reply.clone())),
                }
            }
            StreamEvent::Done => {
                self.typing = false;
                return ControlFlow::Break(());
            }
            StreamEvent::Error { message } => {
                debug!(message = %message, "Server reported a stream failure");
            }
        }
        ControlFlow::Continue(())
    }

    /// The server rejected the request outright.
    pub fn server_error(&mut self) {
        self.messages
            .push(ChatMessage::new(Role::Assistant, SERVER_ERROR_TEXT));
        self.typing = false;
    }

    /// The byte stream ended.
    pub fn finish(&mut self) {
        self.typing = false;
    }
}
