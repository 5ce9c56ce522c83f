//! Client side of the Kaï chat stream.
//!
//! `FrameDecoder` turns raw response bytes into event payloads, `ChatView`
//! folds events into conversation state, and `ChatClient` wires both to an
//! HTTP request against `/chat/stream`.

pub mod client;
pub mod consumer;
pub mod error;

pub use client::ChatClient;
pub use consumer::{parse_payload, ChatMessage, ChatView, FrameDecoder, Payload, SERVER_ERROR_TEXT};
pub use error::ClientError;
