//! Error types for the chat pipeline.

use kai_core::error::KaiError;

/// Errors from a chat turn.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The request carried no message. Rejected before any stream opens.
    #[error("message cannot be empty")]
    EmptyMessage,
    /// The generation provider failed or returned an unusable response.
    #[error("gateway error: {0}")]
    Gateway(String),
    /// A cache, memory, or log operation failed.
    #[error("storage error: {0}")]
    Storage(String),
    /// The client side of the event stream is gone.
    #[error("event stream closed")]
    StreamClosed,
}

impl From<KaiError> for ChatError {
    fn from(err: KaiError) -> Self {
        match err {
            KaiError::Gateway(msg) => ChatError::Gateway(msg),
            other => ChatError::Storage(other.to_string()),
        }
    }
}
