//! Error types for the chat client.

/// Errors from talking to a Kaï backend.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request could not be sent or the response never arrived.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("server responded with status {0}")]
    Status(u16),
    /// The event stream broke after it had started.
    #[error("stream interrupted: {0}")]
    Stream(String),
}
