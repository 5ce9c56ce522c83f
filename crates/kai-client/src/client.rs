//! HTTP client for `POST /chat/stream`.

use std::ops::ControlFlow;

use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::consumer::{parse_payload, ChatView, FrameDecoder, Payload};
use crate::error::ClientError;

#[derive(Debug, Serialize)]
struct StreamRequest<'a> {
    message: &'a str,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

/// Sends chat turns to a Kaï backend and feeds the replies into a `ChatView`.
#[derive(Clone, Debug)]
pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Run one turn.
    ///
    /// Blank input is a no-op. On a non-success status the view gets the
    /// server error message and `ClientError::Status` is returned. Reading
    /// stops at `done`; if the stream ends first, typing is cleared anyway.
    pub async fn send(&self, view: &mut ChatView, input: &str) -> Result<(), ClientError> {
        let Some(message) = view.begin_send(input) else {
            return Ok(());
        };

        let body = StreamRequest {
            message: &message,
            session_id: view.session_id(),
        };
        let response = match self
            .client
            .post(format!("{}/chat/stream", self.base_url))
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                view.finish();
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Chat request rejected");
            view.server_error();
            return Err(ClientError::Status(status.as_u16()));
        }

        let mut decoder = FrameDecoder::new();
        let mut bytes = response.bytes_stream();
        while let Some(read) = bytes.next().await {
            let chunk = match read {
                Ok(chunk) => chunk,
                Err(e) => {
                    view.finish();
                    return Err(ClientError::Stream(e.to_string()));
                }
            };
            for payload in decoder.push(&chunk) {
                let event = match parse_payload(&payload) {
                    Payload::Event(event) => event,
                    Payload::Ignored => {
                        debug!(payload = %payload, "Skipping unrecognized payload");
                        continue;
                    }
                };
                if let ControlFlow::Break(()) = view.apply(event) {
                    return Ok(());
                }
            }
        }

        view.finish();
        Ok(())
    }
}
