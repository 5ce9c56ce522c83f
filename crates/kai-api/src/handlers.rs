//! Route handler functions for all API endpoints.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use tokio_stream::StreamExt;

use kai_core::types::{ChatRequest, IpLogEntry, StreamEvent};

use crate::client_ip::extract_client_ip;
use crate::error::ApiError;
use crate::state::AppState;

pub const ROOT_BANNER: &str = "Kaï Backend Running";

/// GET / - liveness text.
pub async fn root() -> &'static str {
    ROOT_BANNER
}

/// POST /chat/stream - run one chat turn as an SSE stream.
///
/// Rejects a missing or empty message with 400 before any stream opens.
/// Every later failure is reported inside the stream.
pub async fn chat_stream(
    State(state): State<AppState>,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let peer = peer.map(|Extension(ConnectInfo(addr))| addr);
    let client_ip = extract_client_ip(&headers, peer);

    let turn = state.dispatcher.dispatch(request, &client_ip)?;
    tracing::info!(session_id = %turn.session_id(), client_ip = %client_ip, "Chat stream opened");

    let events = turn.map(|event| Ok::<_, Infallible>(sse_event(&event)));
    let sse = Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)));

    Ok(([(header::CONNECTION, "keep-alive")], sse))
}

fn sse_event(event: &StreamEvent) -> Event {
    let data = event.to_json().unwrap_or_default();
    Event::default().data(data)
}

/// GET /admin/recent-ips - the most recent IP log entries, oldest first.
pub async fn recent_ips(State(state): State<AppState>) -> Result<Json<Vec<IpLogEntry>>, ApiError> {
    let entries = state.ip_log.recent(state.recent_ips_limit)?;
    Ok(Json(entries))
}
