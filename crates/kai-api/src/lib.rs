//! Kaï API crate - axum HTTP server, route handlers, SSE streaming.
//!
//! Serves the chat event stream, the liveness text, and the recent
//! client address log.

pub mod client_ip;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
