//! Application state shared across all route handlers.

use kai_chat::StreamDispatcher;
use kai_storage::IpLog;

/// Shared application state, passed to handlers via axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Runs chat turns.
    pub dispatcher: StreamDispatcher,
    /// Client address log, for the admin listing.
    pub ip_log: IpLog,
    /// How many entries `/admin/recent-ips` returns.
    pub recent_ips_limit: usize,
}

impl AppState {
    pub fn new(dispatcher: StreamDispatcher, recent_ips_limit: usize) -> Self {
        let ip_log = dispatcher.ip_log().clone();
        Self {
            dispatcher,
            ip_log,
            recent_ips_limit,
        }
    }
}
