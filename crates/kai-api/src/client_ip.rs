//! Client address derivation for requests.

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Address reported when nothing identifies the caller.
pub const UNKNOWN_IP: &str = "unknown";

/// First `X-Forwarded-For` entry if present and non-empty, else the peer
/// address with any `::ffff:` mapping prefix removed, else `unknown`.
pub fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    match peer {
        Some(addr) => {
            let ip = addr.ip().to_string();
            match ip.strip_prefix("::ffff:") {
                Some(v4) => v4.to_string(),
                None => ip,
            }
        }
        None => UNKNOWN_IP.to_string(),
    }
}
