//! Append-only log of client addresses per session.
//!
//! Entries go to the list `ips` (never trimmed) and the most recent address
//! of each session is kept under `session_ip:<sessionId>`.

use std::sync::Arc;

use chrono::Utc;

use kai_core::error::KaiError;
use kai_core::types::IpLogEntry;

use crate::kv::KvStore;

pub const IP_LOG_KEY: &str = "ips";

pub fn session_ip_key(session_id: &str) -> String {
    format!("session_ip:{}", session_id)
}

#[derive(Clone)]
pub struct IpLog {
    kv: Arc<dyn KvStore>,
}

impl IpLog {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Append an entry for `ip` and remember it as the session's address.
    pub fn record(&self, ip: &str, session_id: &str) -> Result<IpLogEntry, KaiError> {
        let entry = IpLogEntry {
            ip: ip.to_string(),
            session_id: session_id.to_string(),
            ts: Utc::now(),
        };
        self.kv
            .rpush(IP_LOG_KEY, &serde_json::to_string(&entry)?)?;
        if !session_id.is_empty() {
            self.kv.set(&session_ip_key(session_id), ip, None)?;
        }
        Ok(entry)
    }

    /// The last `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<IpLogEntry>, KaiError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.kv
            .lrange(IP_LOG_KEY, -(limit as i64), -1)?
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(KaiError::from))
            .collect()
    }

    /// Last recorded address of a session.
    pub fn session_ip(&self, session_id: &str) -> Result<Option<String>, KaiError> {
        self.kv.get(&session_ip_key(session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::SqliteKvStore;

    fn log() -> IpLog {
        IpLog::new(Arc::new(SqliteKvStore::in_memory().unwrap()))
    }

    #[test]
    fn test_record_and_recent() {
        let log = log();
        log.record("1.1.1.1", "a").unwrap();
        log.record("2.2.2.2", "b").unwrap();

        let recent = log.recent(50).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].ip, "1.1.1.1");
        assert_eq!(recent[0].session_id, "a");
        assert_eq!(recent[1].ip, "2.2.2.2");
    }

    #[test]
    fn test_recent_returns_last_n() {
        let log = log();
        for i in 0..60 {
            log.record(&format!("10.0.0.{}", i), "s").unwrap();
        }
        let recent = log.recent(50).unwrap();
        assert_eq!(recent.len(), 50);
        assert_eq!(recent[0].ip, "10.0.0.10");
        assert_eq!(recent[49].ip, "10.0.0.59");
    }

    #[test]
    fn test_log_is_never_trimmed() {
        let log = log();
        for _ in 0..120 {
            log.record("127.0.0.1", "s").unwrap();
        }
        assert_eq!(log.recent(500).unwrap().len(), 120);
    }

    #[test]
    fn test_session_ip_tracks_latest() {
        let log = log();
        log.record("1.1.1.1", "s").unwrap();
        log.record("9.9.9.9", "s").unwrap();
        assert_eq!(log.session_ip("s").unwrap().as_deref(), Some("9.9.9.9"));
        assert_eq!(log.session_ip("other").unwrap(), None);
    }

    #[test]
    fn test_recent_zero_limit() {
        let log = log();
        log.record("1.1.1.1", "s").unwrap();
        assert!(log.recent(0).unwrap().is_empty());
    }
}
