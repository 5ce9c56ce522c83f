//! Per-session rolling conversation memory.
//!
//! Each session owns a list `mem:<sessionId>` of JSON-encoded
//! `MemoryEntry` values, trimmed after every append so that only the most
//! recent `limit` entries survive.

use std::sync::Arc;

use kai_core::error::KaiError;
use kai_core::types::{MemoryEntry, Role};

use crate::kv::KvStore;

/// Key of the memory list for a session.
pub fn memory_key(session_id: &str) -> String {
    format!("mem:{}", session_id)
}

/// Bounded, ordered message log per session.
#[derive(Clone)]
pub struct SessionMemory {
    kv: Arc<dyn KvStore>,
    limit: usize,
}

impl SessionMemory {
    /// Create a memory manager that keeps at most `limit` entries (minimum 1).
    pub fn new(kv: Arc<dyn KvStore>, limit: usize) -> Self {
        Self {
            kv,
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Read the full history for a session, oldest first.
    ///
    /// A session that has never been written returns an empty history.
    pub fn get_memory(&self, session_id: &str) -> Result<Vec<MemoryEntry>, KaiError> {
        self.kv
            .lrange(&memory_key(session_id), 0, -1)?
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(KaiError::from))
            .collect()
    }

    /// Append one entry and evict the oldest entries beyond the limit.
    pub fn save_memory(&self, session_id: &str, role: Role, text: &str) -> Result<(), KaiError> {
        let key = memory_key(session_id);
        let encoded = serde_json::to_string(&MemoryEntry::new(role, text))?;
        self.kv.rpush(&key, &encoded)?;
        self.kv.ltrim(&key, -(self.limit as i64), -1)
    }
}
