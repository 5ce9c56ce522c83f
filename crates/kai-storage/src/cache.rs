//! Reply cache keyed by the normalized user message.

use std::sync::Arc;
use std::time::Duration;

use kai_core::error::KaiError;

use crate::kv::KvStore;

/// Normalize a raw message into its cache identity: trimmed and lower-cased.
///
/// Distinct inputs that normalize identically share one cache entry.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Key of the cache entry for a raw message.
pub fn cache_key(raw: &str) -> String {
    format!("cache:{}", normalize(raw))
}

/// Full-reply cache with a fixed time-to-live.
#[derive(Clone)]
pub struct ResponseCache {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// Previously generated reply for this message, if still live.
    pub fn lookup(&self, raw_message: &str) -> Result<Option<String>, KaiError> {
        self.kv.get(&cache_key(raw_message))
    }

    /// Store a reply, overwriting any existing entry (last write wins).
    pub fn store(&self, raw_message: &str, reply: &str) -> Result<(), KaiError> {
        self.kv.set(&cache_key(raw_message), reply, Some(self.ttl))
    }
}
