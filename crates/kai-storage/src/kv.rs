//! Key-value store abstraction and its SQLite implementation.
//!
//! The store exposes the small command set the chat pipeline needs:
//! expiring strings (`get`, `set`) and ordered lists (`rpush`, `lrange`,
//! `ltrim`). List ranges are inclusive and accept negative indices counted
//! from the tail, so `-1` is the last element.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use kai_core::error::KaiError;

use crate::db::Database;

/// Durable key-value operations shared by memory, cache, and IP log.
pub trait KvStore: Send + Sync {
    /// Read a string value. Expired or missing keys yield `None`.
    fn get(&self, key: &str) -> Result<Option<String>, KaiError>;

    /// Write a string value, replacing any previous value and expiry.
    /// `ttl = None` stores the value without expiry.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KaiError>;

    /// Append to the tail of a list. Returns the new list length.
    fn rpush(&self, key: &str, value: &str) -> Result<u64, KaiError>;

    /// Read the inclusive range `start..=stop` of a list.
    fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, KaiError>;

    /// Keep only the inclusive range `start..=stop` of a list.
    fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), KaiError>;

    /// Delete every expired string. Returns the number of rows removed.
    fn purge_expired(&self) -> Result<usize, KaiError>;
}

/// Resolve an inclusive, possibly negative index range against a list of
/// `len` elements into `(offset, count)`. Returns `None` for an empty range.
pub fn resolve_range(len: u64, start: i64, stop: i64) -> Option<(u64, u64)> {
    let len = len as i64;
    let mut start = if start < 0 { start + len } else { start };
    let mut stop = if stop < 0 { stop + len } else { stop };
    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as u64, (stop - start + 1) as u64))
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// `KvStore` backed by the SQLite `Database`.
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    db: Arc<Database>,
}

impl SqliteKvStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Convenience constructor over a fresh in-memory database.
    pub fn in_memory() -> Result<Self, KaiError> {
        Ok(Self::new(Arc::new(Database::in_memory()?)))
    }

    fn list_len(conn: &rusqlite::Connection, key: &str) -> Result<u64, KaiError> {
        let len: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM kv_lists WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .map_err(|e| KaiError::Storage(format!("List length query failed: {}", e)))?;
        Ok(len as u64)
    }
}

impl KvStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, KaiError> {
        self.db.with_conn(|conn| {
            let row: Option<(String, Option<i64>)> = conn
                .query_row(
                    "SELECT value, expires_at FROM kv_strings WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| KaiError::Storage(format!("Get failed: {}", e)))?;

            match row {
                Some((_, Some(expires_at))) if expires_at <= now_millis() => {
                    conn.execute(
                        "DELETE FROM kv_strings WHERE key = ?1 AND expires_at <= ?2",
                        params![key, expires_at],
                    )
                    .map_err(|e| KaiError::Storage(format!("Expire failed: {}", e)))?;
                    debug!(key, "Expired key removed on read");
                    Ok(None)
                }
                Some((value, _)) => Ok(Some(value)),
                None => Ok(None),
            }
        })
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KaiError> {
        let expires_at = ttl.map(|ttl| now_millis().saturating_add(ttl.as_millis() as i64));
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_strings (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                expires_at = excluded.expires_at",
                params![key, value, expires_at],
            )
            .map_err(|e| KaiError::Storage(format!("Set failed: {}", e)))?;
            Ok(())
        })
    }

    fn rpush(&self, key: &str, value: &str) -> Result<u64, KaiError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_lists (key, seq, value)
                 VALUES (?1, (SELECT COALESCE(MAX(seq), 0) + 1 FROM kv_lists WHERE key = ?1), ?2)",
                params![key, value],
            )
            .map_err(|e| KaiError::Storage(format!("Push failed: {}", e)))?;
            Self::list_len(conn, key)
        })
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, KaiError> {
        self.db.with_conn(|conn| {
            let len = Self::list_len(conn, key)?;
            let Some((offset, count)) = resolve_range(len, start, stop) else {
                return Ok(Vec::new());
            };

            let mut stmt = conn
                .prepare(
                    "SELECT value FROM kv_lists WHERE key = ?1
                     ORDER BY seq ASC LIMIT ?2 OFFSET ?3",
                )
                .map_err(|e| KaiError::Storage(format!("Range prepare failed: {}", e)))?;
            let rows = stmt
                .query_map(params![key, count as i64, offset as i64], |row| row.get(0))
                .map_err(|e| KaiError::Storage(format!("Range query failed: {}", e)))?;

            rows.collect::<Result<Vec<String>, _>>()
                .map_err(|e| KaiError::Storage(format!("Range row failed: {}", e)))
        })
    }

    fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), KaiError> {
        self.db.with_conn(|conn| {
            let len = Self::list_len(conn, key)?;
            let result = match resolve_range(len, start, stop) {
                Some((offset, count)) => conn.execute(
                    "DELETE FROM kv_lists WHERE key = ?1 AND seq NOT IN (
                         SELECT seq FROM kv_lists WHERE key = ?1
                         ORDER BY seq ASC LIMIT ?2 OFFSET ?3
                     )",
                    params![key, count as i64, offset as i64],
                ),
                None => conn.execute("DELETE FROM kv_lists WHERE key = ?1", params![key]),
            };
            result.map_err(|e| KaiError::Storage(format!("Trim failed: {}", e)))?;
            Ok(())
        })
    }

    fn purge_expired(&self) -> Result<usize, KaiError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM kv_strings WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now_millis()],
            )
            .map_err(|e| KaiError::Storage(format!("Purge failed: {}", e)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteKvStore {
        SqliteKvStore::in_memory().unwrap()
    }

    fn push_all(store: &SqliteKvStore, key: &str, values: &[&str]) {
        for v in values {
            store.rpush(key, v).unwrap();
        }
    }

    // ---- Range resolution ----

    #[test]
    fn test_resolve_range_full_list() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 5)));
    }

    #[test]
    fn test_resolve_range_tail() {
        assert_eq!(resolve_range(10, -8, -1), Some((2, 8)));
        // Asking for more than exists clamps to the whole list.
        assert_eq!(resolve_range(3, -8, -1), Some((0, 3)));
    }

    #[test]
    fn test_resolve_range_empty_cases() {
        assert_eq!(resolve_range(0, 0, -1), None);
        assert_eq!(resolve_range(5, 3, 1), None);
        assert_eq!(resolve_range(5, 7, 9), None);
        assert_eq!(resolve_range(5, 0, -6), None);
    }

    #[test]
    fn test_resolve_range_stop_past_end() {
        assert_eq!(resolve_range(4, 1, 100), Some((1, 3)));
    }

    // ---- Strings ----

    #[test]
    fn test_get_missing_key() {
        assert_eq!(store().get("nope").unwrap(), None);
    }

    #[test]
    fn test_set_and_get() {
        let s = store();
        s.set("cache:hi", "hello there", None).unwrap();
        assert_eq!(s.get("cache:hi").unwrap().as_deref(), Some("hello there"));
    }

    #[test]
    fn test_set_overwrites() {
        let s = store();
        s.set("k", "one", None).unwrap();
        s.set("k", "two", Some(Duration::from_secs(60))).unwrap();
        assert_eq!(s.get("k").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn test_zero_ttl_is_immediately_absent() {
        let s = store();
        s.set("k", "v", Some(Duration::ZERO)).unwrap();
        assert_eq!(s.get("k").unwrap(), None);
    }

    #[test]
    fn test_long_ttl_is_present() {
        let s = store();
        s.set("k", "v", Some(Duration::from_secs(86_400))).unwrap();
        assert_eq!(s.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_set_without_ttl_clears_previous_expiry() {
        let s = store();
        s.set("k", "v1", Some(Duration::ZERO)).unwrap();
        s.set("k", "v2", None).unwrap();
        assert_eq!(s.get("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn test_purge_expired() {
        let s = store();
        s.set("a", "1", Some(Duration::ZERO)).unwrap();
        s.set("b", "2", Some(Duration::ZERO)).unwrap();
        s.set("c", "3", Some(Duration::from_secs(3600))).unwrap();
        s.set("d", "4", None).unwrap();

        assert_eq!(s.purge_expired().unwrap(), 2);
        assert_eq!(s.get("c").unwrap().as_deref(), Some("3"));
        assert_eq!(s.get("d").unwrap().as_deref(), Some("4"));
    }

    // ---- Lists ----

    #[test]
    fn test_rpush_returns_length() {
        let s = store();
        assert_eq!(s.rpush("l", "a").unwrap(), 1);
        assert_eq!(s.rpush("l", "b").unwrap(), 2);
        assert_eq!(s.rpush("other", "x").unwrap(), 1);
    }

    #[test]
    fn test_lrange_preserves_order() {
        let s = store();
        push_all(&s, "l", &["a", "b", "c", "d"]);
        assert_eq!(s.lrange("l", 0, -1).unwrap(), vec!["a", "b", "c", "d"]);
        assert_eq!(s.lrange("l", 1, 2).unwrap(), vec!["b", "c"]);
        assert_eq!(s.lrange("l", -2, -1).unwrap(), vec!["c", "d"]);
    }

    #[test]
    fn test_lrange_missing_list_is_empty() {
        assert!(store().lrange("none", 0, -1).unwrap().is_empty());
    }

    #[test]
    fn test_ltrim_keeps_tail() {
        let s = store();
        push_all(&s, "l", &["1", "2", "3", "4", "5"]);
        s.ltrim("l", -3, -1).unwrap();
        assert_eq!(s.lrange("l", 0, -1).unwrap(), vec!["3", "4", "5"]);

        // Appending after a trim keeps chronological order.
        s.rpush("l", "6").unwrap();
        assert_eq!(s.lrange("l", 0, -1).unwrap(), vec!["3", "4", "5", "6"]);
    }

    #[test]
    fn test_ltrim_shorter_than_range_is_noop() {
        let s = store();
        push_all(&s, "l", &["a", "b"]);
        s.ltrim("l", -8, -1).unwrap();
        assert_eq!(s.lrange("l", 0, -1).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_ltrim_empty_range_deletes_list() {
        let s = store();
        push_all(&s, "l", &["a", "b"]);
        s.ltrim("l", 5, 10).unwrap();
        assert!(s.lrange("l", 0, -1).unwrap().is_empty());
    }

    #[test]
    fn test_ltrim_only_touches_its_key() {
        let s = store();
        push_all(&s, "l1", &["a", "b", "c"]);
        push_all(&s, "l2", &["x", "y", "z"]);
        s.ltrim("l1", -1, -1).unwrap();
        assert_eq!(s.lrange("l1", 0, -1).unwrap(), vec!["c"]);
        assert_eq!(s.lrange("l2", 0, -1).unwrap(), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kai.db");
        {
            let s = SqliteKvStore::new(Arc::new(Database::new(&path).unwrap()));
            s.set("k", "v", None).unwrap();
            s.rpush("l", "a").unwrap();
        }
        let s = SqliteKvStore::new(Arc::new(Database::new(&path).unwrap()));
        assert_eq!(s.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(s.lrange("l", 0, -1).unwrap(), vec!["a"]);
    }
}
