//! SQLite file backing the key-value tables.
//!
//! One connection serves every `kv_strings` and `kv_lists` operation; the
//! schema is brought up to date when the file is opened.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use kai_core::error::KaiError;

use crate::migrations;

/// Shared handle to the store's SQLite file.
///
/// Store calls are serialized on one connection, so a list append and the
/// length read that follows it see the same state.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the store file, creating it and its directory if needed, and
    /// apply pending schema versions.
    pub fn new(path: &Path) -> Result<Self, KaiError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| KaiError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -16384;",
        )
        .map_err(|e| KaiError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!(path = %path.display(), "Key-value store file opened");

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;

        Ok(db)
    }

    /// Store that lives only as long as this handle.
    pub fn in_memory() -> Result<Self, KaiError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| KaiError::Storage(format!("Failed to open in-memory db: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;

        Ok(db)
    }

    /// Run `f` with exclusive use of the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, KaiError>
    where
        F: FnOnce(&Connection) -> Result<T, KaiError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| KaiError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}
