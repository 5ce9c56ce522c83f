//! Database schema migrations.
//!
//! Applies the key-value schema: expiring strings, ordered lists, and the
//! schema_migrations tracking table.

use rusqlite::Connection;
use tracing::info;

use kai_core::error::KaiError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), KaiError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| KaiError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| KaiError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: key_value_schema");
    }

    Ok(())
}

/// Version 1: string and list keyspaces.
fn apply_v1(conn: &Connection) -> Result<(), KaiError> {
    conn.execute_batch(
        "
        -- String values with optional expiry (unix epoch milliseconds).
        CREATE TABLE IF NOT EXISTS kv_strings (
            key         TEXT PRIMARY KEY NOT NULL,
            value       TEXT NOT NULL,
            expires_at  INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_kv_strings_expires_at
            ON kv_strings (expires_at)
            WHERE expires_at IS NOT NULL;

        -- List elements, ordered by seq within each key.
        CREATE TABLE IF NOT EXISTS kv_lists (
            key         TEXT NOT NULL,
            seq         INTEGER NOT NULL,
            value       TEXT NOT NULL,
            PRIMARY KEY (key, seq)
        );

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'key_value_schema');
        ",
    )
    .map_err(|e| KaiError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
