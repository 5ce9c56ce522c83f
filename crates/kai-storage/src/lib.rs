//! Kai storage crate - SQLite-backed key-value store and the chat state
//! built on top of it.
//!
//! Provides a WAL-mode SQLite database with migrations, a `KvStore` with
//! expiring strings and ordered lists, and the session memory, response
//! cache, and IP log that the chat pipeline reads and writes.

pub mod cache;
pub mod db;
pub mod ip_log;
pub mod kv;
pub mod memory;
pub mod migrations;

pub use cache::{normalize, ResponseCache};
pub use db::Database;
pub use ip_log::IpLog;
pub use kv::{KvStore, SqliteKvStore};
pub use memory::SessionMemory;
