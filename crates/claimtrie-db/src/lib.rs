//! # claimtrie-db
//!
//! Storage layer for the claim trie index.
//!
//! ## Schema
//!
//! - WAL mode mandatory; one writer connection, many read-only readers
//! - Writer connections register the `shortest_id` aggregate used to build
//!   short and canonical URLs
//! - Reader connections enforce a per-query time budget via a progress handler
//! - Schema version stored in `PRAGMA user_version`
//! - Last applied block height kept in `sync_state`, written with each block

pub mod functions;
pub mod migrations;
pub mod queries;
pub mod rows;
pub mod schema;
pub mod search;

use std::path::Path;

use claimtrie_types::url::UrlError;
use rusqlite::{Connection, OpenFlags};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// Default SQLite page cache, in KiB.
pub const DEFAULT_CACHE_SIZE_KIB: u32 = 8000;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Parse(#[from] UrlError),

    #[error("query exceeded its time budget: {sql}")]
    QueryTimeout { sql: String },

    #[error("storage error executing {sql}: {source}")]
    Storage {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("reader task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the index database at the given path for writing.
///
/// Configures WAL mode, registers SQL functions and runs any pending
/// migrations.
pub fn open(path: &Path, cache_size_kib: u32) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn, cache_size_kib)?;
    functions::register(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn, DEFAULT_CACHE_SIZE_KIB)?;
    functions::register(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open a read-only connection to an existing index.
///
/// The writer must have created the schema already.
pub fn open_reader(path: &Path, cache_size_kib: u32) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI,
    )?;
    conn.execute_batch(&format!(
        "PRAGMA busy_timeout = 5000;
         PRAGMA cache_size = -{cache_size_kib};"
    ))?;
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version != SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "reader expects schema v{SCHEMA_VERSION}, found v{version}"
        )));
    }
    Ok(conn)
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection, cache_size_kib: u32) -> Result<()> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -{cache_size_kib};"
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory() {
        let conn = open_memory().expect("open in-memory db");
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("get user_version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_wal_mode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open(&dir.path().join("claims.db"), 1024).expect("open");
        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("get journal_mode");
        assert_eq!(mode, "wal");
    }

    #[test]
    fn test_reader_is_read_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("claims.db");
        let _writer = open(&path, 1024).expect("open writer");

        let reader = open_reader(&path, 1024).expect("open reader");
        let err = reader.execute("DELETE FROM claim", []);
        assert!(err.is_err());
    }

    #[test]
    fn test_reader_requires_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.db");
        Connection::open(&path).expect("create empty");

        assert!(matches!(
            open_reader(&path, 1024),
            Err(DbError::Migration(_))
        ));
    }
}
