//! Schema migrations.
//!
//! The applied version lives in `PRAGMA user_version`. Steps only move
//! forward; an index written by a newer build must be rebuilt from the chain.

use rusqlite::Connection;

use crate::{schema, DbError, Result, SCHEMA_VERSION};

/// `(version, sql)` pairs, applied in order to reach [`SCHEMA_VERSION`].
const STEPS: &[(u32, &str)] = &[(1, schema::SCHEMA_V1), (2, schema::SCHEMA_V2)];

/// Bring `conn` up to [`SCHEMA_VERSION`].
pub fn run(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if current > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "index schema v{current} is newer than supported v{SCHEMA_VERSION}"
        )));
    }

    for &(version, sql) in STEPS.iter().filter(|(version, _)| *version > current) {
        tracing::info!(from = current, to = version, "migrating claim index schema");
        conn.execute_batch(sql)?;
        conn.pragma_update(None, "user_version", version)?;
    }

    let reached: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if reached != SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "no migration path from v{reached} to v{SCHEMA_VERSION}"
        )));
    }
    Ok(())
}
