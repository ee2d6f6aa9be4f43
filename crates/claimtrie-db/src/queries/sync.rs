//! Height of the last applied block.

use rusqlite::{Connection, OptionalExtension};

use crate::Result;

/// The last applied height, or `None` for an index that has seen no block.
pub fn height(conn: &Connection) -> Result<Option<u32>> {
    Ok(conn
        .query_row("SELECT height FROM sync_state WHERE id = 0", [], |row| row.get(0))
        .optional()?)
}

/// Record `height` as applied. Runs inside the block's transaction.
pub fn set_height(conn: &Connection, height: u32) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_state (id, height) VALUES (0, ?1)
         ON CONFLICT (id) DO UPDATE SET height = excluded.height",
        [height],
    )?;
    Ok(())
}
