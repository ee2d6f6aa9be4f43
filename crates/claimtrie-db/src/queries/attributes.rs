//! Tag, language and location facet rows.

use claimtrie_types::ClaimHash;
use rusqlite::Connection;

use super::placeholders;
use crate::Result;

/// A many-to-many search facet keyed by claim hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Attribute {
    Tag,
    Language,
    Location,
}

impl Attribute {
    pub const ALL: [Attribute; 3] = [Attribute::Tag, Attribute::Language, Attribute::Location];

    /// Table name; the value column carries the same name.
    pub fn table(self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Language => "language",
            Self::Location => "location",
        }
    }
}

/// Attach `values` to a claim. Existing pairs are left alone.
pub fn insert(
    conn: &Connection,
    attribute: Attribute,
    claim_hash: &ClaimHash,
    height: u32,
    values: &[String],
) -> Result<()> {
    if values.is_empty() {
        return Ok(());
    }
    let table = attribute.table();
    let mut stmt = conn.prepare_cached(&format!(
        "INSERT OR IGNORE INTO {table} ({table}, claim_hash, height) VALUES (?1, ?2, ?3)"
    ))?;
    for value in values {
        stmt.execute(rusqlite::params![value, claim_hash.as_slice(), height])?;
    }
    Ok(())
}

/// Remove every facet row of every kind for the given claims.
pub fn clear(conn: &Connection, claim_hashes: &[ClaimHash]) -> Result<()> {
    if claim_hashes.is_empty() {
        return Ok(());
    }
    let list = placeholders(claim_hashes.len());
    for attribute in Attribute::ALL {
        conn.execute(
            &format!(
                "DELETE FROM {} WHERE claim_hash IN ({list})",
                attribute.table()
            ),
            rusqlite::params_from_iter(claim_hashes.iter().map(|h| h.as_slice())),
        )?;
    }
    Ok(())
}

/// Values attached to one claim, sorted.
pub fn for_claim(
    conn: &Connection,
    attribute: Attribute,
    claim_hash: &ClaimHash,
) -> Result<Vec<String>> {
    let table = attribute.table();
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {table} FROM {table} WHERE claim_hash = ?1 ORDER BY {table}"
    ))?;
    let values = stmt
        .query_map([claim_hash.as_slice()], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(values)
}
