//! Claim rows: insert, update, delete and input classification.

use std::collections::BTreeSet;

use claimtrie_types::media::{ClaimType, StreamType};
use claimtrie_types::{claim_id, ClaimHash, TxoHash};
use rusqlite::{named_params, Connection, OptionalExtension};

use super::attributes::{self, Attribute};
use super::placeholders;
use crate::rows::{fixed, ClaimRow, CLAIM_COLUMNS, CLAIM_FROM};
use crate::{DbError, Result};

/// A claim output with every derived column computed, ready to persist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimRecord {
    pub claim_hash: ClaimHash,
    pub claim_name: String,
    pub normalized: String,
    pub txo_hash: TxoHash,
    pub tx_position: u32,
    pub amount: i64,
    pub height: u32,
    /// Block timestamp.
    pub timestamp: i64,
    pub expiration_height: u32,
    /// `None` when the payload could not be decoded.
    pub claim_type: Option<ClaimType>,
    pub stream_type: Option<StreamType>,
    pub media_type: Option<String>,
    pub release_time: Option<i64>,
    pub fee_currency: Option<String>,
    pub fee_amount: i64,
    pub reposted_claim_hash: Option<ClaimHash>,
    pub tags: Vec<String>,
    pub languages: Vec<String>,
    pub locations: Vec<String>,
}

impl ClaimRecord {
    pub fn claim_id(&self) -> String {
        claim_id(&self.claim_hash)
    }

    fn insert_attributes(&self, conn: &Connection) -> Result<()> {
        attributes::insert(conn, Attribute::Tag, &self.claim_hash, self.height, &self.tags)?;
        attributes::insert(
            conn,
            Attribute::Language,
            &self.claim_hash,
            self.height,
            &self.languages,
        )?;
        attributes::insert(
            conn,
            Attribute::Location,
            &self.claim_hash,
            self.height,
            &self.locations,
        )?;
        Ok(())
    }
}

/// Insert new claims in order, ignoring any whose `claim_hash` already exists.
///
/// Rows for a name that has no controlling claim activate immediately.
/// `short_url` is derived from the claims already stored under the name,
/// including earlier records in this batch.
///
/// Returns the number of rows actually inserted.
pub fn insert(conn: &Connection, records: &[ClaimRecord]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO claim (
            claim_hash, claim_id, claim_name, normalized, txo_hash, tx_position, amount,
            claim_type, media_type, stream_type, timestamp, creation_timestamp,
            fee_currency, fee_amount, release_time, reposted_claim_hash,
            height, creation_height, activation_height, expiration_height, short_url)
         VALUES (
            :claim_hash, :claim_id, :claim_name, :normalized, :txo_hash, :tx_position, :amount,
            :claim_type, :media_type, :stream_type, :timestamp, :timestamp,
            :fee_currency, :fee_amount, COALESCE(:release_time, :timestamp), :reposted_claim_hash,
            :height, :height,
            CASE WHEN :normalized NOT IN (SELECT normalized FROM claimtrie) THEN :height END,
            :expiration_height,
            :claim_name || COALESCE(
                (SELECT shortest_id(claim_id, :claim_id) FROM claim WHERE normalized = :normalized),
                '#' || substr(:claim_id, 1, 1)))",
    )?;

    let mut inserted = 0;
    for record in records {
        inserted += stmt.execute(named_params! {
            ":claim_hash": record.claim_hash.as_slice(),
            ":claim_id": record.claim_id(),
            ":claim_name": record.claim_name,
            ":normalized": record.normalized,
            ":txo_hash": record.txo_hash.as_slice(),
            ":tx_position": record.tx_position,
            ":amount": record.amount,
            ":claim_type": record.claim_type.map(ClaimType::code),
            ":media_type": record.media_type,
            ":stream_type": record.stream_type.map(StreamType::code),
            ":timestamp": record.timestamp,
            ":fee_currency": record.fee_currency,
            ":fee_amount": record.fee_amount,
            ":release_time": record.release_time,
            ":reposted_claim_hash": record.reposted_claim_hash.as_ref().map(|h| h.as_slice()),
            ":height": record.height,
            ":expiration_height": record.expiration_height,
        })?;
        record.insert_attributes(conn)?;
    }
    Ok(inserted)
}

/// Apply claim updates to existing rows.
///
/// Facet rows are replaced wholesale. `release_time` is kept when the
/// update does not carry one.
pub fn update(conn: &Connection, records: &[ClaimRecord]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let hashes: Vec<ClaimHash> = records.iter().map(|r| r.claim_hash).collect();
    attributes::clear(conn, &hashes)?;

    let mut stmt = conn.prepare_cached(
        "UPDATE claim SET
            txo_hash = :txo_hash, tx_position = :tx_position, amount = :amount, height = :height,
            claim_type = :claim_type, media_type = :media_type, stream_type = :stream_type,
            timestamp = :timestamp, fee_amount = :fee_amount, fee_currency = :fee_currency,
            reposted_claim_hash = :reposted_claim_hash,
            release_time = CASE WHEN :release_time IS NOT NULL THEN :release_time ELSE release_time END
         WHERE claim_hash = :claim_hash",
    )?;
    for record in records {
        stmt.execute(named_params! {
            ":claim_hash": record.claim_hash.as_slice(),
            ":txo_hash": record.txo_hash.as_slice(),
            ":tx_position": record.tx_position,
            ":amount": record.amount,
            ":height": record.height,
            ":claim_type": record.claim_type.map(ClaimType::code),
            ":media_type": record.media_type,
            ":stream_type": record.stream_type.map(StreamType::code),
            ":timestamp": record.timestamp,
            ":fee_amount": record.fee_amount,
            ":fee_currency": record.fee_currency,
            ":reposted_claim_hash": record.reposted_claim_hash.as_ref().map(|h| h.as_slice()),
            ":release_time": record.release_time,
        })?;
        record.insert_attributes(conn)?;
    }
    Ok(())
}

/// Delete abandoned or expired claims with their supports, trie entries and
/// facets.
///
/// Returns the signing channels of the deleted claims.
pub fn delete(conn: &Connection, claim_hashes: &BTreeSet<ClaimHash>) -> Result<BTreeSet<ClaimHash>> {
    if claim_hashes.is_empty() {
        return Ok(BTreeSet::new());
    }
    let hashes: Vec<ClaimHash> = claim_hashes.iter().copied().collect();
    let list = placeholders(hashes.len());
    let params = || rusqlite::params_from_iter(hashes.iter().map(|h| h.as_slice()));

    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT channel_hash FROM claim
         WHERE channel_hash IS NOT NULL AND claim_hash IN ({list})"
    ))?;
    let affected_channels = stmt
        .query_map(params(), |row| fixed::<20>(row, 0))?
        .collect::<std::result::Result<BTreeSet<_>, _>>()?;

    for table in ["claim", "support", "claimtrie"] {
        conn.execute(
            &format!("DELETE FROM {table} WHERE claim_hash IN ({list})"),
            params(),
        )?;
    }
    attributes::clear(conn, &hashes)?;
    Ok(affected_channels)
}

/// Get a claim with its trie state.
pub fn get(conn: &Connection, claim_hash: &ClaimHash) -> Result<ClaimRow> {
    conn.query_row(
        &format!("SELECT {CLAIM_COLUMNS} FROM {CLAIM_FROM} WHERE claim.claim_hash = ?1"),
        [claim_hash.as_slice()],
        ClaimRow::from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound("claim".into()),
        other => DbError::Sqlite(other),
    })
}

/// Whether a claim row exists.
pub fn exists(conn: &Connection, claim_hash: &ClaimHash) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM claim WHERE claim_hash = ?1",
            [claim_hash.as_slice()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Claims whose expiration falls exactly at `height`, with their names.
pub fn expiring_at(conn: &Connection, height: u32) -> Result<Vec<(ClaimHash, String)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT claim_hash, normalized FROM claim
         WHERE expiration_height = ?1 ORDER BY claim_hash",
    )?;
    let rows = stmt
        .query_map([height], |row| Ok((fixed::<20>(row, 0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// A claim output consumed by a transaction input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpentClaim {
    pub txo_hash: TxoHash,
    pub claim_hash: ClaimHash,
    pub normalized: String,
}

/// A support output consumed by a transaction input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpentSupport {
    pub txo_hash: TxoHash,
    pub claim_hash: ClaimHash,
}

/// Spent outputs split by what they were.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpentInputs {
    pub claims: Vec<SpentClaim>,
    pub supports: Vec<SpentSupport>,
    /// Outputs not known as a live claim or support.
    pub other: BTreeSet<TxoHash>,
}

/// Classify spent outputs against the live claim and support tables.
pub fn split_inputs(conn: &Connection, txo_hashes: &[TxoHash]) -> Result<SpentInputs> {
    let mut split = SpentInputs::default();
    if txo_hashes.is_empty() {
        return Ok(split);
    }
    let list = placeholders(txo_hashes.len());
    let params = || rusqlite::params_from_iter(txo_hashes.iter().map(|h| h.as_slice()));

    let mut stmt = conn.prepare(&format!(
        "SELECT txo_hash, claim_hash, normalized FROM claim WHERE txo_hash IN ({list})"
    ))?;
    split.claims = stmt
        .query_map(params(), |row| {
            Ok(SpentClaim {
                txo_hash: fixed(row, 0)?,
                claim_hash: fixed(row, 1)?,
                normalized: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT txo_hash, claim_hash FROM support WHERE txo_hash IN ({list})"
    ))?;
    split.supports = stmt
        .query_map(params(), |row| {
            Ok(SpentSupport {
                txo_hash: fixed(row, 0)?,
                claim_hash: fixed(row, 1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let known: BTreeSet<TxoHash> = split
        .claims
        .iter()
        .map(|c| c.txo_hash)
        .chain(split.supports.iter().map(|s| s.txo_hash))
        .collect();
    split.other = txo_hashes
        .iter()
        .filter(|h| !known.contains(*h))
        .copied()
        .collect();
    Ok(split)
}
