//! Claim rows as returned by search and resolve.

use claimtrie_types::{ClaimHash, TxoHash};
use rusqlite::Row;
use serde::Serialize;

/// Column list matching [`ClaimRow::from_row`].
///
/// Expects `claim` joined with `claimtrie` on `normalized`.
pub const CLAIM_COLUMNS: &str = "claim.claim_hash, claim.claim_id, claim.claim_name, claim.normalized, \
    claim.txo_hash, claim.tx_position, claim.amount, claim.timestamp, claim.creation_timestamp, \
    claim.height, claim.creation_height, claim.activation_height, claim.expiration_height, \
    claim.release_time, claim.short_url, claim.canonical_url, claim.claim_type, claim.stream_type, \
    claim.media_type, claim.fee_amount, claim.fee_currency, claim.reposted_claim_hash, \
    claim.public_key_bytes, claim.public_key_hash, claim.claims_in_channel, claim.channel_hash, \
    claim.channel_join, claim.signature, claim.signature_digest, claim.signature_valid, \
    claim.effective_amount, claim.support_amount, claim.trending_group, claim.trending_mixed, \
    claim.trending_local, claim.trending_global, \
    claimtrie.claim_hash IS NOT NULL AS is_controlling, claimtrie.last_take_over_height";

/// Join clause that pairs every claim with the trie entry it controls, if any.
pub const CLAIM_FROM: &str =
    "claim LEFT JOIN claimtrie ON claimtrie.claim_hash = claim.claim_hash";

/// A claim with its trie state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClaimRow {
    #[serde(with = "hex::serde")]
    pub claim_hash: ClaimHash,
    pub claim_id: String,
    pub claim_name: String,
    pub normalized: String,
    #[serde(with = "hex::serde")]
    pub txo_hash: TxoHash,
    pub tx_position: u32,
    pub amount: i64,
    pub timestamp: i64,
    pub creation_timestamp: i64,
    pub height: u32,
    pub creation_height: u32,
    pub activation_height: Option<u32>,
    pub expiration_height: u32,
    pub release_time: i64,
    pub short_url: String,
    pub canonical_url: Option<String>,
    pub claim_type: Option<i64>,
    pub stream_type: Option<i64>,
    pub media_type: Option<String>,
    pub fee_amount: i64,
    pub fee_currency: Option<String>,
    pub reposted_claim_hash: Option<Vec<u8>>,
    pub public_key_bytes: Option<Vec<u8>>,
    pub public_key_hash: Option<Vec<u8>>,
    pub claims_in_channel: Option<i64>,
    pub channel_hash: Option<Vec<u8>>,
    pub channel_join: Option<u32>,
    pub signature: Option<Vec<u8>>,
    pub signature_digest: Option<Vec<u8>>,
    pub signature_valid: Option<bool>,
    pub effective_amount: i64,
    pub support_amount: i64,
    pub trending_group: i64,
    pub trending_mixed: i64,
    pub trending_local: i64,
    pub trending_global: i64,
    pub is_controlling: bool,
    pub last_take_over_height: Option<u32>,
}

impl ClaimRow {
    /// Map a row selected with [`CLAIM_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            claim_hash: fixed(row, 0)?,
            claim_id: row.get(1)?,
            claim_name: row.get(2)?,
            normalized: row.get(3)?,
            txo_hash: fixed(row, 4)?,
            tx_position: row.get(5)?,
            amount: row.get(6)?,
            timestamp: row.get(7)?,
            creation_timestamp: row.get(8)?,
            height: row.get(9)?,
            creation_height: row.get(10)?,
            activation_height: row.get(11)?,
            expiration_height: row.get(12)?,
            release_time: row.get(13)?,
            short_url: row.get(14)?,
            canonical_url: row.get(15)?,
            claim_type: row.get(16)?,
            stream_type: row.get(17)?,
            media_type: row.get(18)?,
            fee_amount: row.get(19)?,
            fee_currency: row.get(20)?,
            reposted_claim_hash: row.get(21)?,
            public_key_bytes: row.get(22)?,
            public_key_hash: row.get(23)?,
            claims_in_channel: row.get(24)?,
            channel_hash: row.get(25)?,
            channel_join: row.get(26)?,
            signature: row.get(27)?,
            signature_digest: row.get(28)?,
            signature_valid: row.get(29)?,
            effective_amount: row.get(30)?,
            support_amount: row.get(31)?,
            trending_group: row.get(32)?,
            trending_mixed: row.get(33)?,
            trending_local: row.get(34)?,
            trending_global: row.get(35)?,
            is_controlling: row.get(36)?,
            last_take_over_height: row.get(37)?,
        })
    }

    /// Signing channel as a fixed-size hash, when present and well formed.
    pub fn channel(&self) -> Option<ClaimHash> {
        self.channel_hash.as_deref().and_then(|h| h.try_into().ok())
    }

    /// Reposted claim as a fixed-size hash, when present and well formed.
    pub fn reposted(&self) -> Option<ClaimHash> {
        self.reposted_claim_hash
            .as_deref()
            .and_then(|h| h.try_into().ok())
    }

    pub fn is_signature_valid(&self) -> bool {
        self.signature_valid == Some(true)
    }
}

/// Read a fixed-width blob column.
pub(crate) fn fixed<const N: usize>(row: &Row<'_>, idx: usize) -> rusqlite::Result<[u8; N]> {
    let bytes: Vec<u8> = row.get(idx)?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Blob,
            format!("expected {N} bytes, found {len}").into(),
        )
    })
}
