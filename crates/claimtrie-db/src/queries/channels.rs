//! Channel keys and the signature columns of claims signed by channels.

use std::collections::{BTreeMap, BTreeSet};

use claimtrie_types::ClaimHash;
use rusqlite::{named_params, Connection};

use super::placeholders;
use crate::rows::fixed;
use crate::Result;

/// Signature state to persist for one claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureUpdate {
    pub claim_hash: ClaimHash,
    pub channel_hash: Option<ClaimHash>,
    pub signature: Option<Vec<u8>>,
    pub signature_digest: Option<Vec<u8>>,
    /// `None` for unsigned claims.
    pub signature_valid: Option<bool>,
}

impl SignatureUpdate {
    pub fn unsigned(claim_hash: ClaimHash) -> Self {
        Self {
            claim_hash,
            channel_hash: None,
            signature: None,
            signature_digest: None,
            signature_valid: None,
        }
    }
}

/// Stored public keys for the given claims. Claims absent from the index are
/// absent from the map; channels without a stored key map to `None`.
pub fn public_keys(
    conn: &Connection,
    claim_hashes: &BTreeSet<ClaimHash>,
) -> Result<BTreeMap<ClaimHash, Option<Vec<u8>>>> {
    if claim_hashes.is_empty() {
        return Ok(BTreeMap::new());
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT claim_hash, public_key_bytes FROM claim WHERE claim_hash IN ({})",
        placeholders(claim_hashes.len())
    ))?;
    let keys = stmt
        .query_map(
            rusqlite::params_from_iter(claim_hashes.iter().map(|h| h.as_slice())),
            |row| Ok((fixed::<20>(row, 0)?, row.get(1)?)),
        )?
        .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
    Ok(keys)
}

/// Channels currently recorded as signing any of the given claims.
pub fn signing_channels(
    conn: &Connection,
    claim_hashes: &BTreeSet<ClaimHash>,
) -> Result<BTreeSet<ClaimHash>> {
    if claim_hashes.is_empty() {
        return Ok(BTreeSet::new());
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT channel_hash FROM claim
         WHERE claim_hash IN ({}) AND channel_hash IS NOT NULL",
        placeholders(claim_hashes.len())
    ))?;
    let channels = stmt
        .query_map(
            rusqlite::params_from_iter(claim_hashes.iter().map(|h| h.as_slice())),
            |row| fixed::<20>(row, 0),
        )?
        .collect::<std::result::Result<BTreeSet<_>, _>>()?;
    Ok(channels)
}

/// Claims carrying a signature from any of `channels`, excluding `skip`.
///
/// Each comes back with its stored signature and validity reset to false.
pub fn signed_by(
    conn: &Connection,
    channels: &BTreeSet<ClaimHash>,
    skip: &BTreeSet<ClaimHash>,
) -> Result<Vec<SignatureUpdate>> {
    if channels.is_empty() {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT claim_hash, channel_hash, signature, signature_digest FROM claim
         WHERE channel_hash IN ({}) AND signature IS NOT NULL
         ORDER BY claim_hash",
        placeholders(channels.len())
    ))?;
    let updates = stmt
        .query_map(
            rusqlite::params_from_iter(channels.iter().map(|h| h.as_slice())),
            |row| {
                Ok(SignatureUpdate {
                    claim_hash: fixed(row, 0)?,
                    channel_hash: Some(fixed(row, 1)?),
                    signature: row.get(2)?,
                    signature_digest: row.get(3)?,
                    signature_valid: Some(false),
                })
            },
        )?
        .filter(|update| {
            update
                .as_ref()
                .map_or(true, |update| !skip.contains(&update.claim_hash))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(updates)
}

/// Persist signature state in order.
///
/// A claim that stays validly signed by the same channel keeps its
/// `channel_join` and `canonical_url`. A claim that becomes valid joins at
/// `height` and gets a canonical URL built from the channel's short URL and
/// the shortest id unique among the channel's valid claims of the same name.
/// Anything else loses both.
pub fn apply_signature_updates(
    conn: &Connection,
    height: u32,
    updates: &[SignatureUpdate],
) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "UPDATE claim SET
            channel_hash = :channel_hash, signature = :signature,
            signature_digest = :signature_digest, signature_valid = :signature_valid,
            channel_join = CASE
                WHEN signature_valid = 1 AND :signature_valid = 1 AND channel_hash = :channel_hash
                    THEN channel_join
                WHEN :signature_valid = 1 THEN :height
            END,
            canonical_url = CASE
                WHEN signature_valid = 1 AND :signature_valid = 1 AND channel_hash = :channel_hash
                    THEN canonical_url
                WHEN :signature_valid = 1 THEN
                    (SELECT short_url FROM claim WHERE claim_hash = :channel_hash) || '/' ||
                    claim_name || COALESCE(
                        (SELECT shortest_id(other_claim.claim_id, claim.claim_id)
                         FROM claim AS other_claim
                         WHERE other_claim.signature_valid = 1
                           AND other_claim.channel_hash = :channel_hash
                           AND other_claim.normalized = claim.normalized),
                        '#' || substr(claim_id, 1, 1))
            END
         WHERE claim_hash = :claim_hash",
    )?;
    for update in updates {
        stmt.execute(named_params! {
            ":claim_hash": update.claim_hash.as_slice(),
            ":channel_hash": update.channel_hash.as_ref().map(|h| h.as_slice()),
            ":signature": update.signature,
            ":signature_digest": update.signature_digest,
            ":signature_valid": update.signature_valid,
            ":height": height,
        })?;
    }
    Ok(())
}

/// Invalidate every claim signed by a channel that no longer exists.
pub fn invalidate_signed_by(conn: &Connection, channels: &BTreeSet<ClaimHash>) -> Result<()> {
    if channels.is_empty() {
        return Ok(());
    }
    conn.execute(
        &format!(
            "UPDATE claim SET
                signature_valid = CASE WHEN signature IS NOT NULL THEN 0 END,
                channel_join = NULL, canonical_url = NULL
             WHERE channel_hash IN ({})",
            placeholders(channels.len())
        ),
        rusqlite::params_from_iter(channels.iter().map(|h| h.as_slice())),
    )?;
    Ok(())
}

/// Store a channel's public key and its hash.
pub fn set_public_key(
    conn: &Connection,
    claim_hash: &ClaimHash,
    public_key_bytes: &[u8],
    public_key_hash: &[u8],
) -> Result<()> {
    conn.execute(
        "UPDATE claim SET public_key_bytes = ?1, public_key_hash = ?2 WHERE claim_hash = ?3",
        rusqlite::params![public_key_bytes, public_key_hash, claim_hash.as_slice()],
    )?;
    Ok(())
}

/// Recount valid signed claims for each channel.
pub fn update_claims_in_channel(conn: &Connection, channels: &BTreeSet<ClaimHash>) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "UPDATE claim SET claims_in_channel = (
            SELECT COUNT(*) FROM claim AS claim_in_channel
            WHERE claim_in_channel.signature_valid = 1
              AND claim_in_channel.channel_hash = claim.claim_hash)
         WHERE claim_hash = ?1",
    )?;
    for channel in channels {
        stmt.execute([channel.as_slice()])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::claims;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    fn seed(conn: &Connection, claim_hash: ClaimHash, id: &str, name: &str, short_url: &str) {
        conn.execute(
            "INSERT INTO claim (claim_hash, claim_id, claim_name, normalized, txo_hash,
                tx_position, amount, timestamp, creation_timestamp, height, creation_height,
                expiration_height, release_time, short_url)
             VALUES (?1, ?2, ?3, ?3, ?1, 0, 1, 0, 0, 1, 1, 999999, 0, ?4)",
            rusqlite::params![claim_hash.as_slice(), id, name, short_url],
        )
        .expect("seed");
    }

    fn signed(claim_hash: ClaimHash, channel: ClaimHash, valid: bool) -> SignatureUpdate {
        SignatureUpdate {
            claim_hash,
            channel_hash: Some(channel),
            signature: Some(vec![1, 2, 3]),
            signature_digest: Some(vec![4, 5, 6]),
            signature_valid: Some(valid),
        }
    }

    #[test]
    fn test_public_keys() {
        let conn = test_db();
        let channel = [1u8; 20];
        seed(&conn, channel, "01", "@chan", "@chan#0");
        let missing = [9u8; 20];

        let keys = public_keys(&conn, &BTreeSet::from([channel, missing])).expect("keys");
        assert_eq!(keys.get(&channel), Some(&None));
        assert!(!keys.contains_key(&missing));

        set_public_key(&conn, &channel, &[7u8; 32], &[8u8; 20]).expect("set");
        let keys = public_keys(&conn, &BTreeSet::from([channel])).expect("keys");
        assert_eq!(keys.get(&channel), Some(&Some(vec![7u8; 32])));
    }

    #[test]
    fn test_join_and_canonical_url_stable_while_valid() {
        let conn = test_db();
        let channel = [1u8; 20];
        let stream = [2u8; 20];
        seed(&conn, channel, "c1", "@chan", "@chan#c");
        seed(&conn, stream, "ab12", "video", "video#a");

        apply_signature_updates(&conn, 10, &[signed(stream, channel, true)]).expect("first");
        let row = claims::get(&conn, &stream).expect("get");
        assert_eq!(row.channel_join, Some(10));
        assert_eq!(row.canonical_url.as_deref(), Some("@chan#c/video#a"));
        assert_eq!(row.signature_valid, Some(true));

        apply_signature_updates(&conn, 20, &[signed(stream, channel, true)]).expect("again");
        let row = claims::get(&conn, &stream).expect("get");
        assert_eq!(row.channel_join, Some(10));

        apply_signature_updates(&conn, 30, &[signed(stream, channel, false)]).expect("invalid");
        let row = claims::get(&conn, &stream).expect("get");
        assert_eq!(row.channel_join, None);
        assert_eq!(row.canonical_url, None);
        assert_eq!(row.signature_valid, Some(false));
    }

    #[test]
    fn test_canonical_url_unique_within_channel() {
        let conn = test_db();
        let channel = [1u8; 20];
        seed(&conn, channel, "c1", "@chan", "@chan#c");
        seed(&conn, [2u8; 20], "ab12", "video", "video#a");
        seed(&conn, [3u8; 20], "ab34", "video", "video#ab3");

        apply_signature_updates(
            &conn,
            5,
            &[signed([2u8; 20], channel, true), signed([3u8; 20], channel, true)],
        )
        .expect("apply");

        let first = claims::get(&conn, &[2u8; 20]).expect("first");
        let second = claims::get(&conn, &[3u8; 20]).expect("second");
        assert_eq!(first.canonical_url.as_deref(), Some("@chan#c/video#a"));
        assert_eq!(second.canonical_url.as_deref(), Some("@chan#c/video#ab3"));
    }

    #[test]
    fn test_signed_by_skips_and_resets() {
        let conn = test_db();
        let channel = [1u8; 20];
        seed(&conn, channel, "c1", "@chan", "@chan#c");
        seed(&conn, [2u8; 20], "a2", "one", "one#a");
        seed(&conn, [3u8; 20], "a3", "two", "two#a");
        seed(&conn, [4u8; 20], "a4", "three", "three#a");
        apply_signature_updates(
            &conn,
            5,
            &[
                signed([2u8; 20], channel, true),
                signed([3u8; 20], channel, true),
                SignatureUpdate::unsigned([4u8; 20]),
            ],
        )
        .expect("apply");

        let queued =
            signed_by(&conn, &BTreeSet::from([channel]), &BTreeSet::from([[3u8; 20]])).expect("signed");
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].claim_hash, [2u8; 20]);
        assert_eq!(queued[0].signature_valid, Some(false));
        assert_eq!(queued[0].signature.as_deref(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_signing_channels() {
        let conn = test_db();
        let channel = [1u8; 20];
        seed(&conn, channel, "c1", "@chan", "@chan#c");
        seed(&conn, [2u8; 20], "a2", "one", "one#a");
        seed(&conn, [3u8; 20], "a3", "two", "two#a");
        apply_signature_updates(&conn, 5, &[signed([2u8; 20], channel, false)]).expect("apply");

        let found = signing_channels(&conn, &BTreeSet::from([[2u8; 20], [3u8; 20]]))
            .expect("signing channels");
        assert_eq!(found, BTreeSet::from([channel]));
        assert!(signing_channels(&conn, &BTreeSet::new()).expect("empty").is_empty());
    }

    #[test]
    fn test_invalidate_and_count() {
        let conn = test_db();
        let channel = [1u8; 20];
        seed(&conn, channel, "c1", "@chan", "@chan#c");
        seed(&conn, [2u8; 20], "a2", "one", "one#a");
        seed(&conn, [3u8; 20], "a3", "two", "two#a");
        apply_signature_updates(
            &conn,
            5,
            &[signed([2u8; 20], channel, true), signed([3u8; 20], channel, true)],
        )
        .expect("apply");

        update_claims_in_channel(&conn, &BTreeSet::from([channel])).expect("count");
        assert_eq!(claims::get(&conn, &channel).expect("chan").claims_in_channel, Some(2));

        invalidate_signed_by(&conn, &BTreeSet::from([channel])).expect("invalidate");
        update_claims_in_channel(&conn, &BTreeSet::from([channel])).expect("count");
        assert_eq!(claims::get(&conn, &channel).expect("chan").claims_in_channel, Some(0));
        let row = claims::get(&conn, &[2u8; 20]).expect("row");
        assert_eq!(row.signature_valid, Some(false));
        assert_eq!(row.canonical_url, None);
    }
}
