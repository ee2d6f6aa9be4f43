//! Claim trie entries and the per-block amount/activation updates that feed
//! takeover decisions.

use std::collections::BTreeSet;

use claimtrie_types::ClaimHash;
use rusqlite::{Connection, OptionalExtension};

use super::placeholders;
use crate::rows::fixed;
use crate::Result;

/// The controlling claim of one normalized name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrieEntry {
    pub normalized: String,
    pub claim_hash: ClaimHash,
    pub last_take_over_height: u32,
}

/// A change of control decided for one name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Takeover {
    pub normalized: String,
    pub winner: ClaimHash,
    pub previous: Option<ClaimHash>,
}

/// Activation delay schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActivationDelay {
    /// Upper bound on the delay, in blocks.
    pub max_delay: u32,
    /// One block of delay per this many blocks since the last takeover.
    pub factor: u32,
}

impl Default for ActivationDelay {
    fn default() -> Self {
        Self {
            max_delay: 4032,
            factor: 32,
        }
    }
}

pub fn get(conn: &Connection, normalized: &str) -> Result<Option<TrieEntry>> {
    let entry = conn
        .query_row(
            "SELECT normalized, claim_hash, last_take_over_height FROM claimtrie
             WHERE normalized = ?1",
            [normalized],
            |row| {
                Ok(TrieEntry {
                    normalized: row.get(0)?,
                    claim_hash: fixed(row, 1)?,
                    last_take_over_height: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(entry)
}

/// Every trie entry, ordered by name.
pub fn list(conn: &Connection) -> Result<Vec<TrieEntry>> {
    let mut stmt = conn.prepare(
        "SELECT normalized, claim_hash, last_take_over_height FROM claimtrie ORDER BY normalized",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(TrieEntry {
                normalized: row.get(0)?,
                claim_hash: fixed(row, 1)?,
                last_take_over_height: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Point `normalized` at `claim_hash`, recording `height` as the takeover.
pub fn upsert(conn: &Connection, normalized: &str, claim_hash: &ClaimHash, height: u32) -> Result<()> {
    conn.execute(
        "INSERT INTO claimtrie (normalized, claim_hash, last_take_over_height)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (normalized) DO UPDATE SET
            claim_hash = excluded.claim_hash,
            last_take_over_height = excluded.last_take_over_height",
        rusqlite::params![normalized, claim_hash.as_slice(), height],
    )?;
    Ok(())
}

/// Fill in activation heights that are still unset.
///
/// The delay grows with the time since the name last changed hands and is
/// zero for names nobody controls. Already-set values are never touched.
pub fn calculate_activation_heights(
    conn: &Connection,
    height: u32,
    delay: ActivationDelay,
) -> Result<usize> {
    let updated = conn.execute(
        "UPDATE claim SET activation_height =
            ?1 + min(?2, CAST((?1 - COALESCE(
                (SELECT last_take_over_height FROM claimtrie
                 WHERE claimtrie.normalized = claim.normalized),
                ?1)) / ?3 AS INT))
         WHERE activation_height IS NULL",
        rusqlite::params![height, delay.max_delay, delay.factor.max(1)],
    )?;
    Ok(updated)
}

/// Recompute `support_amount` from live supports for the given claims.
pub fn update_support_amounts(conn: &Connection, claim_hashes: &BTreeSet<ClaimHash>) -> Result<()> {
    if claim_hashes.is_empty() {
        return Ok(());
    }
    conn.execute(
        &format!(
            "UPDATE claim SET support_amount = COALESCE(
                (SELECT SUM(amount) FROM support WHERE support.claim_hash = claim.claim_hash), 0)
             WHERE claim_hash IN ({})",
            placeholders(claim_hashes.len())
        ),
        rusqlite::params_from_iter(claim_hashes.iter().map(|h| h.as_slice())),
    )?;
    Ok(())
}

/// Set `effective_amount = amount + support_amount` for claims activating at
/// `height` and for already-active claims in `changed`.
///
/// Claims still pending activation keep their previous value.
pub fn update_effective_amounts(
    conn: &Connection,
    height: u32,
    changed: &BTreeSet<ClaimHash>,
) -> Result<()> {
    conn.execute(
        "UPDATE claim SET effective_amount = amount + support_amount
         WHERE activation_height = ?1",
        [height],
    )?;
    if !changed.is_empty() {
        let params = std::iter::once(rusqlite::types::Value::from(height))
            .chain(changed.iter().map(|h| rusqlite::types::Value::Blob(h.to_vec())));
        conn.execute(
            &format!(
                "UPDATE claim SET effective_amount = amount + support_amount
                 WHERE activation_height < ? AND claim_hash IN ({})",
                placeholders(changed.len())
            ),
            rusqlite::params_from_iter(params),
        )?;
    }
    Ok(())
}

/// Names that may change hands at `height`: names with a claim activating
/// now, names of changed claims, and `deleted_names`.
pub fn candidate_names(
    conn: &Connection,
    height: u32,
    changed: &BTreeSet<ClaimHash>,
    deleted_names: &BTreeSet<String>,
) -> Result<BTreeSet<String>> {
    let mut sql = String::from("SELECT DISTINCT normalized FROM claim WHERE activation_height = ?");
    let mut params = vec![rusqlite::types::Value::from(height)];
    if !changed.is_empty() {
        sql.push_str(&format!(" OR claim_hash IN ({})", placeholders(changed.len())));
        params.extend(changed.iter().map(|h| rusqlite::types::Value::Blob(h.to_vec())));
    }
    let mut stmt = conn.prepare(&sql)?;
    let mut names = stmt
        .query_map(rusqlite::params_from_iter(params), |row| row.get(0))?
        .collect::<std::result::Result<BTreeSet<String>, _>>()?;
    names.extend(deleted_names.iter().cloned());
    Ok(names)
}

/// The claim that should control `normalized`: highest effective amount,
/// then lowest height, then lowest position in block.
pub fn best_claim(conn: &Connection, normalized: &str) -> Result<Option<ClaimHash>> {
    let winner = conn
        .query_row(
            "SELECT claim_hash FROM claim WHERE normalized = ?1
             ORDER BY effective_amount DESC, height ASC, tx_position ASC, claim_hash ASC
             LIMIT 1",
            [normalized],
            |row| fixed(row, 0),
        )
        .optional()?;
    Ok(winner)
}

/// Takeovers implied by the current amounts among `names`, in name order.
pub fn pending_takeovers(conn: &Connection, names: &BTreeSet<String>) -> Result<Vec<Takeover>> {
    let mut takeovers = Vec::new();
    for normalized in names {
        let Some(winner) = best_claim(conn, normalized)? else {
            continue;
        };
        let previous = get(conn, normalized)?.map(|entry| entry.claim_hash);
        if previous != Some(winner) {
            takeovers.push(Takeover {
                normalized: normalized.clone(),
                winner,
                previous,
            });
        }
    }
    Ok(takeovers)
}

/// Record a takeover and activate every pending claim under the name.
pub fn apply_takeover(conn: &Connection, takeover: &Takeover, height: u32) -> Result<()> {
    upsert(conn, &takeover.normalized, &takeover.winner, height)?;
    conn.execute(
        "UPDATE claim SET activation_height = ?1
         WHERE normalized = ?2 AND (activation_height IS NULL OR activation_height > ?1)",
        rusqlite::params![height, takeover.normalized],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    fn seed_claim(
        conn: &Connection,
        claim_hash: ClaimHash,
        normalized: &str,
        height: u32,
        amount: i64,
        activation_height: Option<u32>,
    ) {
        conn.execute(
            "INSERT INTO claim (claim_hash, claim_id, claim_name, normalized, txo_hash,
                tx_position, amount, timestamp, creation_timestamp, height, creation_height,
                activation_height, expiration_height, release_time, short_url)
             VALUES (?1, 'id', ?2, ?2, ?1, 0, ?3, 0, 0, ?4, ?4, ?5, 999999, 0, ?2)",
            rusqlite::params![claim_hash.as_slice(), normalized, amount, height, activation_height],
        )
        .expect("seed claim");
    }

    fn activation(conn: &Connection, claim_hash: &ClaimHash) -> Option<u32> {
        conn.query_row(
            "SELECT activation_height FROM claim WHERE claim_hash = ?1",
            [claim_hash.as_slice()],
            |row| row.get(0),
        )
        .expect("activation")
    }

    #[test]
    fn test_activation_delay_from_last_takeover() {
        let conn = test_db();
        upsert(&conn, "foo", &[1u8; 20], 100).expect("trie");
        seed_claim(&conn, [2u8; 20], "foo", 420, 10, None);
        seed_claim(&conn, [3u8; 20], "bar", 420, 10, None);

        calculate_activation_heights(&conn, 420, ActivationDelay::default()).expect("calc");

        assert_eq!(activation(&conn, &[2u8; 20]), Some(430));
        assert_eq!(activation(&conn, &[3u8; 20]), Some(420));
    }

    #[test]
    fn test_activation_delay_capped() {
        let conn = test_db();
        upsert(&conn, "foo", &[1u8; 20], 0).expect("trie");
        seed_claim(&conn, [2u8; 20], "foo", 1_000_000, 10, None);

        calculate_activation_heights(&conn, 1_000_000, ActivationDelay::default()).expect("calc");

        assert_eq!(activation(&conn, &[2u8; 20]), Some(1_004_032));
    }

    #[test]
    fn test_activation_never_overwritten() {
        let conn = test_db();
        seed_claim(&conn, [2u8; 20], "foo", 5, 10, Some(7));
        calculate_activation_heights(&conn, 50, ActivationDelay::default()).expect("calc");
        assert_eq!(activation(&conn, &[2u8; 20]), Some(7));
    }

    #[test]
    fn test_effective_amount_skips_pending() {
        let conn = test_db();
        let active = [1u8; 20];
        let pending = [2u8; 20];
        seed_claim(&conn, active, "foo", 1, 10, Some(1));
        seed_claim(&conn, pending, "foo", 1, 20, Some(50));
        conn.execute(
            "INSERT INTO support (txo_hash, tx_position, height, claim_hash, amount)
             VALUES (?1, 0, 2, ?2, 5), (?3, 0, 2, ?4, 5)",
            rusqlite::params![
                [9u8; 36].as_slice(),
                active.as_slice(),
                [8u8; 36].as_slice(),
                pending.as_slice()
            ],
        )
        .expect("supports");
        let changed = BTreeSet::from([active, pending]);

        update_support_amounts(&conn, &changed).expect("supports");
        update_effective_amounts(&conn, 2, &changed).expect("effective");

        let amounts: Vec<(i64, i64)> = conn
            .prepare("SELECT support_amount, effective_amount FROM claim ORDER BY claim_hash")
            .expect("prepare")
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .expect("query")
            .collect::<std::result::Result<_, _>>()
            .expect("collect");
        assert_eq!(amounts, vec![(5, 15), (5, 0)]);
    }

    #[test]
    fn test_best_claim_tie_break() {
        let conn = test_db();
        seed_claim(&conn, [1u8; 20], "foo", 5, 10, Some(5));
        seed_claim(&conn, [2u8; 20], "foo", 4, 10, Some(5));
        conn.execute("UPDATE claim SET effective_amount = amount", [])
            .expect("effective");

        assert_eq!(best_claim(&conn, "foo").expect("best"), Some([2u8; 20]));
        assert_eq!(best_claim(&conn, "nobody").expect("best"), None);
    }

    #[test]
    fn test_apply_takeover_activates_pending() {
        let conn = test_db();
        seed_claim(&conn, [1u8; 20], "foo", 5, 10, Some(5));
        seed_claim(&conn, [2u8; 20], "foo", 6, 10, Some(90));
        seed_claim(&conn, [3u8; 20], "foo", 6, 10, None);
        seed_claim(&conn, [4u8; 20], "bar", 6, 10, None);

        let takeover = Takeover {
            normalized: "foo".into(),
            winner: [1u8; 20],
            previous: None,
        };
        apply_takeover(&conn, &takeover, 10).expect("apply");

        let entry = get(&conn, "foo").expect("get").expect("entry");
        assert_eq!(entry.claim_hash, [1u8; 20]);
        assert_eq!(entry.last_take_over_height, 10);
        assert_eq!(activation(&conn, &[1u8; 20]), Some(5));
        assert_eq!(activation(&conn, &[2u8; 20]), Some(10));
        assert_eq!(activation(&conn, &[3u8; 20]), Some(10));
        assert_eq!(activation(&conn, &[4u8; 20]), None);
    }

    #[test]
    fn test_candidate_names() {
        let conn = test_db();
        seed_claim(&conn, [1u8; 20], "activating", 5, 10, Some(8));
        seed_claim(&conn, [2u8; 20], "changed", 5, 10, Some(2));
        seed_claim(&conn, [3u8; 20], "quiet", 5, 10, Some(2));

        let names = candidate_names(
            &conn,
            8,
            &BTreeSet::from([[2u8; 20]]),
            &BTreeSet::from(["gone".to_string()]),
        )
        .expect("candidates");

        let expected: BTreeSet<String> = ["activating", "changed", "gone"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(names, expected);
    }
}
