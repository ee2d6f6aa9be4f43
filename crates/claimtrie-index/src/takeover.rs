//! Activation and takeover scheduling for one block.

use std::collections::BTreeSet;

use claimtrie_db::queries::claimtrie::{self, ActivationDelay, Takeover};
use claimtrie_types::ClaimHash;
use rusqlite::Connection;
use tracing::debug;

use crate::advancer::timed;
use crate::Result;

/// Bring activation heights, amounts and controlling claims up to date for
/// block `height`.
///
/// `changed` holds claims whose amount or supports changed in this block and
/// `deleted_names` the names that lost a claim. The second pass picks up
/// takeovers made possible by activations forced in the first.
pub fn update_claimtrie(
    conn: &Connection,
    height: u32,
    changed: &BTreeSet<ClaimHash>,
    deleted_names: &BTreeSet<String>,
    delay: ActivationDelay,
) -> Result<Vec<Takeover>> {
    let unchanged = BTreeSet::new();
    let no_names = BTreeSet::new();

    timed(height, "calculate_activation_heights", || {
        Ok(claimtrie::calculate_activation_heights(conn, height, delay)?)
    })?;
    timed(height, "update_support_amounts", || {
        Ok(claimtrie::update_support_amounts(conn, changed)?)
    })?;

    timed(height, "update_effective_amounts", || {
        Ok(claimtrie::update_effective_amounts(conn, height, changed)?)
    })?;
    let mut takeovers = timed(height, "perform_overtake", || {
        perform_overtake(conn, height, changed, deleted_names)
    })?;

    timed(height, "update_effective_amounts", || {
        Ok(claimtrie::update_effective_amounts(conn, height, &unchanged)?)
    })?;
    let second_pass = timed(height, "perform_overtake", || {
        perform_overtake(conn, height, &unchanged, &no_names)
    })?;
    takeovers.extend(second_pass);
    Ok(takeovers)
}

fn perform_overtake(
    conn: &Connection,
    height: u32,
    changed: &BTreeSet<ClaimHash>,
    deleted_names: &BTreeSet<String>,
) -> Result<Vec<Takeover>> {
    let names = claimtrie::candidate_names(conn, height, changed, deleted_names)?;
    let takeovers = claimtrie::pending_takeovers(conn, &names)?;
    for takeover in &takeovers {
        debug!(
            height,
            name = %takeover.normalized,
            winner = %claimtrie_types::claim_id(&takeover.winner),
            "takeover"
        );
        claimtrie::apply_takeover(conn, takeover, height)?;
    }
    Ok(takeovers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimtrie_db::queries::claims::{self, ClaimRecord};
    use claimtrie_db::queries::supports::{self, SupportRecord};

    fn record(claim_hash: ClaimHash, name: &str, amount: i64, height: u32, pos: u32) -> ClaimRecord {
        ClaimRecord {
            claim_hash,
            claim_name: name.into(),
            normalized: name.into(),
            txo_hash: [claim_hash[0]; 36],
            tx_position: pos,
            amount,
            height,
            timestamp: 0,
            expiration_height: height + 1000,
            claim_type: None,
            stream_type: None,
            media_type: None,
            release_time: None,
            fee_currency: None,
            fee_amount: 0,
            reposted_claim_hash: None,
            tags: vec![],
            languages: vec![],
            locations: vec![],
        }
    }

    #[test]
    fn test_first_claim_takes_over_immediately() {
        let conn = claimtrie_db::open_memory().expect("db");
        claims::insert(&conn, &[record([1; 20], "x", 10, 100, 0)]).expect("insert");
        let takeovers = update_claimtrie(
            &conn,
            100,
            &BTreeSet::from([[1; 20]]),
            &BTreeSet::new(),
            ActivationDelay::default(),
        )
        .expect("update");
        assert_eq!(takeovers.len(), 1);
        let entry = claimtrie::get(&conn, "x").expect("get").expect("entry");
        assert_eq!(entry.claim_hash, [1; 20]);
        assert_eq!(entry.last_take_over_height, 100);
    }

    #[test]
    fn test_pending_challenger_waits_for_activation() {
        let conn = claimtrie_db::open_memory().expect("db");
        let delay = ActivationDelay::default();
        claims::insert(&conn, &[record([1; 20], "x", 10, 100, 0)]).expect("insert");
        update_claimtrie(&conn, 100, &BTreeSet::from([[1; 20]]), &BTreeSet::new(), delay)
            .expect("update");

        // 320 blocks after the takeover the delay is 10 blocks.
        claims::insert(&conn, &[record([2; 20], "x", 50, 420, 0)]).expect("insert");
        let takeovers =
            update_claimtrie(&conn, 420, &BTreeSet::from([[2; 20]]), &BTreeSet::new(), delay)
                .expect("update");
        assert!(takeovers.is_empty());
        let challenger = claims::get(&conn, &[2; 20]).expect("get");
        assert_eq!(challenger.activation_height, Some(430));

        for height in 421..430 {
            let takeovers =
                update_claimtrie(&conn, height, &BTreeSet::new(), &BTreeSet::new(), delay)
                    .expect("update");
            assert!(takeovers.is_empty());
        }
        let takeovers = update_claimtrie(&conn, 430, &BTreeSet::new(), &BTreeSet::new(), delay)
            .expect("update");
        assert_eq!(takeovers.len(), 1);
        assert_eq!(takeovers[0].winner, [2; 20]);
        assert_eq!(takeovers[0].previous, Some([1; 20]));
    }

    #[test]
    fn test_support_triggers_overtake() {
        let conn = claimtrie_db::open_memory().expect("db");
        let delay = ActivationDelay::default();
        claims::insert(
            &conn,
            &[record([1; 20], "x", 10, 100, 0), record([2; 20], "x", 5, 100, 1)],
        )
        .expect("insert");
        update_claimtrie(
            &conn,
            100,
            &BTreeSet::from([[1; 20], [2; 20]]),
            &BTreeSet::new(),
            delay,
        )
        .expect("update");
        assert_eq!(
            claimtrie::get(&conn, "x").expect("get").expect("entry").claim_hash,
            [1; 20]
        );

        supports::insert(
            &conn,
            &[SupportRecord {
                txo_hash: [9; 36],
                tx_position: 0,
                height: 101,
                claim_hash: [2; 20],
                amount: 10,
            }],
        )
        .expect("support");
        update_claimtrie(&conn, 101, &BTreeSet::from([[2; 20]]), &BTreeSet::new(), delay)
            .expect("update");
        let entry = claimtrie::get(&conn, "x").expect("get").expect("entry");
        assert_eq!(entry.claim_hash, [2; 20]);
        assert_eq!(entry.last_take_over_height, 101);
        assert_eq!(claims::get(&conn, &[2; 20]).expect("get").effective_amount, 15);
    }
}
