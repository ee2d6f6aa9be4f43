//! Support rows.

use claimtrie_types::{ClaimHash, TxoHash};
use rusqlite::Connection;

use super::placeholders;
use crate::rows::fixed;
use crate::Result;

/// A live support output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupportRecord {
    pub txo_hash: TxoHash,
    pub tx_position: u32,
    pub height: u32,
    pub claim_hash: ClaimHash,
    pub amount: i64,
}

/// Insert supports, ignoring any already present.
pub fn insert(conn: &Connection, supports: &[SupportRecord]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO support (txo_hash, tx_position, height, claim_hash, amount)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for support in supports {
        stmt.execute(rusqlite::params![
            support.txo_hash.as_slice(),
            support.tx_position,
            support.height,
            support.claim_hash.as_slice(),
            support.amount,
        ])?;
    }
    Ok(())
}

/// Delete spent supports by output reference.
pub fn delete(conn: &Connection, txo_hashes: &[TxoHash]) -> Result<()> {
    if txo_hashes.is_empty() {
        return Ok(());
    }
    conn.execute(
        &format!(
            "DELETE FROM support WHERE txo_hash IN ({})",
            placeholders(txo_hashes.len())
        ),
        rusqlite::params_from_iter(txo_hashes.iter().map(|h| h.as_slice())),
    )?;
    Ok(())
}

/// Live supports for a claim, oldest first.
pub fn for_claim(conn: &Connection, claim_hash: &ClaimHash) -> Result<Vec<SupportRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT txo_hash, tx_position, height, claim_hash, amount FROM support
         WHERE claim_hash = ?1 ORDER BY height, tx_position",
    )?;
    let rows = stmt
        .query_map([claim_hash.as_slice()], |row| {
            Ok(SupportRecord {
                txo_hash: fixed(row, 0)?,
                tx_position: row.get(1)?,
                height: row.get(2)?,
                claim_hash: fixed(row, 3)?,
                amount: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    fn support(seed: u8, claim_hash: ClaimHash, amount: i64) -> SupportRecord {
        SupportRecord {
            txo_hash: [seed; 36],
            tx_position: u32::from(seed),
            height: 10,
            claim_hash,
            amount,
        }
    }

    #[test]
    fn test_insert_and_delete() {
        let conn = test_db();
        let claim = [1u8; 20];
        insert(&conn, &[support(1, claim, 5), support(2, claim, 7)]).expect("insert");
        insert(&conn, &[support(1, claim, 5)]).expect("duplicate ignored");
        assert_eq!(for_claim(&conn, &claim).expect("list").len(), 2);

        delete(&conn, &[[1u8; 36]]).expect("delete");
        let remaining = for_claim(&conn, &claim).expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].amount, 7);
    }
}
