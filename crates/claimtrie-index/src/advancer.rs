//! Applying one block to the index.
//!
//! Inputs and outputs are classified first, then the index is changed in a
//! fixed order: deletions, claim inserts and updates, signature validation,
//! supports, the claim trie, and finally trending.

use std::collections::BTreeSet;
use std::time::Instant;

use claimtrie_crypto::verifier::SignatureVerifier;
use claimtrie_db::queries::claimtrie::Takeover;
use claimtrie_db::queries::claims::{self, ClaimRecord};
use claimtrie_db::queries::supports::{self, SupportRecord};
use claimtrie_types::tx::{Block, OutputRef};
use claimtrie_types::{ClaimHash, TxoHash};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::config::ChainConfig;
use crate::records::{claim_record, support_record};
use crate::signatures::{validate_channel_signatures, CascadeSummary};
use crate::takeover::update_claimtrie;
use crate::trending::TrendingCalculator;
use crate::Result;

/// Collaborators and settings used while applying a block.
pub struct Pipeline<'a> {
    pub chain: &'a ChainConfig,
    pub verifier: &'a dyn SignatureVerifier,
    pub trending: &'a mut dyn TrendingCalculator,
    pub is_first_sync: bool,
    pub chain_tip_height: u32,
}

/// What one block changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockSummary {
    pub height: u32,
    pub inserted_claims: usize,
    pub updated_claims: usize,
    /// Abandoned and expired claims.
    pub deleted_claims: usize,
    pub expired_claims: usize,
    pub inserted_supports: usize,
    pub deleted_supports: usize,
    pub signatures: CascadeSummary,
    pub takeovers: Vec<Takeover>,
}

/// Outputs and spends of a block, sorted by what they do to the index.
#[derive(Default)]
struct Changes<'a> {
    insert_claims: Vec<OutputRef<'a>>,
    update_claims: Vec<OutputRef<'a>>,
    insert_supports: Vec<OutputRef<'a>>,
    delete_claims: BTreeSet<ClaimHash>,
    delete_supports: Vec<TxoHash>,
    /// Spent outputs that are neither a stored claim nor a stored support.
    spent_other: BTreeSet<TxoHash>,
    deleted_names: BTreeSet<String>,
    recalculate: BTreeSet<ClaimHash>,
    expired: usize,
}

/// Run `f` as a named block step, logging how long it took.
pub(crate) fn timed<T>(height: u32, step: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let started = Instant::now();
    let result = f();
    debug!(
        height,
        step,
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        ok = result.is_ok(),
        "block step"
    );
    result
}

/// Apply every transaction of `block` to the index through `conn`.
///
/// The caller owns the enclosing database transaction.
pub fn advance_txs(
    conn: &Connection,
    block: &Block,
    pipeline: &mut Pipeline<'_>,
) -> Result<BlockSummary> {
    let started = Instant::now();
    let height = block.header.height;
    let changes = timed(height, "classify", || classify(conn, block))?;

    let mut summary = BlockSummary {
        height,
        deleted_claims: changes.delete_claims.len(),
        expired_claims: changes.expired,
        deleted_supports: changes.delete_supports.len(),
        ..BlockSummary::default()
    };

    let affected_channels = timed(height, "delete_claims", || {
        Ok(claims::delete(conn, &changes.delete_claims)?)
    })?;
    timed(height, "delete_supports", || {
        Ok(supports::delete(conn, &changes.delete_supports)?)
    })?;

    let inserts: Vec<ClaimRecord> = changes
        .insert_claims
        .iter()
        .filter_map(|output| claim_record(output, &block.header, pipeline.chain))
        .collect();
    summary.inserted_claims = timed(height, "insert_claims", || Ok(claims::insert(conn, &inserts)?))?;

    let updates: Vec<ClaimRecord> = changes
        .update_claims
        .iter()
        .filter_map(|output| claim_record(output, &block.header, pipeline.chain))
        .collect();
    summary.updated_claims = updates.len();
    timed(height, "update_claims", || Ok(claims::update(conn, &updates)?))?;

    summary.signatures = timed(height, "validate_channel_signatures", || {
        validate_channel_signatures(
            conn,
            height,
            &changes.insert_claims,
            &changes.update_claims,
            &changes.delete_claims,
            &affected_channels,
            pipeline.verifier,
        )
    })?;

    let new_supports: Vec<SupportRecord> = changes
        .insert_supports
        .iter()
        .filter_map(support_record)
        .collect();
    summary.inserted_supports = new_supports.len();
    timed(height, "insert_supports", || Ok(supports::insert(conn, &new_supports)?))?;

    summary.takeovers = update_claimtrie(
        conn,
        height,
        &changes.recalculate,
        &changes.deleted_names,
        pipeline.chain.activation_delay(),
    )?;

    timed(height, "calculate_trending", || {
        pipeline.trending.calculate(
            conn,
            height,
            pipeline.is_first_sync,
            pipeline.chain_tip_height,
            &changes.recalculate,
        )
    })?;

    info!(
        height,
        txs = block.transactions.len(),
        claims_inserted = summary.inserted_claims,
        claims_updated = summary.updated_claims,
        claims_deleted = summary.deleted_claims,
        claims_expired = summary.expired_claims,
        supports_inserted = summary.inserted_supports,
        supports_deleted = summary.deleted_supports,
        takeovers = summary.takeovers.len(),
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "block advanced"
    );
    Ok(summary)
}

fn classify<'a>(conn: &Connection, block: &'a Block) -> Result<Changes<'a>> {
    let mut changes = Changes::default();

    for tx in &block.transactions {
        let spent: Vec<TxoHash> = tx.inputs.iter().filter_map(|input| input.txo_ref).collect();
        let split = claims::split_inputs(conn, &spent)?;
        for claim in split.claims {
            changes.delete_claims.insert(claim.claim_hash);
            changes.deleted_names.insert(claim.normalized);
        }
        for support in split.supports {
            changes.delete_supports.push(support.txo_hash);
            changes.recalculate.insert(support.claim_hash);
        }
        changes.spent_other.extend(split.other);

        for output in tx.output_refs() {
            let Some(claim_hash) = output.claim_hash() else {
                continue;
            };
            if output.is_support_claim() {
                changes.insert_supports.push(output);
            } else if output.is_claim_name() {
                changes.insert_claims.push(output);
            } else if output.is_update_claim() {
                changes.update_claims.push(output);
            } else {
                continue;
            }
            changes.recalculate.insert(claim_hash);
        }
    }

    // Outputs created and spent inside this block never reach the index.
    let spent_here: BTreeSet<ClaimHash> = changes
        .insert_claims
        .iter()
        .filter(|output| changes.spent_other.contains(&output.txo_hash()))
        .filter_map(|output| output.claim_hash())
        .collect();
    let spent_other = &changes.spent_other;
    changes
        .insert_claims
        .retain(|output| !spent_other.contains(&output.txo_hash()));
    changes
        .insert_supports
        .retain(|output| !spent_other.contains(&output.txo_hash()));
    // An update whose output is spent again in this block is an abandon.
    changes
        .update_claims
        .retain(|output| !spent_other.contains(&output.txo_hash()));
    for claim_hash in changes.update_claims.iter().filter_map(|output| output.claim_hash()) {
        changes.delete_claims.remove(&claim_hash);
    }

    // A claim created and then updated in this block is stored at its
    // latest unspent output.
    if !spent_here.is_empty() {
        let (revived, updates): (Vec<_>, Vec<_>) = changes
            .update_claims
            .drain(..)
            .partition(|output| output.claim_hash().is_some_and(|h| spent_here.contains(&h)));
        changes.update_claims = updates;
        changes.insert_claims.extend(
            revived
                .into_iter()
                .filter(|output| !spent_other.contains(&output.txo_hash())),
        );
    }

    for (claim_hash, normalized) in claims::expiring_at(conn, block.header.height)? {
        if changes.delete_claims.insert(claim_hash) {
            changes.expired += 1;
        }
        changes.deleted_names.insert(normalized);
    }

    debug!(
        height = block.header.height,
        insert_claims = changes.insert_claims.len(),
        update_claims = changes.update_claims.len(),
        delete_claims = changes.delete_claims.len(),
        insert_supports = changes.insert_supports.len(),
        delete_supports = changes.delete_supports.len(),
        "classified block"
    );
    Ok(changes)
}
