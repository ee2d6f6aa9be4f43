//! Channel signature validation and its cascade to previously signed claims.

use std::collections::{BTreeMap, BTreeSet};

use claimtrie_crypto::verifier::SignatureVerifier;
use claimtrie_db::queries::channels::{self, SignatureUpdate};
use claimtrie_types::claim::Claim;
use claimtrie_types::tx::OutputRef;
use claimtrie_types::ClaimHash;
use rusqlite::Connection;
use tracing::debug;

use crate::Result;

/// Counters reported for the block summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CascadeSummary {
    /// Signature updates written, including cascaded rechecks.
    pub checked: usize,
    pub valid: usize,
    /// Channels whose key is new or different in this block.
    pub changed_keys: usize,
}

/// Revalidate signatures touched by block `height`.
///
/// Every new or updated signable claim is verified against its channel's key,
/// taken from this block when the channel was (re)published here and from the
/// index otherwise. Claims signed by a channel whose key changed are
/// rechecked. Claims signed by a channel in `spent_claims` lose their
/// signature validity.
pub fn validate_channel_signatures(
    conn: &Connection,
    height: u32,
    inserted: &[OutputRef<'_>],
    updated: &[OutputRef<'_>],
    spent_claims: &BTreeSet<ClaimHash>,
    affected_channels: &BTreeSet<ClaimHash>,
    verifier: &dyn SignatureVerifier,
) -> Result<CascadeSummary> {
    if inserted.is_empty() && updated.is_empty() && spent_claims.is_empty() {
        return Ok(CascadeSummary::default());
    }

    let mut new_channel_keys: BTreeMap<ClaimHash, Vec<u8>> = BTreeMap::new();
    let mut signables = Signables::default();
    for output in inserted.iter().chain(updated) {
        let (Some(claim_hash), Ok(claim)) = (output.claim_hash(), output.claim()) else {
            continue;
        };
        match claim.public_key_bytes() {
            Some(key) => {
                new_channel_keys.insert(claim_hash, key.to_vec());
            }
            None => signables.put(claim_hash, claim),
        }
    }

    let missing_channel_keys: BTreeSet<ClaimHash> = signables
        .iter()
        .filter_map(|(_, claim)| claim.signing_channel_hash())
        .filter(|channel| !new_channel_keys.contains_key(*channel))
        .copied()
        .collect();

    let lookup: BTreeSet<ClaimHash> = new_channel_keys
        .keys()
        .copied()
        .chain(missing_channel_keys)
        .chain(affected_channels.iter().copied())
        .collect();
    let mut all_channel_keys = channels::public_keys(conn, &lookup)?;

    let changed_channel_keys: BTreeSet<ClaimHash> = new_channel_keys
        .iter()
        .filter(|(channel, key)| match all_channel_keys.get(*channel) {
            Some(Some(stored)) => stored != *key,
            _ => true,
        })
        .map(|(channel, _)| *channel)
        .collect();
    for (channel, key) in &new_channel_keys {
        all_channel_keys.insert(*channel, Some(key.clone()));
    }

    let mut updates: Vec<SignatureUpdate> = signables
        .iter()
        .map(|(claim_hash, claim)| match &claim.signing {
            Some(signing) => SignatureUpdate {
                claim_hash: *claim_hash,
                channel_hash: Some(signing.channel_hash),
                signature: Some(signing.signature.clone()),
                signature_digest: Some(signing.signature_digest.clone()),
                signature_valid: Some(false),
            },
            None => SignatureUpdate::unsigned(*claim_hash),
        })
        .collect();
    updates.extend(channels::signed_by(
        conn,
        &changed_channel_keys,
        &signables.hashes(),
    )?);

    let mut summary = CascadeSummary {
        checked: updates.len(),
        changed_keys: changed_channel_keys.len(),
        ..CascadeSummary::default()
    };
    for update in &mut updates {
        let key = update
            .channel_hash
            .as_ref()
            .and_then(|channel| all_channel_keys.get(channel))
            .and_then(|key| key.as_deref());
        if let (Some(key), Some(signature), Some(digest)) =
            (key, &update.signature, &update.signature_digest)
        {
            let valid = verifier.verify(signature, digest, key);
            update.signature_valid = Some(valid);
            if valid {
                summary.valid += 1;
            }
        }
    }

    let previous_channels = channels::signing_channels(conn, &signables.hashes())?;
    channels::apply_signature_updates(conn, height, &updates)?;
    channels::invalidate_signed_by(conn, spent_claims)?;

    for (channel, key) in &new_channel_keys {
        let key_hash = claimtrie_crypto::blake3::public_key_hash(key);
        channels::set_public_key(conn, channel, key, &key_hash)?;
    }

    let touched: BTreeSet<ClaimHash> = all_channel_keys
        .keys()
        .copied()
        .chain(previous_channels)
        .collect();
    channels::update_claims_in_channel(conn, &touched)?;

    debug!(
        height,
        checked = summary.checked,
        valid = summary.valid,
        changed_keys = summary.changed_keys,
        "channel signatures"
    );
    Ok(summary)
}

/// Signable claims of the block in first-seen order; a later output for the
/// same claim replaces the earlier payload.
#[derive(Default)]
struct Signables<'a> {
    order: Vec<(ClaimHash, &'a Claim)>,
    index: BTreeMap<ClaimHash, usize>,
}

impl<'a> Signables<'a> {
    fn put(&mut self, claim_hash: ClaimHash, claim: &'a Claim) {
        match self.index.get(&claim_hash) {
            Some(&slot) => self.order[slot].1 = claim,
            None => {
                self.index.insert(claim_hash, self.order.len());
                self.order.push((claim_hash, claim));
            }
        }
    }

    fn iter(&self) -> impl Iterator<Item = &(ClaimHash, &'a Claim)> {
        self.order.iter()
    }

    fn hashes(&self) -> BTreeSet<ClaimHash> {
        self.index.keys().copied().collect()
    }
}
