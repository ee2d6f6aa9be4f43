//! Integration tests for the claim index.
//!
//! [`TestChain`] queues synthetic transactions, mines them into consecutive
//! blocks and applies each block to a fresh on-disk index. The scenarios in
//! `tests/` drive it and inspect the resulting rows.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p claimtrie-integration-tests
//! ```

use claimtrie_crypto::blake3;
use claimtrie_crypto::ed25519::KeyPair;
use claimtrie_db::queries::claims;
use claimtrie_db::queries::claimtrie::{self, TrieEntry};
use claimtrie_db::rows::ClaimRow;
use claimtrie_db::search::Reader;
use claimtrie_index::config::ChainConfig;
use claimtrie_index::{BlockSummary, ClaimIndex, IndexConfig};
use claimtrie_types::claim::{
    Channel, ChannelSignature, Claim, ClaimKind, ClaimMessage, Repost, Stream,
};
use claimtrie_types::tx::{Block, BlockHeader, ClaimPayload, Input, Output, OutputScript, Transaction};
use claimtrie_types::{txo_hash, ClaimHash, TxHash, TxoHash};
use tempfile::TempDir;

/// A claim output created by the test chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Txo {
    pub txo_hash: TxoHash,
    pub claim_hash: ClaimHash,
    pub name: String,
}

impl Txo {
    pub fn claim_id(&self) -> String {
        claimtrie_types::claim_id(&self.claim_hash)
    }
}

/// Deterministic Ed25519 channel key.
pub fn key(seed: u8) -> KeyPair {
    KeyPair::from_seed(&[seed; 32])
}

pub fn stream() -> Claim {
    stream_with(&[], &[])
}

/// A video stream carrying the given tags and languages.
pub fn stream_with(tags: &[&str], languages: &[&str]) -> Claim {
    Claim {
        kind: ClaimKind::Stream(Stream {
            media_type: Some("video/mp4".into()),
            release_time: None,
            fee: None,
        }),
        message: ClaimMessage {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            languages: languages.iter().map(|l| l.to_string()).collect(),
            locations: vec![],
        },
        signing: None,
    }
}

pub fn channel(key: &KeyPair) -> Claim {
    Claim {
        kind: ClaimKind::Channel(Channel {
            public_key_bytes: key.verifying_key.as_bytes().to_vec(),
        }),
        message: ClaimMessage::default(),
        signing: None,
    }
}

pub fn repost(target: &Txo) -> Claim {
    Claim {
        kind: ClaimKind::Repost(Repost {
            claim_hash: target.claim_hash,
        }),
        message: ClaimMessage::default(),
        signing: None,
    }
}

/// Builds blocks and applies them to a temporary index.
pub struct TestChain {
    pub index: ClaimIndex,
    _dir: TempDir,
    next_height: u32,
    pending: Vec<Transaction>,
    counter: u64,
}

impl TestChain {
    /// A chain whose first block will be `start_height`.
    pub fn new(start_height: u32) -> Self {
        Self::with_chain(start_height, ChainConfig::default())
    }

    pub fn with_chain(start_height: u32, chain: ChainConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = IndexConfig::default();
        config.storage.db_path = dir.path().join("claims.db");
        config.storage.cache_size_kib = 1024;
        config.chain = chain;
        let index = ClaimIndex::open(config).expect("open index");
        Self {
            index,
            _dir: dir,
            next_height: start_height,
            pending: Vec::new(),
            counter: 0,
        }
    }

    /// Close the index and open it again from disk.
    pub fn reopen(&mut self) {
        let config = self.index.config().clone();
        let fresh = ClaimIndex::open(config).expect("reopen index");
        let previous = std::mem::replace(&mut self.index, fresh);
        previous.close().expect("close index");
    }

    /// Height of the block the next `mine` produces.
    pub fn next_height(&self) -> u32 {
        self.next_height
    }

    pub fn create(&mut self, name: &str, amount: i64, claim: Claim) -> Txo {
        let funding = self.funding();
        let claim_hash = blake3::claim_hash(&funding);
        self.push_claim(
            vec![funding],
            OutputScript::ClaimName {
                name: name.into(),
                claim_hash,
            },
            amount,
            ClaimPayload::Decoded(claim),
        )
    }

    /// Create a claim signed by `channel` with `key`.
    pub fn create_signed(
        &mut self,
        name: &str,
        amount: i64,
        claim: Claim,
        channel: &Txo,
        key: &KeyPair,
    ) -> Txo {
        let funding = self.funding();
        let claim_hash = blake3::claim_hash(&funding);
        let claim = sign(claim, &funding, channel, key);
        self.push_claim(
            vec![funding],
            OutputScript::ClaimName {
                name: name.into(),
                claim_hash,
            },
            amount,
            ClaimPayload::Decoded(claim),
        )
    }

    /// Create a claim whose payload fails to decode.
    pub fn create_undecodable(&mut self, name: &str, amount: i64) -> Txo {
        let funding = self.funding();
        let claim_hash = blake3::claim_hash(&funding);
        self.push_claim(
            vec![funding],
            OutputScript::ClaimName {
                name: name.into(),
                claim_hash,
            },
            amount,
            ClaimPayload::Undecodable("invalid wire type".into()),
        )
    }

    /// Move `prev` to a new output with new content.
    pub fn update(&mut self, prev: &Txo, amount: i64, claim: Claim) -> Txo {
        self.push_claim(
            vec![prev.txo_hash],
            OutputScript::UpdateClaim {
                name: prev.name.clone(),
                claim_hash: prev.claim_hash,
            },
            amount,
            ClaimPayload::Decoded(claim),
        )
    }

    pub fn update_signed(
        &mut self,
        prev: &Txo,
        amount: i64,
        claim: Claim,
        channel: &Txo,
        key: &KeyPair,
    ) -> Txo {
        let claim = sign(claim, &prev.txo_hash, channel, key);
        self.update(prev, amount, claim)
    }

    /// Support `target` with `amount`; returns the support output.
    pub fn support(&mut self, target: &Txo, amount: i64) -> TxoHash {
        let funding = self.funding();
        let txo = self.push_claim(
            vec![funding],
            OutputScript::SupportClaim {
                name: target.name.clone(),
                claim_hash: target.claim_hash,
            },
            amount,
            ClaimPayload::None,
        );
        txo.txo_hash
    }

    /// Spend an output without creating anything (abandon).
    pub fn spend(&mut self, txo_hash: TxoHash) {
        let hash = self.next_tx_hash();
        self.pending.push(Transaction {
            hash,
            height: self.next_height,
            position: self.position(),
            inputs: vec![Input {
                txo_ref: Some(txo_hash),
            }],
            outputs: vec![Output {
                nout: 0,
                amount: 1,
                script: OutputScript::Payment,
                payload: ClaimPayload::None,
            }],
        });
    }

    /// Mine the queued transactions into the next block.
    pub fn mine(&mut self) -> BlockSummary {
        self.mine_with(|_| {})
    }

    /// Mine after letting `arrange` reorder the block's transactions. Each
    /// transaction keeps the position it was queued with.
    pub fn mine_with(&mut self, arrange: impl FnOnce(&mut Vec<Transaction>)) -> BlockSummary {
        let height = self.next_height;
        let mut transactions = std::mem::take(&mut self.pending);
        arrange(&mut transactions);
        let block = Block {
            header: BlockHeader {
                height,
                timestamp: 1_500_000_000 + i64::from(height) * 150,
            },
            transactions,
        };
        let summary = self
            .index
            .advance_block(&block, height)
            .expect("advance block");
        self.next_height += 1;
        summary
    }

    /// Mine blocks until `height` has been applied.
    pub fn mine_to(&mut self, height: u32) -> Vec<BlockSummary> {
        let mut summaries = Vec::new();
        while self.next_height <= height {
            summaries.push(self.mine());
        }
        summaries
    }

    pub fn row(&self, txo: &Txo) -> ClaimRow {
        claims::get(self.index.connection(), &txo.claim_hash).expect("claim row")
    }

    pub fn exists(&self, txo: &Txo) -> bool {
        claims::exists(self.index.connection(), &txo.claim_hash).expect("exists")
    }

    pub fn controlling(&self, name: &str) -> Option<TrieEntry> {
        claimtrie::get(self.index.connection(), name).expect("claimtrie entry")
    }

    pub fn reader(&self) -> Reader {
        self.index.reader().expect("reader")
    }

    /// Every consensus-relevant column, one line per row, in key order.
    pub fn snapshot(&self) -> Vec<String> {
        let conn = self.index.connection();
        let mut lines = dump(
            conn,
            "SELECT hex(claim_hash), hex(txo_hash), amount, support_amount, effective_amount,
                    activation_height, expiration_height, signature_valid, channel_join,
                    short_url, canonical_url, claims_in_channel, hex(public_key_hash)
             FROM claim ORDER BY claim_hash",
        );
        lines.extend(dump(
            conn,
            "SELECT normalized, hex(claim_hash), last_take_over_height
             FROM claimtrie ORDER BY normalized",
        ));
        lines.extend(dump(
            conn,
            "SELECT hex(txo_hash), hex(claim_hash), amount FROM support ORDER BY txo_hash",
        ));
        lines
    }

    fn funding(&mut self) -> TxoHash {
        self.counter += 1;
        let mut seed = b"funding".to_vec();
        seed.extend_from_slice(&self.counter.to_le_bytes());
        txo_hash(&blake3::hash(&seed), 0)
    }

    fn next_tx_hash(&mut self) -> TxHash {
        self.counter += 1;
        let mut seed = b"tx".to_vec();
        seed.extend_from_slice(&self.counter.to_le_bytes());
        blake3::hash(&seed)
    }

    fn position(&self) -> u32 {
        u32::try_from(self.pending.len()).expect("block size")
    }

    fn push_claim(
        &mut self,
        inputs: Vec<TxoHash>,
        script: OutputScript,
        amount: i64,
        payload: ClaimPayload,
    ) -> Txo {
        let hash = self.next_tx_hash();
        let name = script_name(&script);
        let claim_hash = match &script {
            OutputScript::ClaimName { claim_hash, .. }
            | OutputScript::UpdateClaim { claim_hash, .. }
            | OutputScript::SupportClaim { claim_hash, .. } => *claim_hash,
            OutputScript::Payment => [0; 20],
        };
        self.pending.push(Transaction {
            hash,
            height: self.next_height,
            position: self.position(),
            inputs: inputs
                .into_iter()
                .map(|txo| Input { txo_ref: Some(txo) })
                .collect(),
            outputs: vec![Output {
                nout: 0,
                amount,
                script,
                payload,
            }],
        });
        Txo {
            txo_hash: txo_hash(&hash, 0),
            claim_hash,
            name,
        }
    }
}

fn script_name(script: &OutputScript) -> String {
    match script {
        OutputScript::ClaimName { name, .. }
        | OutputScript::UpdateClaim { name, .. }
        | OutputScript::SupportClaim { name, .. } => name.clone(),
        OutputScript::Payment => String::new(),
    }
}

/// Attach a channel signature over the unsigned claim.
fn sign(mut claim: Claim, first_input: &TxoHash, channel: &Txo, key: &KeyPair) -> Claim {
    claim.signing = None;
    let claim_bytes = serde_json::to_vec(&claim).expect("encode claim");
    let digest = blake3::signature_digest(first_input, &channel.claim_hash, &claim_bytes);
    claim.signing = Some(ChannelSignature {
        channel_hash: channel.claim_hash,
        signature: key.signing_key.sign(&digest).to_bytes().to_vec(),
        signature_digest: digest.to_vec(),
    });
    claim
}

fn dump(conn: &rusqlite::Connection, sql: &str) -> Vec<String> {
    let mut stmt = conn.prepare(sql).expect("prepare dump");
    let columns = stmt.column_count();
    let lines = stmt
        .query_map([], |row| {
            let values = (0..columns)
                .map(|i| row.get::<_, rusqlite::types::Value>(i).map(|v| format!("{v:?}")))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(values.join("|"))
        })
        .expect("query dump")
        .collect::<rusqlite::Result<Vec<_>>>()
        .expect("read dump");
    lines
}

/// A reproducible mix of creates, updates, supports, abandons, channel
/// signatures and key rotations.
pub struct Workload {
    state: u64,
    names: Vec<&'static str>,
    live: Vec<Txo>,
    channel: Option<Txo>,
    key_seed: u8,
}

impl Workload {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed,
            names: vec!["alpha", "beta", "gamma"],
            live: Vec::new(),
            channel: None,
            key_seed: 1,
        }
    }

    /// Queue one block's worth of transactions on `chain` and mine it.
    pub fn step(&mut self, chain: &mut TestChain) -> BlockSummary {
        let Some(channel_txo) = self.channel.clone() else {
            self.channel = Some(chain.create("@workload", 1, channel(&key(self.key_seed))));
            return chain.mine();
        };

        let mut touched: Vec<ClaimHash> = Vec::new();
        let mut created: Vec<Txo> = Vec::new();
        for _ in 0..4 {
            let roll = self.next();
            let name = self.names[(roll / 7) as usize % self.names.len()];
            let amount = 1 + (roll / 13 % 100) as i64;
            match roll % 7 {
                0 | 1 => created.push(chain.create(name, amount, stream())),
                2 => {
                    if let Some(target) = self.pick(&touched) {
                        chain.support(&target, amount);
                    }
                }
                3 => {
                    if let Some(target) = self.pick(&touched) {
                        touched.push(target.claim_hash);
                        chain.spend(target.txo_hash);
                        self.live.retain(|t| t.claim_hash != target.claim_hash);
                    }
                }
                4 => {
                    if let Some(target) = self.pick(&touched) {
                        touched.push(target.claim_hash);
                        let moved = chain.update(&target, amount, stream());
                        self.replace(moved);
                    }
                }
                5 => {
                    let signed =
                        chain.create_signed(name, amount, stream(), &channel_txo, &key(self.key_seed));
                    created.push(signed);
                }
                _ => {
                    if !touched.contains(&channel_txo.claim_hash) {
                        touched.push(channel_txo.claim_hash);
                        self.key_seed = self.key_seed.wrapping_add(1);
                        let moved = chain.update(&channel_txo, 1, channel(&key(self.key_seed)));
                        self.channel = Some(moved);
                    }
                }
            }
        }

        let summary = chain.mine();
        self.live.extend(created);
        summary
    }

    fn next(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.state >> 33
    }

    fn pick(&self, touched: &[ClaimHash]) -> Option<Txo> {
        let candidates: Vec<&Txo> = self
            .live
            .iter()
            .filter(|t| !touched.contains(&t.claim_hash))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let index = (self.state as usize) % candidates.len();
        Some(candidates[index].clone())
    }

    fn replace(&mut self, moved: Txo) {
        for txo in &mut self.live {
            if txo.claim_hash == moved.claim_hash {
                *txo = moved.clone();
            }
        }
    }
}
