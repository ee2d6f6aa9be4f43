//! # claimtrie-index
//!
//! The write side of the claim index: applies parsed blocks one at a time,
//! keeping claims, supports, channel signatures and controlling claims
//! consistent, and hands out readers for search and resolve.
//!
//! ## Modules
//!
//! - [`advancer`]: per-block classification and the fixed update order
//! - [`signatures`]: channel signature validation cascade
//! - [`takeover`]: activation heights and controlling-claim elections
//! - [`records`]: output to row conversion
//! - [`trending`]: external trending calculator seam
//! - [`config`]: TOML configuration

pub mod advancer;
pub mod config;
pub mod records;
pub mod signatures;
pub mod takeover;
pub mod trending;

use std::path::{Path, PathBuf};

use claimtrie_crypto::verifier::{Ed25519Verifier, SignatureVerifier};
use claimtrie_db::queries::sync;
use claimtrie_db::search::{Reader, ReaderPool};
use claimtrie_db::DbError;
use claimtrie_types::tx::Block;
use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

pub use advancer::BlockSummary;
pub use config::IndexConfig;
use trending::{NoTrending, TrendingCalculator};

/// Error types for index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("storage error: {0}")]
    Db(#[from] DbError),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// Blocks must be applied in order without gaps.
    #[error("block out of order: expected height {expected}, got {got}")]
    OutOfOrder { expected: u32, got: u32 },
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// A writable claim index.
///
/// Owns the single writer connection. Every block is applied inside one
/// immediate transaction, so readers never observe a partially applied block.
pub struct ClaimIndex {
    conn: Connection,
    path: PathBuf,
    config: IndexConfig,
    verifier: Box<dyn SignatureVerifier>,
    trending: Box<dyn TrendingCalculator>,
    /// Height of the last applied block, as recorded in the index.
    height: Option<u32>,
    first_sync: bool,
}

impl ClaimIndex {
    /// Open (creating and migrating if needed) the index at
    /// `config.storage.db_path`.
    pub fn open(config: IndexConfig) -> Result<Self> {
        let path = config.storage.db_path.clone();
        let conn = claimtrie_db::open(&path, config.storage.cache_size_kib)?;
        let height = sync::height(&conn)?;
        info!(path = %path.display(), height = ?height, "claim index opened");
        Ok(Self {
            conn,
            path,
            config,
            verifier: Box::new(Ed25519Verifier),
            trending: Box::new(NoTrending),
            height,
            first_sync: height.is_none(),
        })
    }

    pub fn with_verifier(mut self, verifier: impl SignatureVerifier + 'static) -> Self {
        self.verifier = Box::new(verifier);
        self
    }

    pub fn with_trending(mut self, trending: impl TrendingCalculator + 'static) -> Self {
        self.trending = Box::new(trending);
        self
    }

    /// Apply `block`, which must directly follow the previous one.
    ///
    /// `chain_tip_height` is the best height known to the caller and is
    /// passed through to the trending calculator. On error nothing of the
    /// block is kept.
    pub fn advance_block(&mut self, block: &Block, chain_tip_height: u32) -> Result<BlockSummary> {
        let got = block.header.height;
        if let Some(expected) = self.height.map(|last| last.saturating_add(1)) {
            if got != expected {
                return Err(IndexError::OutOfOrder { expected, got });
            }
        }

        if self.first_sync && got >= chain_tip_height {
            info!(height = got, "caught up with chain tip");
            self.first_sync = false;
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut pipeline = advancer::Pipeline {
            chain: &self.config.chain,
            verifier: self.verifier.as_ref(),
            trending: self.trending.as_mut(),
            is_first_sync: self.first_sync,
            chain_tip_height,
        };
        let summary = advancer::advance_txs(&tx, block, &mut pipeline)?;
        sync::set_height(&tx, got)?;
        tx.commit()?;
        self.height = Some(got);
        Ok(summary)
    }

    /// Height of the last applied block, surviving reopen.
    pub fn height(&self) -> Option<u32> {
        self.height
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The writer connection, for inspection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// A new read-only reader on this index.
    pub fn reader(&self) -> Result<Reader> {
        Ok(Reader::open(
            &self.path,
            self.config.storage.cache_size_kib,
            self.config.reader.clone(),
        )?)
    }

    /// A pool of readers for concurrent async search and resolve.
    pub fn reader_pool(&self) -> ReaderPool {
        ReaderPool::new(
            self.path.clone(),
            self.config.storage.cache_size_kib,
            self.config.reader.clone(),
        )
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| IndexError::Sqlite(e))?;
        info!(path = %self.path.display(), "claim index closed");
        Ok(())
    }
}
