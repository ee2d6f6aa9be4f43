//! Read-only search and resolve over an index connection.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::{Duration, Instant};

use claimtrie_types::url::{Modifier, PathSegment, Url, UrlError};
use claimtrie_types::ClaimHash;
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::Map;

use super::compiler::{self, CompiledQuery, PageLimits, Predicate, QueryPlan};
use super::constraints::{Constraints, IntegerField, OrderBy, OrderField};
use crate::rows::{ClaimRow, CLAIM_COLUMNS};
use crate::{DbError, Result};

/// VM instructions between deadline checks.
const PROGRESS_STEPS: i32 = 100;

/// Read-side tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Per-query time budget.
    pub query_timeout_ms: u64,
    /// Idle readers kept by a [`super::ReaderPool`].
    pub pool_size: usize,
    pub default_limit: i64,
    pub max_limit: i64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 250,
            pool_size: 4,
            default_limit: 10,
            max_limit: 50,
        }
    }
}

impl ReaderConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_limit: self.default_limit,
            max_limit: self.max_limit,
        }
    }
}

/// Why one URL did not resolve.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Parse(#[from] UrlError),

    #[error("{0}")]
    Lookup(String),
}

/// Outcome of resolving a single URL.
pub type ResolveResult = std::result::Result<ClaimRow, ResolveError>;

/// One page of search results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub rows: Vec<ClaimRow>,
    /// Signing channels first, then repost targets.
    pub referenced: Vec<ClaimRow>,
    pub offset: i64,
    /// `None` when totals were not requested.
    pub total: Option<i64>,
}

/// Per-URL results of a batch resolve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub results: Vec<ResolveResult>,
    pub referenced: Vec<ClaimRow>,
}

pub struct Reader {
    conn: Connection,
    config: ReaderConfig,
}

impl Reader {
    pub fn new(conn: Connection, config: ReaderConfig) -> Self {
        Self { conn, config }
    }

    /// Open a read-only connection to the index at `path`.
    pub fn open(path: &Path, cache_size_kib: u32, config: ReaderConfig) -> Result<Self> {
        Ok(Self::new(crate::open_reader(path, cache_size_kib)?, config))
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Search with an untyped request map.
    pub fn search_json(&self, constraints: &Map<String, serde_json::Value>) -> Result<SearchResult> {
        self.search(&Constraints::from_json(constraints)?)
    }

    /// Run a search: total (unless `no_totals`), one page, and the rows the
    /// page refers to.
    pub fn search(&self, constraints: &Constraints) -> Result<SearchResult> {
        let mut constraints = constraints.clone();
        if let Some(channel) = constraints.channel.take() {
            match self.resolve_url(&channel)? {
                Ok(row) => constraints.channel_hash = Some(row.claim_hash),
                Err(ResolveError::Parse(err)) => return Err(DbError::Parse(err)),
                Err(ResolveError::Lookup(_)) => {
                    let plan = compiler::plan(&constraints, self.config.page_limits())?;
                    return Ok(SearchResult {
                        rows: Vec::new(),
                        referenced: Vec::new(),
                        offset: plan.offset,
                        total: (!constraints.no_totals).then_some(0),
                    });
                }
            }
        }

        let plan = compiler::plan(&constraints, self.config.page_limits())?;
        let total = if constraints.no_totals {
            None
        } else {
            Some(self.count(&plan.count())?)
        };
        let rows = self.rows(&plan.select(CLAIM_COLUMNS))?;
        let referenced = self.referenced_rows(&rows)?;
        tracing::debug!(rows = rows.len(), total = ?total, "search");
        Ok(SearchResult {
            rows,
            referenced,
            offset: plan.offset,
            total,
        })
    }

    /// Resolve a batch of URLs. A URL that fails to parse or match yields an
    /// error in its own slot; storage failures abort the batch.
    pub fn resolve(&self, urls: &[String]) -> Result<ResolveOutcome> {
        let results = urls
            .iter()
            .map(|url| self.resolve_url(url))
            .collect::<Result<Vec<_>>>()?;
        let found: Vec<ClaimRow> = results.iter().filter_map(|r| r.as_ref().ok()).cloned().collect();
        let referenced = self.referenced_rows(&found)?;
        Ok(ResolveOutcome {
            results,
            referenced,
        })
    }

    /// Resolve one URL to a claim.
    pub fn resolve_url(&self, raw: &str) -> Result<ResolveResult> {
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(err) => return Ok(Err(err.into())),
        };

        let mut channel = None;
        if let Some(segment) = &url.channel {
            let mut query = segment_constraints(segment);
            if segment.is_bare() {
                query.is_controlling = true;
            } else {
                query.order_by = vec![OrderBy::asc(OrderField::Integer(
                    IntegerField::CreationHeight,
                ))];
            }
            match self.first(&query)? {
                Some(row) => channel = Some(row),
                None => {
                    return Ok(Err(ResolveError::Lookup(format!(
                        "Could not find channel in \"{raw}\"."
                    ))))
                }
            }
        }

        let Some(segment) = &url.stream else {
            return Ok(channel.ok_or_else(|| ResolveError::Lookup(format!("Could not find claim in \"{raw}\"."))));
        };
        let mut query = segment_constraints(segment);
        match &channel {
            Some(channel) => {
                query.order_by = if segment.is_bare() {
                    vec![
                        OrderBy::desc(OrderField::Integer(IntegerField::EffectiveAmount)),
                        OrderBy::asc(OrderField::Integer(IntegerField::Height)),
                    ]
                } else {
                    vec![OrderBy::asc(OrderField::Integer(IntegerField::ChannelJoin))]
                };
                query.channel_hash = Some(channel.claim_hash);
                query.has_channel_signature = true;
                query.signature_valid = Some(true);
            }
            None if segment.is_bare() => query.is_controlling = true,
            None => {}
        }
        Ok(self.first(&query)?.ok_or_else(|| {
            ResolveError::Lookup(format!("Could not find stream in \"{raw}\"."))
        }))
    }

    /// First row matching `constraints`, or `None`.
    fn first(&self, constraints: &Constraints) -> Result<Option<ClaimRow>> {
        let mut plan = compiler::plan(constraints, self.config.page_limits())?;
        if constraints.sequence.is_none() && constraints.amount_order.is_none() {
            plan.limit = 1;
        }
        Ok(self.rows(&plan.select(CLAIM_COLUMNS))?.into_iter().next())
    }

    /// Channels signing `rows` (and the reposted claims' channels), then the
    /// reposted claims themselves.
    fn referenced_rows(&self, rows: &[ClaimRow]) -> Result<Vec<ClaimRow>> {
        let repost_hashes: BTreeSet<ClaimHash> = rows.iter().filter_map(ClaimRow::reposted).collect();
        let mut channel_hashes: BTreeSet<ClaimHash> =
            rows.iter().filter_map(ClaimRow::channel).collect();

        let reposted = self.rows_by_hash(&repost_hashes)?;
        channel_hashes.extend(reposted.iter().filter_map(ClaimRow::channel));
        let mut referenced = self.rows_by_hash(&channel_hashes)?;
        referenced.extend(reposted);
        Ok(referenced)
    }

    fn rows_by_hash(&self, hashes: &BTreeSet<ClaimHash>) -> Result<Vec<ClaimRow>> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }
        let plan = QueryPlan {
            predicates: vec![Predicate::In {
                column: "claim.claim_hash",
                values: hashes.iter().map(|h| Value::Blob(h.to_vec())).collect(),
            }],
            order_by: vec![OrderBy::asc(OrderField::ClaimHash)],
            limit: i64::try_from(hashes.len()).unwrap_or(i64::MAX),
            offset: 0,
        };
        self.rows(&plan.select(CLAIM_COLUMNS))
    }

    /// Start the time budget for the next statement.
    fn arm_timeout(&self) {
        let deadline = Instant::now() + self.config.query_timeout();
        self.conn
            .progress_handler(PROGRESS_STEPS, Some(move || Instant::now() >= deadline));
    }

    fn rows(&self, query: &CompiledQuery) -> Result<Vec<ClaimRow>> {
        self.arm_timeout();
        let run = || -> rusqlite::Result<Vec<ClaimRow>> {
            let mut stmt = self.conn.prepare_cached(&query.sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(query.params.iter()), ClaimRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        };
        run().map_err(|err| self.query_error(query, err))
    }

    fn count(&self, query: &CompiledQuery) -> Result<i64> {
        self.arm_timeout();
        self.conn
            .query_row(
                &query.sql,
                rusqlite::params_from_iter(query.params.iter()),
                |row| row.get(0),
            )
            .map_err(|err| self.query_error(query, err))
    }

    fn query_error(&self, query: &CompiledQuery, err: rusqlite::Error) -> DbError {
        let sql = query.interpolated();
        match err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::OperationInterrupted =>
            {
                tracing::warn!(
                    timeout_ms = self.config.query_timeout_ms,
                    %sql,
                    "query interrupted"
                );
                DbError::QueryTimeout { sql }
            }
            source => {
                tracing::error!(%sql, error = %source, "query failed");
                DbError::Storage { sql, source }
            }
        }
    }
}

/// Constraints selecting claims named like `segment`, honoring its modifier.
fn segment_constraints(segment: &PathSegment) -> Constraints {
    let mut query = Constraints {
        name: Some(segment.name.clone()),
        ..Default::default()
    };
    match &segment.modifier {
        Some(Modifier::ClaimId(claim_id)) => query.claim_id = Some(claim_id.clone()),
        Some(Modifier::Sequence(n)) => query.sequence = Some(*n),
        Some(Modifier::AmountOrder(n)) => query.amount_order = Some(*n),
        None => {}
    }
    query
}
