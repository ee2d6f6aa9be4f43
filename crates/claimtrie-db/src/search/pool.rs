//! Pool of read-only readers driven from async code.
//!
//! Each request borrows an idle [`Reader`] (or opens a new one) on a tokio
//! blocking thread, so searches run concurrently with each other and with
//! the single writer.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::constraints::Constraints;
use super::reader::{Reader, ReaderConfig, ResolveOutcome, SearchResult};
use crate::{DbError, Result};

#[derive(Clone)]
pub struct ReaderPool {
    path: PathBuf,
    cache_size_kib: u32,
    config: ReaderConfig,
    idle: Arc<Mutex<Vec<Reader>>>,
}

impl ReaderPool {
    pub fn new(path: impl Into<PathBuf>, cache_size_kib: u32, config: ReaderConfig) -> Self {
        Self {
            path: path.into(),
            cache_size_kib,
            config,
            idle: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Readers currently parked in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    pub async fn search(&self, constraints: Constraints) -> Result<SearchResult> {
        self.with_reader(move |reader| reader.search(&constraints))
            .await
    }

    pub async fn resolve(&self, urls: Vec<String>) -> Result<ResolveOutcome> {
        self.with_reader(move |reader| reader.resolve(&urls)).await
    }

    async fn with_reader<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Reader) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || {
            let reader = match pool.idle.lock().ok().and_then(|mut idle| idle.pop()) {
                Some(reader) => reader,
                None => Reader::open(&pool.path, pool.cache_size_kib, pool.config.clone())?,
            };
            let result = f(&reader);
            if let Ok(mut idle) = pool.idle.lock() {
                if idle.len() < pool.config.pool_size {
                    idle.push(reader);
                }
            }
            result
        })
        .await
        .map_err(|e| DbError::Task(e.to_string()))?
    }
}
