//! Read side: faceted search and URL resolution.
//!
//! Requests arrive as [`constraints::Constraints`], are planned into typed
//! predicates by [`compiler`], and run by a [`reader::Reader`] under a
//! per-query time budget.

pub mod compiler;
pub mod constraints;
pub mod pool;
pub mod reader;

pub use constraints::Constraints;
pub use pool::ReaderPool;
pub use reader::{Reader, ReaderConfig, ResolveError, ResolveOutcome, ResolveResult, SearchResult};
