//! Trending recalculation seam.
//!
//! The trending columns of `claim` are owned by an external calculator. The
//! index calls it last in every block, inside the block transaction, so its
//! writes commit or roll back together with the block.

use std::collections::BTreeSet;

use claimtrie_types::ClaimHash;
use rusqlite::Connection;

use crate::Result;

pub trait TrendingCalculator: Send {
    /// Recalculate trending scores after block `height` has been applied.
    ///
    /// `changed` holds every claim whose amounts or supports were recomputed
    /// in this block.
    fn calculate(
        &mut self,
        conn: &Connection,
        height: u32,
        is_first_sync: bool,
        chain_tip_height: u32,
        changed: &BTreeSet<ClaimHash>,
    ) -> Result<()>;
}

/// Leaves the trending columns untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTrending;

impl TrendingCalculator for NoTrending {
    fn calculate(
        &mut self,
        _conn: &Connection,
        _height: u32,
        _is_first_sync: bool,
        _chain_tip_height: u32,
        _changed: &BTreeSet<ClaimHash>,
    ) -> Result<()> {
        Ok(())
    }
}
