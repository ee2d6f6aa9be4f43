//! Database query functions organized by table family.
//!
//! Every function here runs on the caller's connection and inside whatever
//! transaction the caller holds; none of them begin or commit.

pub mod attributes;
pub mod channels;
pub mod claims;
pub mod claimtrie;
pub mod supports;
pub mod sync;

/// `?, ?, ?` for an `IN (...)` list of `n` values.
pub(crate) fn placeholders(n: usize) -> String {
    let mut out = String::with_capacity(n * 3);
    for i in 0..n {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('?');
    }
    out
}
