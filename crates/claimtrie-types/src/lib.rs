//! # claimtrie-types
//!
//! Shared domain types for the claim trie index.
//!
//! Transactions arrive here already parsed: every output carries its script
//! classification and, for claims, a decoded (or undecodable) claim payload.
//! Nothing in this crate touches storage.

pub mod amount;
pub mod claim;
pub mod media;
pub mod tags;
pub mod tx;
pub mod url;

/// 20-byte claim identifier as stored in the index.
pub type ClaimHash = [u8; 20];
/// 32-byte transaction hash (internal byte order).
pub type TxHash = [u8; 32];
/// Transaction output reference: `tx_hash || le_u32(nout)`.
pub type TxoHash = [u8; 36];
pub type Bytes = Vec<u8>;

/// Length of a hex claim id.
pub const CLAIM_ID_LEN: usize = 40;

/// Maximum number of elements honoured in any tag/language/location filter.
pub const ATTRIBUTE_ARRAY_MAX_LENGTH: usize = 100;

/// Render a claim hash as its public hex claim id (byte-reversed).
pub fn claim_id(claim_hash: &ClaimHash) -> String {
    let mut reversed = *claim_hash;
    reversed.reverse();
    hex::encode(reversed)
}

/// Parse a full 40-character claim id back into a claim hash.
pub fn claim_hash_from_id(claim_id: &str) -> Option<ClaimHash> {
    let mut bytes: ClaimHash = hex::decode(claim_id).ok()?.try_into().ok()?;
    bytes.reverse();
    Some(bytes)
}

/// Build the output reference for `nout` of the transaction with `tx_hash`.
pub fn txo_hash(tx_hash: &TxHash, nout: u32) -> TxoHash {
    let mut out = [0u8; 36];
    out[..32].copy_from_slice(tx_hash);
    out[32..].copy_from_slice(&nout.to_le_bytes());
    out
}

/// Parse a display txid (hex, byte-reversed) into an internal tx hash.
pub fn tx_hash_from_txid(txid: &str) -> Option<TxHash> {
    let mut bytes: TxHash = hex::decode(txid).ok()?.try_into().ok()?;
    bytes.reverse();
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_id_is_reversed_hex() {
        let mut hash = [0u8; 20];
        hash[0] = 0xab;
        hash[19] = 0x01;
        let id = claim_id(&hash);
        assert_eq!(id.len(), CLAIM_ID_LEN);
        assert!(id.starts_with("01"));
        assert!(id.ends_with("ab"));
        assert_eq!(claim_hash_from_id(&id), Some(hash));
    }

    #[test]
    fn test_claim_hash_from_bad_id() {
        assert_eq!(claim_hash_from_id("abc"), None);
        assert_eq!(claim_hash_from_id("zz"), None);
    }

    #[test]
    fn test_txo_hash_layout() {
        let tx = [7u8; 32];
        let txo = txo_hash(&tx, 2);
        assert_eq!(&txo[..32], &tx);
        assert_eq!(&txo[32..], &[2, 0, 0, 0]);
    }

    #[test]
    fn test_txid_parsing() {
        let mut tx = [0u8; 32];
        tx[31] = 0xff;
        let txid = hex::encode({
            let mut r = tx;
            r.reverse();
            r
        });
        assert!(txid.starts_with("ff"));
        assert_eq!(tx_hash_from_txid(&txid), Some(tx));
    }
}
