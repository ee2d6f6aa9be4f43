//! Domain-separated BLAKE3 hashing.
//!
//! Every derived value uses BLAKE3's key derivation mode with one of the
//! registered context strings below, so hashes of the same bytes in different
//! roles never collide.

/// Registered BLAKE3 context strings.
pub mod contexts {
    pub const PUBLIC_KEY_HASH: &str = "claimtrie v1 public-key-hash";
    pub const CLAIM_HASH: &str = "claimtrie v1 claim-hash";
    pub const SIGNATURE_DIGEST: &str = "claimtrie v1 signature-digest";
}

/// Plain BLAKE3, used for synthetic transaction hashes.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// BLAKE3 in key derivation mode under `context`.
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}

/// 20-byte hash of a channel public key, stored as `public_key_hash`.
pub fn public_key_hash(public_key: &[u8]) -> [u8; 20] {
    truncate(derive_key(contexts::PUBLIC_KEY_HASH, public_key))
}

/// Claim hash for a claim created by the output `txo_hash`.
///
/// Transaction parsers own claim hash assignment; this is the scheme used by
/// the replay tool and test fixtures.
pub fn claim_hash(txo_hash: &[u8]) -> [u8; 20] {
    truncate(derive_key(contexts::CLAIM_HASH, txo_hash))
}

/// Digest a channel signs for a claim.
///
/// `digest = derive_key(SIGNATURE_DIGEST, LE32-prefixed(first_input || channel_hash || claim_bytes))`
pub fn signature_digest(first_input: &[u8], channel_hash: &[u8], claim_bytes: &[u8]) -> [u8; 32] {
    derive_key(
        contexts::SIGNATURE_DIGEST,
        &encode_multi_field(&[first_input, channel_hash, claim_bytes]),
    )
}

/// Length-prefixed concatenation, so field boundaries stay unambiguous.
///
/// `LE32(len(field1)) || field1 || LE32(len(field2)) || field2 || ...`
fn encode_multi_field(fields: &[&[u8]]) -> Vec<u8> {
    let total_len: usize = fields.iter().map(|f| 4 + f.len()).sum();
    let mut output = Vec::with_capacity(total_len);
    for field in fields {
        output.extend_from_slice(&(field.len() as u32).to_le_bytes());
        output.extend_from_slice(field);
    }
    output
}

fn truncate(full: [u8; 32]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&full[..20]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash(b"claim"), hash(b"claim"));
        assert_ne!(hash(b"input1"), hash(b"input2"));
    }

    #[test]
    fn test_domain_separation() {
        let data = [7u8; 36];
        assert_ne!(claim_hash(&data), public_key_hash(&data));
        assert_eq!(&public_key_hash(&data)[..], &derive_key(contexts::PUBLIC_KEY_HASH, &data)[..20]);
    }

    #[test]
    fn test_signature_digest_binds_fields() {
        let a = signature_digest(b"in", b"chan", b"claim");
        let b = signature_digest(b"in", b"chan", b"claim2");
        let c = signature_digest(b"inc", b"han", b"claim");
        assert_ne!(a, b);
        assert_ne!(a, c, "length prefixes keep field boundaries");
    }

    #[test]
    fn test_multi_field_encoding() {
        let encoded = encode_multi_field(&[b"hello", b"world"]);
        assert_eq!(encoded.len(), 4 + 5 + 4 + 5);
        assert_eq!(&encoded[0..4], &5u32.to_le_bytes());
        assert_eq!(&encoded[4..9], b"hello");
        assert_eq!(&encoded[13..18], b"world");
    }
}
