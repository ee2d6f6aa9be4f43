//! Signature verification seam used by the signature cascade.

use crate::ed25519::{Signature, VerifyingKey};

/// Verifies a channel signature over a claim's signature digest.
///
/// Implementations must be deterministic: the same triple always yields the
/// same answer, otherwise index replicas diverge.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, signature: &[u8], digest: &[u8], public_key: &[u8]) -> bool;
}

/// Ed25519 verification of raw key and signature bytes.
///
/// Malformed keys or signatures verify as `false`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, signature: &[u8], digest: &[u8], public_key: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_slice(public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify(digest, &signature).is_ok()
    }
}
