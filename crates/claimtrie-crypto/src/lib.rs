//! # claimtrie-crypto
//!
//! Cryptographic collaborators of the claim index.
//!
//! The index never interprets signatures itself: it hands
//! `(signature, digest, public key)` triples to a [`verifier::SignatureVerifier`]
//! and stores the boolean outcome.
//!
//! ## Modules
//!
//! - [`blake3`]: domain-separated BLAKE3 hashing (public key hashes, test claim hashes)
//! - [`ed25519`]: Ed25519 keys and signatures (RFC 8032)
//! - [`verifier`]: the verification seam used by the signature cascade

pub mod blake3;
pub mod ed25519;
pub mod verifier;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Invalid key or signature length.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
