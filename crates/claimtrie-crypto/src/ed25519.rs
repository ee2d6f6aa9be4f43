//! Ed25519 channel keys and claim signatures (RFC 8032).
//!
//! A channel claim publishes a raw 32-byte verifying key and a signed claim
//! carries a raw 64-byte signature over its signature digest. Both arrive as
//! untrusted bytes from the chain, so every constructor checks lengths.

use ed25519_dalek::Signer;

use crate::{CryptoError, Result};

pub const PUBLIC_KEY_LENGTH: usize = ed25519_dalek::PUBLIC_KEY_LENGTH;
pub const SIGNATURE_LENGTH: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// Private key of a channel. `ed25519-dalek` wipes the secret on drop.
pub struct SigningKey(ed25519_dalek::SigningKey);

/// Public key of a channel as stored in `public_key_bytes`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

/// Signature over a claim's signature digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

/// Signing and verifying key of one channel.
pub struct KeyPair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl SigningKey {
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(seed))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    /// Sign a claim's signature digest.
    pub fn sign(&self, digest: &[u8]) -> Signature {
        Signature(self.0.sign(digest))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SigningKey").field(&self.verifying_key()).finish()
    }
}

impl VerifyingKey {
    /// Parse key bytes taken from a channel claim.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; PUBLIC_KEY_LENGTH] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: PUBLIC_KEY_LENGTH,
                actual: bytes.len(),
            })?;
        ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        self.0.as_bytes()
    }

    /// Strict verification of `signature` over `digest`.
    pub fn verify(&self, digest: &[u8], signature: &Signature) -> Result<()> {
        self.0
            .verify_strict(digest, &signature.0)
            .map_err(|_| CryptoError::SignatureVerification)
    }
}

impl Signature {
    /// Parse signature bytes taken from a signed claim.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; SIGNATURE_LENGTH] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: SIGNATURE_LENGTH,
                actual: bytes.len(),
            })?;
        Ok(Self(ed25519_dalek::Signature::from_bytes(bytes)))
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.0.to_bytes()
    }
}

impl KeyPair {
    /// Deterministic key pair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_seed(seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }
}
