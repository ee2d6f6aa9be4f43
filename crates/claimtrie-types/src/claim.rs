//! Decoded claim payloads.
//!
//! A claim is exactly one of stream, channel or repost; the variant is
//! checked once when an output is classified and each carries only its own
//! fields.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::media::{guess_stream_type, ClaimType, StreamType};
use crate::{amount, tags, ClaimHash};

/// Failure to obtain a claim payload from an output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("claim payload could not be decoded: {0}")]
    Undecodable(String),

    #[error("output carries no claim payload")]
    Missing,
}

/// A decoded claim payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub kind: ClaimKind,
    #[serde(default)]
    pub message: ClaimMessage,
    /// Present when the claim declares a signing channel.
    #[serde(default)]
    pub signing: Option<ChannelSignature>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaimKind {
    Stream(Stream),
    Channel(Channel),
    Repost(Repost),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    #[serde(default)]
    pub media_type: Option<String>,
    /// Unix seconds; falls back to the block timestamp when absent.
    #[serde(default)]
    pub release_time: Option<i64>,
    #[serde(default)]
    pub fee: Option<Fee>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub currency: String,
    /// Decimal amount as published, e.g. `"1.5"`.
    pub amount: String,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    #[serde_as(as = "Hex")]
    pub public_key_bytes: Vec<u8>,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repost {
    #[serde_as(as = "Hex")]
    pub claim_hash: ClaimHash,
}

/// Free-form metadata used only for search facets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimMessage {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
}

/// Signature over the claim by a channel key.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSignature {
    #[serde_as(as = "Hex")]
    pub channel_hash: ClaimHash,
    #[serde_as(as = "Hex")]
    pub signature: Vec<u8>,
    /// Digest the signature commits to.
    #[serde_as(as = "Hex")]
    pub signature_digest: Vec<u8>,
}

impl Claim {
    pub fn is_stream(&self) -> bool {
        matches!(self.kind, ClaimKind::Stream(_))
    }

    pub fn is_channel(&self) -> bool {
        matches!(self.kind, ClaimKind::Channel(_))
    }

    pub fn is_repost(&self) -> bool {
        matches!(self.kind, ClaimKind::Repost(_))
    }

    pub fn is_signed(&self) -> bool {
        self.signing.is_some()
    }

    pub fn signing_channel_hash(&self) -> Option<&ClaimHash> {
        self.signing.as_ref().map(|s| &s.channel_hash)
    }

    pub fn claim_type(&self) -> ClaimType {
        match self.kind {
            ClaimKind::Stream(_) => ClaimType::Stream,
            ClaimKind::Channel(_) => ClaimType::Channel,
            ClaimKind::Repost(_) => ClaimType::Repost,
        }
    }

    /// The channel public key, for channel claims.
    pub fn public_key_bytes(&self) -> Option<&[u8]> {
        match &self.kind {
            ClaimKind::Channel(channel) => Some(&channel.public_key_bytes),
            _ => None,
        }
    }

    /// Normalized tags (see [`tags::clean_tags`]).
    pub fn clean_tags(&self) -> Vec<String> {
        tags::clean_tags(&self.message.tags)
    }
}

impl Stream {
    pub fn stream_type(&self) -> StreamType {
        guess_stream_type(self.media_type.as_deref().unwrap_or_default())
    }

    /// Lower-cased currency and fixed-point amount, if the fee is well formed.
    pub fn fee_scaled(&self) -> (Option<String>, i64) {
        match &self.fee {
            Some(fee) => (
                Some(fee.currency.to_lowercase()),
                amount::parse_scaled(&fee.amount).unwrap_or(0),
            ),
            None => (None, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_claim() -> Claim {
        Claim {
            kind: ClaimKind::Stream(Stream {
                media_type: Some("video/mp4".into()),
                release_time: None,
                fee: Some(Fee {
                    currency: "USD".into(),
                    amount: "2.5".into(),
                }),
            }),
            message: ClaimMessage {
                tags: vec!["Cats".into(), "cats".into()],
                ..Default::default()
            },
            signing: None,
        }
    }

    #[test]
    fn test_stream_accessors() {
        let claim = stream_claim();
        assert!(claim.is_stream());
        assert!(!claim.is_signed());
        assert_eq!(claim.claim_type(), ClaimType::Stream);
        assert_eq!(claim.clean_tags(), vec!["cats".to_string()]);
        let ClaimKind::Stream(stream) = &claim.kind else {
            unreachable!("constructed as a stream")
        };
        assert_eq!(stream.stream_type(), StreamType::Video);
        assert_eq!(stream.fee_scaled(), (Some("usd".to_string()), 2500));
    }

    #[test]
    fn test_channel_json_roundtrip() {
        let claim = Claim {
            kind: ClaimKind::Channel(Channel {
                public_key_bytes: vec![1, 2, 3],
            }),
            message: ClaimMessage::default(),
            signing: None,
        };
        let json = serde_json::to_string(&claim).expect("serialize");
        assert!(json.contains("\"type\":\"channel\""));
        assert!(json.contains("010203"));
        let parsed: Claim = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed.public_key_bytes(), Some(&[1u8, 2, 3][..]));
    }
}
