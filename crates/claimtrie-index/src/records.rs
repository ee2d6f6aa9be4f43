//! Turning block outputs into claim and support rows.

use claimtrie_db::queries::claims::ClaimRecord;
use claimtrie_db::queries::supports::SupportRecord;
use claimtrie_types::claim::ClaimKind;
use claimtrie_types::tx::{BlockHeader, OutputRef};
use claimtrie_types::ATTRIBUTE_ARRAY_MAX_LENGTH;
use tracing::warn;

use crate::config::ChainConfig;

/// Row for a claim or update output.
///
/// Returns `None` for outputs without a usable name. An undecodable payload
/// still yields a record so the claim keeps tracking its latest output; the
/// decoded columns are left empty.
pub fn claim_record(
    output: &OutputRef<'_>,
    header: &BlockHeader,
    chain: &ChainConfig,
) -> Option<ClaimRecord> {
    let claim_hash = output.claim_hash()?;
    let claim_name = output.claim_name()?.to_string();
    let normalized = output.normalized_name()?;
    if claim_name.is_empty() || normalized.is_empty() {
        return None;
    }

    let mut record = ClaimRecord {
        claim_hash,
        claim_name,
        normalized,
        txo_hash: output.txo_hash(),
        tx_position: output.position(),
        amount: output.amount,
        height: output.height(),
        timestamp: header.timestamp,
        expiration_height: chain.expiration_height(output.height()),
        claim_type: None,
        stream_type: None,
        media_type: None,
        release_time: None,
        fee_currency: None,
        fee_amount: 0,
        reposted_claim_hash: None,
        tags: Vec::new(),
        languages: Vec::new(),
        locations: Vec::new(),
    };

    let claim = match output.claim() {
        Ok(claim) => claim,
        Err(e) => {
            warn!(
                claim_id = %record.claim_id(),
                height = record.height,
                error = %e,
                "claim payload not decodable, storing output only"
            );
            return Some(record);
        }
    };

    record.claim_type = Some(claim.claim_type());
    match &claim.kind {
        ClaimKind::Stream(stream) => {
            record.media_type = stream.media_type.clone();
            record.stream_type = Some(stream.stream_type());
            record.release_time = stream.release_time;
            let (currency, amount) = stream.fee_scaled();
            record.fee_currency = currency;
            record.fee_amount = amount;
        }
        ClaimKind::Repost(repost) => {
            record.reposted_claim_hash = Some(repost.claim_hash);
        }
        ClaimKind::Channel(_) => {}
    }
    record.tags = claim.clean_tags();
    record.languages = dedup(&claim.message.languages);
    record.locations = dedup(&claim.message.locations);
    Some(record)
}

/// Row for a support output.
pub fn support_record(output: &OutputRef<'_>) -> Option<SupportRecord> {
    Some(SupportRecord {
        txo_hash: output.txo_hash(),
        tx_position: output.position(),
        height: output.height(),
        claim_hash: output.claim_hash()?,
        amount: output.amount,
    })
}

fn dedup(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values.iter().map(|v| v.trim()) {
        if !value.is_empty() && !out.iter().any(|seen| seen == value) {
            out.push(value.to_string());
        }
        if out.len() == ATTRIBUTE_ARRAY_MAX_LENGTH {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimtrie_types::claim::{Channel, Claim, ClaimMessage, Fee, Repost, Stream};
    use claimtrie_types::media::{ClaimType, StreamType};
    use claimtrie_types::tx::{ClaimPayload, Output, OutputScript, Transaction};

    fn header() -> BlockHeader {
        BlockHeader {
            height: 200,
            timestamp: 1_600_000_000,
        }
    }

    fn tx(name: &str, payload: ClaimPayload) -> Transaction {
        Transaction {
            hash: [4u8; 32],
            height: 200,
            position: 3,
            inputs: vec![],
            outputs: vec![Output {
                nout: 0,
                amount: 75,
                script: OutputScript::ClaimName {
                    name: name.into(),
                    claim_hash: [8u8; 20],
                },
                payload,
            }],
        }
    }

    fn first_record(tx: &Transaction) -> Option<ClaimRecord> {
        let output = tx.output_refs().next().expect("output");
        claim_record(&output, &header(), &ChainConfig::default())
    }

    #[test]
    fn test_stream_record() {
        let claim = Claim {
            kind: ClaimKind::Stream(Stream {
                media_type: Some("video/mp4".into()),
                release_time: None,
                fee: Some(Fee {
                    currency: "LBC".into(),
                    amount: "1.5".into(),
                }),
            }),
            message: ClaimMessage {
                tags: vec![" Music ".into(), "music".into()],
                languages: vec!["en".into(), "en".into(), "fr".into()],
                locations: vec![],
            },
            signing: None,
        };
        let tx = tx("Song", ClaimPayload::Decoded(claim));
        let record = first_record(&tx).expect("record");
        assert_eq!(record.claim_name, "Song");
        assert_eq!(record.normalized, "song");
        assert_eq!(record.tx_position, 3);
        assert_eq!(record.claim_type, Some(ClaimType::Stream));
        assert_eq!(record.stream_type, Some(StreamType::Video));
        assert_eq!(record.fee_currency.as_deref(), Some("lbc"));
        assert_eq!(record.fee_amount, 1500);
        assert_eq!(record.release_time, None);
        assert_eq!(record.tags, vec!["music".to_string()]);
        assert_eq!(record.languages, vec!["en".to_string(), "fr".to_string()]);
        assert_eq!(record.expiration_height, 200 + 262_974);
    }

    #[test]
    fn test_channel_and_repost_records() {
        let channel = Claim {
            kind: ClaimKind::Channel(Channel {
                public_key_bytes: vec![1; 32],
            }),
            message: ClaimMessage::default(),
            signing: None,
        };
        let record = first_record(&tx("@chan", ClaimPayload::Decoded(channel))).expect("record");
        assert_eq!(record.claim_type, Some(ClaimType::Channel));
        assert_eq!(record.stream_type, None);

        let repost = Claim {
            kind: ClaimKind::Repost(Repost {
                claim_hash: [2u8; 20],
            }),
            message: ClaimMessage::default(),
            signing: None,
        };
        let record = first_record(&tx("again", ClaimPayload::Decoded(repost))).expect("record");
        assert_eq!(record.claim_type, Some(ClaimType::Repost));
        assert_eq!(record.reposted_claim_hash, Some([2u8; 20]));
    }

    #[test]
    fn test_undecodable_payload_keeps_output_fields() {
        let tx = tx("broken", ClaimPayload::Undecodable("truncated".into()));
        let record = first_record(&tx).expect("record");
        assert_eq!(record.amount, 75);
        assert_eq!(record.claim_type, None);
        assert!(record.tags.is_empty());
    }

    #[test]
    fn test_empty_name_is_skipped() {
        let tx = tx("", ClaimPayload::None);
        assert!(first_record(&tx).is_none());
    }

    #[test]
    fn test_support_record() {
        let mut tx = tx("x", ClaimPayload::None);
        tx.outputs[0].script = OutputScript::SupportClaim {
            name: "x".into(),
            claim_hash: [6u8; 20],
        };
        let output = tx.output_refs().next().expect("output");
        let support = support_record(&output).expect("support");
        assert_eq!(support.claim_hash, [6u8; 20]);
        assert_eq!(support.amount, 75);
        assert_eq!(support.height, 200);
    }
}
