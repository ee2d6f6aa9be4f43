//! Parsed blocks, transactions and outputs as handed to the indexer.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::claim::{Claim, DecodeError};
use crate::url::normalize_name;
use crate::{txo_hash, ClaimHash, TxHash, TxoHash};

/// Header fields the indexer needs from a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u32,
    /// Unix seconds.
    pub timestamp: i64,
}

/// A block ready for ingestion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde_as(as = "Hex")]
    pub hash: TxHash,
    pub height: u32,
    /// Position of the transaction inside its block.
    pub position: u32,
    #[serde(default)]
    pub inputs: Vec<Input>,
    #[serde(default)]
    pub outputs: Vec<Output>,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    /// Spent output; `None` for coinbase inputs.
    #[serde_as(as = "Option<Hex>")]
    pub txo_ref: Option<TxoHash>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub nout: u32,
    pub amount: i64,
    pub script: OutputScript,
    #[serde(default)]
    pub payload: ClaimPayload,
}

/// Script classification of an output.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputScript {
    ClaimName {
        name: String,
        #[serde_as(as = "Hex")]
        claim_hash: ClaimHash,
    },
    UpdateClaim {
        name: String,
        #[serde_as(as = "Hex")]
        claim_hash: ClaimHash,
    },
    SupportClaim {
        name: String,
        #[serde_as(as = "Hex")]
        claim_hash: ClaimHash,
    },
    Payment,
}

/// Claim payload attached to a claim output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimPayload {
    #[default]
    None,
    Decoded(Claim),
    /// Bytes were present but did not decode; the reason is kept for logs.
    Undecodable(String),
}

impl Output {
    pub fn is_claim_name(&self) -> bool {
        matches!(self.script, OutputScript::ClaimName { .. })
    }

    pub fn is_update_claim(&self) -> bool {
        matches!(self.script, OutputScript::UpdateClaim { .. })
    }

    pub fn is_support_claim(&self) -> bool {
        matches!(self.script, OutputScript::SupportClaim { .. })
    }

    pub fn claim_name(&self) -> Option<&str> {
        match &self.script {
            OutputScript::ClaimName { name, .. }
            | OutputScript::UpdateClaim { name, .. }
            | OutputScript::SupportClaim { name, .. } => Some(name),
            OutputScript::Payment => None,
        }
    }

    pub fn normalized_name(&self) -> Option<String> {
        self.claim_name().map(normalize_name)
    }

    pub fn claim_hash(&self) -> Option<ClaimHash> {
        match &self.script {
            OutputScript::ClaimName { claim_hash, .. }
            | OutputScript::UpdateClaim { claim_hash, .. }
            | OutputScript::SupportClaim { claim_hash, .. } => Some(*claim_hash),
            OutputScript::Payment => None,
        }
    }

    /// Decoded claim payload.
    pub fn claim(&self) -> Result<&Claim, DecodeError> {
        match &self.payload {
            ClaimPayload::Decoded(claim) => Ok(claim),
            ClaimPayload::Undecodable(reason) => Err(DecodeError::Undecodable(reason.clone())),
            ClaimPayload::None => Err(DecodeError::Missing),
        }
    }
}

impl Transaction {
    /// Outputs paired with their creating transaction.
    pub fn output_refs(&self) -> impl Iterator<Item = OutputRef<'_>> {
        self.outputs.iter().map(move |output| OutputRef { tx: self, output })
    }
}

/// An output together with the transaction that created it.
#[derive(Clone, Copy, Debug)]
pub struct OutputRef<'a> {
    pub tx: &'a Transaction,
    pub output: &'a Output,
}

impl<'a> OutputRef<'a> {
    pub fn txo_hash(&self) -> TxoHash {
        txo_hash(&self.tx.hash, self.output.nout)
    }

    pub fn height(&self) -> u32 {
        self.tx.height
    }

    pub fn position(&self) -> u32 {
        self.tx.position
    }
}

impl<'a> std::ops::Deref for OutputRef<'a> {
    type Target = Output;

    fn deref(&self) -> &Output {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim_output(name: &str) -> Output {
        Output {
            nout: 1,
            amount: 10,
            script: OutputScript::ClaimName {
                name: name.into(),
                claim_hash: [3u8; 20],
            },
            payload: ClaimPayload::Undecodable("bad protobuf".into()),
        }
    }

    #[test]
    fn test_output_classification() {
        let out = claim_output("Hello");
        assert!(out.is_claim_name());
        assert!(!out.is_update_claim());
        assert!(!out.is_support_claim());
        assert_eq!(out.claim_name(), Some("Hello"));
        assert_eq!(out.normalized_name().as_deref(), Some("hello"));
        assert_eq!(out.claim_hash(), Some([3u8; 20]));
    }

    #[test]
    fn test_claim_decode_errors() {
        let out = claim_output("x");
        assert!(matches!(out.claim(), Err(DecodeError::Undecodable(_))));
        let payment = Output {
            nout: 0,
            amount: 1,
            script: OutputScript::Payment,
            payload: ClaimPayload::None,
        };
        assert_eq!(payment.claim(), Err(DecodeError::Missing));
        assert_eq!(payment.claim_hash(), None);
    }

    #[test]
    fn test_output_ref_txo_hash() {
        let tx = Transaction {
            hash: [9u8; 32],
            height: 5,
            position: 2,
            inputs: vec![],
            outputs: vec![claim_output("x")],
        };
        let refs: Vec<_> = tx.output_refs().collect();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].txo_hash(), txo_hash(&[9u8; 32], 1));
        assert_eq!(refs[0].position(), 2);
        assert_eq!(refs[0].amount, 10);
    }

    #[test]
    fn test_transaction_json() {
        let json = r#"{
            "hash": "0909090909090909090909090909090909090909090909090909090909090909",
            "height": 1, "position": 0,
            "inputs": [{"txo_ref": null}],
            "outputs": [{"nout": 0, "amount": 5, "script": {"kind": "payment"}}]
        }"#;
        let tx: Transaction = serde_json::from_str(json).expect("parse");
        assert_eq!(tx.hash, [9u8; 32]);
        assert_eq!(tx.inputs[0].txo_ref, None);
        assert_eq!(tx.outputs[0].payload, ClaimPayload::None);
    }
}
