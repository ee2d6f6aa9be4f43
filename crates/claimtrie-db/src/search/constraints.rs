//! Typed search constraints.
//!
//! [`Constraints::from_json`] accepts the loosely typed request map used by
//! callers and rejects anything it does not recognize before storage is
//! touched.

use std::str::FromStr;

use claimtrie_types::amount;
use claimtrie_types::media::{ClaimType, StreamType};
use claimtrie_types::ClaimHash;
use serde_json::{Map, Value};

use crate::{DbError, Result};

/// Integer claim columns that accept exact or ranged comparisons and can
/// be used for ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntegerField {
    Height,
    CreationHeight,
    ActivationHeight,
    ExpirationHeight,
    Timestamp,
    CreationTimestamp,
    ReleaseTime,
    FeeAmount,
    TxPosition,
    ChannelJoin,
    Amount,
    EffectiveAmount,
    SupportAmount,
    TrendingGroup,
    TrendingMixed,
    TrendingLocal,
    TrendingGlobal,
}

impl IntegerField {
    pub const ALL: [IntegerField; 17] = [
        Self::Height,
        Self::CreationHeight,
        Self::ActivationHeight,
        Self::ExpirationHeight,
        Self::Timestamp,
        Self::CreationTimestamp,
        Self::ReleaseTime,
        Self::FeeAmount,
        Self::TxPosition,
        Self::ChannelJoin,
        Self::Amount,
        Self::EffectiveAmount,
        Self::SupportAmount,
        Self::TrendingGroup,
        Self::TrendingMixed,
        Self::TrendingLocal,
        Self::TrendingGlobal,
    ];

    /// Request key, identical to the column name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Height => "height",
            Self::CreationHeight => "creation_height",
            Self::ActivationHeight => "activation_height",
            Self::ExpirationHeight => "expiration_height",
            Self::Timestamp => "timestamp",
            Self::CreationTimestamp => "creation_timestamp",
            Self::ReleaseTime => "release_time",
            Self::FeeAmount => "fee_amount",
            Self::TxPosition => "tx_position",
            Self::ChannelJoin => "channel_join",
            Self::Amount => "amount",
            Self::EffectiveAmount => "effective_amount",
            Self::SupportAmount => "support_amount",
            Self::TrendingGroup => "trending_group",
            Self::TrendingMixed => "trending_mixed",
            Self::TrendingLocal => "trending_local",
            Self::TrendingGlobal => "trending_global",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Split a leading operator off `raw`.
    fn split(raw: &str) -> (Self, &str) {
        for (prefix, comparison) in [
            ("<=", Self::Le),
            (">=", Self::Ge),
            ("<", Self::Lt),
            (">", Self::Gt),
        ] {
            if let Some(rest) = raw.strip_prefix(prefix) {
                return (comparison, rest);
            }
        }
        (Self::Eq, raw)
    }
}

/// `field <op> value` on an integer column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeFilter {
    pub field: IntegerField,
    pub comparison: Comparison,
    pub value: i64,
}

impl RangeFilter {
    pub fn new(field: IntegerField, comparison: Comparison, value: i64) -> Self {
        Self {
            field,
            comparison,
            value,
        }
    }

    /// Parse a request value: a number, or a string optionally prefixed by
    /// `<`, `<=`, `>` or `>=`. Fee amounts are decimal and get scaled.
    pub fn parse(field: IntegerField, raw: &Value) -> Result<Self> {
        let invalid = || DbError::InvalidQuery(format!("invalid value for {}: {raw}", field.name()));
        let (comparison, text) = match raw {
            Value::String(s) => {
                let (comparison, rest) = Comparison::split(s.trim());
                (comparison, rest.trim().to_string())
            }
            Value::Number(n) => (Comparison::Eq, n.to_string()),
            _ => return Err(invalid()),
        };
        let value = if field == IntegerField::FeeAmount {
            amount::parse_scaled(&text)
        } else {
            text.parse::<i64>().ok()
        }
        .ok_or_else(invalid)?;
        Ok(Self::new(field, comparison, value))
    }
}

/// Sortable columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderField {
    Name,
    ClaimHash,
    Integer(IntegerField),
}

impl OrderField {
    pub fn column(self) -> &'static str {
        match self {
            Self::Name => "claim.normalized",
            Self::ClaimHash => "claim.claim_hash",
            Self::Integer(field) => match field {
                IntegerField::Height => "claim.height",
                IntegerField::CreationHeight => "claim.creation_height",
                IntegerField::ActivationHeight => "claim.activation_height",
                IntegerField::ExpirationHeight => "claim.expiration_height",
                IntegerField::Timestamp => "claim.timestamp",
                IntegerField::CreationTimestamp => "claim.creation_timestamp",
                IntegerField::ReleaseTime => "claim.release_time",
                IntegerField::FeeAmount => "claim.fee_amount",
                IntegerField::TxPosition => "claim.tx_position",
                IntegerField::ChannelJoin => "claim.channel_join",
                IntegerField::Amount => "claim.amount",
                IntegerField::EffectiveAmount => "claim.effective_amount",
                IntegerField::SupportAmount => "claim.support_amount",
                IntegerField::TrendingGroup => "claim.trending_group",
                IntegerField::TrendingMixed => "claim.trending_mixed",
                IntegerField::TrendingLocal => "claim.trending_local",
                IntegerField::TrendingGlobal => "claim.trending_global",
            },
        }
    }
}

/// One ordering term. Written `field` for descending, `^field` for ascending.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: OrderField,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(field: OrderField) -> Self {
        Self {
            field,
            ascending: true,
        }
    }

    pub fn desc(field: OrderField) -> Self {
        Self {
            field,
            ascending: false,
        }
    }

    /// `height DESC, name ASC`.
    pub fn default_order() -> Vec<Self> {
        vec![
            Self::desc(OrderField::Integer(IntegerField::Height)),
            Self::asc(OrderField::Name),
        ]
    }
}

impl FromStr for OrderBy {
    type Err = DbError;

    fn from_str(raw: &str) -> Result<Self> {
        let (ascending, name) = match raw.strip_prefix('^') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let field = match name {
            "name" => OrderField::Name,
            "claim_hash" => OrderField::ClaimHash,
            other => OrderField::Integer(IntegerField::from_name(other).ok_or_else(|| {
                DbError::InvalidQuery(format!("{other} is not a valid order_by field"))
            })?),
        };
        Ok(Self { field, ascending })
    }
}

/// any/all/not filter over one facet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttributeFilter {
    pub any: Vec<String>,
    pub all: Vec<String>,
    pub not: Vec<String>,
}

impl AttributeFilter {
    pub fn is_empty(&self) -> bool {
        self.any.is_empty() && self.all.is_empty() && self.not.is_empty()
    }
}

/// Every recognized search parameter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Constraints {
    pub name: Option<String>,
    /// Full id for an exact match, shorter for a prefix match.
    pub claim_id: Option<String>,
    pub claim_ids: Vec<String>,
    pub txid: Option<String>,
    pub nout: Option<u32>,
    /// Channel URL, resolved before searching.
    pub channel: Option<String>,
    /// Already-resolved signing channel.
    pub channel_hash: Option<ClaimHash>,
    pub channel_ids: Vec<String>,
    pub not_channel_ids: Vec<String>,
    pub public_key_id: Option<String>,
    pub claim_type: Option<ClaimType>,
    pub stream_types: Vec<StreamType>,
    pub media_types: Vec<String>,
    pub fee_currency: Option<String>,
    pub has_channel_signature: bool,
    pub signature_valid: Option<bool>,
    pub reposted_claim_id: Option<String>,
    pub tags: AttributeFilter,
    pub languages: AttributeFilter,
    pub locations: AttributeFilter,
    pub is_controlling: bool,
    /// 1-based position by activation order.
    pub sequence: Option<u32>,
    /// 1-based position by effective amount.
    pub amount_order: Option<u32>,
    pub ranges: Vec<RangeFilter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub no_totals: bool,
}

impl Constraints {
    /// Parse a request map. Unknown keys, mistyped values and invalid
    /// `order_by` fields fail with [`DbError::InvalidQuery`].
    pub fn from_json(map: &Map<String, Value>) -> Result<Self> {
        let mut c = Constraints::default();
        for (key, value) in map {
            match key.as_str() {
                "name" => c.name = Some(string(key, value)?),
                "claim_id" => c.claim_id = Some(string(key, value)?),
                "claim_ids" => c.claim_ids = strings(key, value)?,
                "txid" => c.txid = Some(string(key, value)?),
                "nout" => c.nout = Some(unsigned(key, value)?),
                "channel" => c.channel = Some(string(key, value)?),
                "channel_ids" => c.channel_ids = strings(key, value)?,
                "not_channel_ids" => c.not_channel_ids = strings(key, value)?,
                "public_key_id" => c.public_key_id = Some(string(key, value)?),
                "claim_type" => {
                    let name = string(key, value)?;
                    c.claim_type = Some(ClaimType::from_name(&name).ok_or_else(|| {
                        DbError::InvalidQuery(format!("unknown claim_type {name}"))
                    })?);
                }
                "stream_types" => {
                    c.stream_types = strings(key, value)?
                        .iter()
                        .map(|name| {
                            StreamType::from_name(name).ok_or_else(|| {
                                DbError::InvalidQuery(format!("unknown stream_type {name}"))
                            })
                        })
                        .collect::<Result<_>>()?;
                }
                "media_types" => c.media_types = strings(key, value)?,
                "fee_currency" => c.fee_currency = Some(string(key, value)?),
                "has_channel_signature" => c.has_channel_signature = boolean(key, value)?,
                "signature_valid" => c.signature_valid = Some(boolean(key, value)?),
                "reposted_claim_id" => c.reposted_claim_id = Some(string(key, value)?),
                "any_tags" => c.tags.any = strings(key, value)?,
                "all_tags" => c.tags.all = strings(key, value)?,
                "not_tags" => c.tags.not = strings(key, value)?,
                "any_languages" => c.languages.any = strings(key, value)?,
                "all_languages" => c.languages.all = strings(key, value)?,
                "not_languages" => c.languages.not = strings(key, value)?,
                "any_locations" => c.locations.any = strings(key, value)?,
                "all_locations" => c.locations.all = strings(key, value)?,
                "not_locations" => c.locations.not = strings(key, value)?,
                "is_controlling" => c.is_controlling = boolean(key, value)?,
                "sequence" => c.sequence = Some(unsigned(key, value)?),
                "amount_order" => c.amount_order = Some(unsigned(key, value)?),
                "order_by" => {
                    c.order_by = strings(key, value)?
                        .iter()
                        .map(|field| field.parse())
                        .collect::<Result<_>>()?;
                }
                "limit" => c.limit = Some(integer(key, value)?),
                "offset" => c.offset = Some(integer(key, value)?),
                "no_totals" => c.no_totals = boolean(key, value)?,
                other => match IntegerField::from_name(other) {
                    Some(field) => c.ranges.push(RangeFilter::parse(field, value)?),
                    None => {
                        return Err(DbError::InvalidQuery(format!(
                            "{other} is not a valid search parameter"
                        )))
                    }
                },
            }
        }
        Ok(c)
    }
}

fn mistyped(key: &str, expected: &str) -> DbError {
    DbError::InvalidQuery(format!("{key} must be {expected}"))
}

fn string(key: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| mistyped(key, "a string"))
}

/// A list of strings; a bare string counts as a one-element list.
fn strings(key: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items.iter().map(|item| string(key, item)).collect(),
        _ => Err(mistyped(key, "a string or list of strings")),
    }
}

fn integer(key: &str, value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| mistyped(key, "an integer"))
}

fn unsigned(key: &str, value: &Value) -> Result<u32> {
    u32::try_from(integer(key, value)?).map_err(|_| mistyped(key, "a non-negative integer"))
}

fn boolean(key: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_i64().unwrap_or_default() != 0),
        _ => Err(mistyped(key, "a boolean")),
    }
}
