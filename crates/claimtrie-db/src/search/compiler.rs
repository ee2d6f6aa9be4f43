//! Search planning and SQL generation.
//!
//! [`plan`] turns [`Constraints`] into a list of typed [`Predicate`]s plus
//! paging; [`QueryPlan::select`] and [`QueryPlan::count`] render them into
//! parameterized SQL against `claim LEFT JOIN claimtrie`.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use claimtrie_types::url::normalize_name;
use claimtrie_types::{
    claim_hash_from_id, tags, tx_hash_from_txid, txo_hash, ATTRIBUTE_ARRAY_MAX_LENGTH,
    CLAIM_ID_LEN,
};
use rusqlite::types::Value;

use super::constraints::{
    AttributeFilter, Comparison, Constraints, IntegerField, OrderBy, OrderField,
};
use crate::queries::attributes::Attribute;
use crate::rows::CLAIM_FROM;
use crate::{DbError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeMode {
    /// At least one of the values.
    Any,
    /// Every one of the values.
    All,
    /// None of the values.
    Not,
}

/// One condition of a search.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Equals {
        column: &'static str,
        value: Value,
    },
    Prefix {
        column: &'static str,
        prefix: String,
    },
    Compare {
        column: &'static str,
        comparison: Comparison,
        value: i64,
    },
    In {
        column: &'static str,
        values: Vec<Value>,
    },
    NotIn {
        column: &'static str,
        values: Vec<Value>,
    },
    IsNull(&'static str),
    IsNotNull(&'static str),
    Either(Box<Predicate>, Box<Predicate>),
    Attribute {
        attribute: Attribute,
        mode: AttributeMode,
        values: Vec<String>,
    },
}

impl Predicate {
    fn render(&self, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            Self::Equals { column, value } => {
                let _ = write!(sql, "{column} = ?");
                params.push(value.clone());
            }
            Self::Prefix { column, prefix } => {
                let _ = write!(sql, "{column} LIKE ?");
                params.push(Value::Text(format!("{prefix}%")));
            }
            Self::Compare {
                column,
                comparison,
                value,
            } => {
                let _ = write!(sql, "{column} {} ?", comparison.sql());
                params.push(Value::Integer(*value));
            }
            Self::In { column, values } if values.is_empty() => {
                let _ = write!(sql, "0 /* {column} IN () */");
            }
            Self::In { column, values } => {
                let _ = write!(sql, "{column} IN ({})", list(values.len()));
                params.extend(values.iter().cloned());
            }
            Self::NotIn { column, values } if values.is_empty() => {
                let _ = write!(sql, "1 /* {column} NOT IN () */");
            }
            Self::NotIn { column, values } => {
                let _ = write!(sql, "{column} NOT IN ({})", list(values.len()));
                params.extend(values.iter().cloned());
            }
            Self::IsNull(column) => {
                let _ = write!(sql, "{column} IS NULL");
            }
            Self::IsNotNull(column) => {
                let _ = write!(sql, "{column} IS NOT NULL");
            }
            Self::Either(left, right) => {
                sql.push('(');
                left.render(sql, params);
                sql.push_str(" OR ");
                right.render(sql, params);
                sql.push(')');
            }
            Self::Attribute {
                attribute,
                mode,
                values,
            } => {
                let table = attribute.table();
                let matching = format!(
                    "SELECT claim_hash FROM {table} WHERE {table} IN ({})",
                    list(values.len())
                );
                let _ = match mode {
                    AttributeMode::Any => write!(sql, "claim.claim_hash IN ({matching})"),
                    AttributeMode::All => write!(
                        sql,
                        "claim.claim_hash IN ({matching} GROUP BY claim_hash HAVING COUNT({table}) = {})",
                        values.len()
                    ),
                    AttributeMode::Not => write!(sql, "claim.claim_hash NOT IN ({matching})"),
                };
                params.extend(values.iter().cloned().map(Value::Text));
            }
        }
    }
}

fn list(n: usize) -> String {
    crate::queries::placeholders(n)
}

/// Default and maximum page size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 50,
        }
    }
}

/// A planned search.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryPlan {
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<OrderBy>,
    pub limit: i64,
    pub offset: i64,
}

/// SQL text with positional parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl CompiledQuery {
    /// The SQL with every parameter inlined as a literal, for diagnostics.
    pub fn interpolated(&self) -> String {
        interpolate(&self.sql, &self.params)
    }
}

impl QueryPlan {
    fn render_where(&self, sql: &mut String, params: &mut Vec<Value>) {
        for (i, predicate) in self.predicates.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            predicate.render(sql, params);
        }
    }

    /// Page query selecting `columns`.
    pub fn select(&self, columns: &str) -> CompiledQuery {
        let mut sql = format!("SELECT {columns} FROM {CLAIM_FROM}");
        let mut params = Vec::new();
        self.render_where(&mut sql, &mut params);
        for (i, order) in self.order_by.iter().enumerate() {
            sql.push_str(if i == 0 { " ORDER BY " } else { ", " });
            sql.push_str(order.field.column());
            sql.push_str(if order.ascending { " ASC" } else { " DESC" });
        }
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(Value::Integer(self.limit));
        params.push(Value::Integer(self.offset));
        CompiledQuery { sql, params }
    }

    /// Total matching rows, ignoring paging.
    pub fn count(&self) -> CompiledQuery {
        let mut sql = format!("SELECT COUNT(*) FROM {CLAIM_FROM}");
        let mut params = Vec::new();
        self.render_where(&mut sql, &mut params);
        CompiledQuery { sql, params }
    }
}

fn invalid(message: String) -> DbError {
    DbError::InvalidQuery(message)
}

fn hash_value(claim_id: &str) -> Result<Value> {
    claim_hash_from_id(claim_id)
        .map(|hash| Value::Blob(hash.to_vec()))
        .ok_or_else(|| invalid(format!("invalid claim id {claim_id}")))
}

fn hash_values(claim_ids: &[String]) -> Result<Vec<Value>> {
    claim_ids.iter().map(String::as_str).map(hash_value).collect()
}

/// Plan a search. `channel` URLs must already be resolved into
/// `channel_hash` by the caller.
pub fn plan(c: &Constraints, limits: PageLimits) -> Result<QueryPlan> {
    let mut predicates = Vec::new();

    if let Some(name) = &c.name {
        predicates.push(Predicate::Equals {
            column: "claim.normalized",
            value: Value::Text(normalize_name(name)),
        });
    }

    if let Some(claim_id) = &c.claim_id {
        if !claim_id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid(format!("invalid claim id {claim_id}")));
        }
        if claim_id.len() == CLAIM_ID_LEN {
            predicates.push(Predicate::Equals {
                column: "claim.claim_id",
                value: Value::Text(claim_id.clone()),
            });
        } else {
            let end = claim_id.len().min(CLAIM_ID_LEN);
            predicates.push(Predicate::Prefix {
                column: "claim.claim_id",
                prefix: claim_id[..end].to_string(),
            });
        }
    }

    if !c.claim_ids.is_empty() {
        predicates.push(Predicate::In {
            column: "claim.claim_hash",
            values: hash_values(&c.claim_ids)?,
        });
    }

    if let Some(txid) = &c.txid {
        let tx_hash = tx_hash_from_txid(txid).ok_or_else(|| invalid(format!("invalid txid {txid}")))?;
        predicates.push(Predicate::Equals {
            column: "claim.txo_hash",
            value: Value::Blob(txo_hash(&tx_hash, c.nout.unwrap_or(0)).to_vec()),
        });
    }

    if let Some(channel_hash) = &c.channel_hash {
        predicates.push(Predicate::Equals {
            column: "claim.channel_hash",
            value: Value::Blob(channel_hash.to_vec()),
        });
    }

    if !c.channel_ids.is_empty() {
        predicates.push(Predicate::In {
            column: "claim.channel_hash",
            values: hash_values(&c.channel_ids)?,
        });
    }

    if !c.not_channel_ids.is_empty() {
        let excluded = Predicate::NotIn {
            column: "claim.channel_hash",
            values: hash_values(&c.not_channel_ids)?,
        };
        if c.has_channel_signature {
            predicates.push(excluded);
        } else {
            predicates.push(Predicate::Either(
                Box::new(Predicate::IsNull("claim.signature_valid")),
                Box::new(excluded),
            ));
        }
    }

    match c.signature_valid {
        Some(valid) => {
            let matches = Predicate::Equals {
                column: "claim.signature_valid",
                value: Value::Integer(i64::from(valid)),
            };
            if c.has_channel_signature {
                predicates.push(matches);
            } else {
                predicates.push(Predicate::Either(
                    Box::new(Predicate::IsNull("claim.signature_valid")),
                    Box::new(matches),
                ));
            }
        }
        None if c.has_channel_signature => {
            predicates.push(Predicate::IsNotNull("claim.signature_valid"));
        }
        None => {}
    }

    if let Some(public_key_id) = &c.public_key_id {
        let hash = hex::decode(public_key_id)
            .ok()
            .filter(|bytes| bytes.len() == 20)
            .ok_or_else(|| invalid(format!("invalid public_key_id {public_key_id}")))?;
        predicates.push(Predicate::Equals {
            column: "claim.public_key_hash",
            value: Value::Blob(hash),
        });
    }

    if let Some(claim_type) = c.claim_type {
        predicates.push(Predicate::Equals {
            column: "claim.claim_type",
            value: Value::Integer(claim_type.code()),
        });
    }

    if !c.stream_types.is_empty() {
        predicates.push(Predicate::In {
            column: "claim.stream_type",
            values: c.stream_types.iter().map(|t| Value::Integer(t.code())).collect(),
        });
    }

    if !c.media_types.is_empty() {
        predicates.push(Predicate::In {
            column: "claim.media_type",
            values: c.media_types.iter().cloned().map(Value::Text).collect(),
        });
    }

    if let Some(currency) = &c.fee_currency {
        predicates.push(Predicate::Equals {
            column: "claim.fee_currency",
            value: Value::Text(currency.to_lowercase()),
        });
    }

    if let Some(reposted) = &c.reposted_claim_id {
        predicates.push(Predicate::Equals {
            column: "claim.reposted_claim_hash",
            value: hash_value(reposted)?,
        });
    }

    for range in &c.ranges {
        predicates.push(Predicate::Compare {
            column: OrderField::Integer(range.field).column(),
            comparison: range.comparison,
            value: range.value,
        });
    }

    attribute_predicates(&mut predicates, Attribute::Tag, &c.tags, true);
    attribute_predicates(&mut predicates, Attribute::Language, &c.languages, false);
    attribute_predicates(&mut predicates, Attribute::Location, &c.locations, false);

    let mut order_by = if c.order_by.is_empty() {
        OrderBy::default_order()
    } else {
        c.order_by.clone()
    };
    let mut limit = c
        .limit
        .unwrap_or(limits.default_limit)
        .clamp(0, limits.max_limit);
    let mut offset = c.offset.unwrap_or(0).max(0);

    if let Some(sequence) = c.sequence {
        order_by = vec![OrderBy::asc(OrderField::Integer(IntegerField::ActivationHeight))];
        offset = i64::from(sequence.saturating_sub(1));
        limit = 1;
    } else if let Some(amount_order) = c.amount_order {
        order_by = vec![OrderBy::desc(OrderField::Integer(IntegerField::EffectiveAmount))];
        offset = i64::from(amount_order.saturating_sub(1));
        limit = 1;
    } else if c.is_controlling {
        predicates.push(Predicate::IsNotNull("claimtrie.claim_hash"));
    }

    Ok(QueryPlan {
        predicates,
        order_by,
        limit,
        offset,
    })
}

/// Deduplicate, cap and translate one facet filter. Values listed under
/// `not` are dropped from `any` and `all`.
fn attribute_predicates(
    predicates: &mut Vec<Predicate>,
    attribute: Attribute,
    filter: &AttributeFilter,
    clean: bool,
) {
    if filter.is_empty() {
        return;
    }
    let prepare = |values: &[String]| -> Vec<String> {
        let mut values = if clean {
            tags::clean_tags(values)
        } else {
            let mut seen = BTreeSet::new();
            values
                .iter()
                .filter(|v| seen.insert(v.as_str()))
                .cloned()
                .collect()
        };
        values.truncate(ATTRIBUTE_ARRAY_MAX_LENGTH);
        values
    };
    let not = prepare(&filter.not);
    let without_not = |values: Vec<String>| -> Vec<String> {
        values.into_iter().filter(|v| !not.contains(v)).collect()
    };
    let any = without_not(prepare(&filter.any));
    let all = without_not(prepare(&filter.all));

    for (mode, values) in [
        (AttributeMode::Any, any),
        (AttributeMode::All, all),
        (AttributeMode::Not, not.clone()),
    ] {
        if !values.is_empty() {
            predicates.push(Predicate::Attribute {
                attribute,
                mode,
                values,
            });
        }
    }
}

/// Inline `params` into the `?` placeholders of `sql`.
pub fn interpolate(sql: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut params = params.iter();
    for ch in sql.chars() {
        if ch != '?' {
            out.push(ch);
            continue;
        }
        match params.next() {
            Some(Value::Null) => out.push_str("NULL"),
            Some(Value::Integer(i)) => {
                let _ = write!(out, "{i}");
            }
            Some(Value::Real(r)) => {
                let _ = write!(out, "{r}");
            }
            Some(Value::Text(t)) => {
                let _ = write!(out, "'{}'", t.replace('\'', "''"));
            }
            Some(Value::Blob(b)) => {
                let _ = write!(out, "X'{}'", hex::encode_upper(b));
            }
            None => out.push('?'),
        }
    }
    out
}
