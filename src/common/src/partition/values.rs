//! Typed partition values and their column specifications.
//!
//! Every partition column is declared with a [`ColumnType`]; raw string values
//! discovered in storage are parsed into [`TypedValue`]s which carry a total
//! order and a stable string rendering. The tab-joined rendering of a value
//! tuple is the partition's hash id, unique within a resource.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Data type of a single partition column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    #[serde(rename = "string")]
    Text,
    Date,
    DateTime,
    Time,
}

/// One `{name, type}` pair of a resource's partition spec.
///
/// The ordered sequence of columns is immutable after resource creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnType,
}

/// A parsed partition value.
///
/// Comparison is only meaningful between values of the same variant, which is
/// guaranteed for values parsed from the same column spec. Mixed variants
/// still order totally (by variant tag) so that sorting never panics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypedValue {
    Int(i64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
}

impl TypedValue {
    /// Parse a raw string under the declared column type.
    ///
    /// DateTime and Time values are percent-decoded first since hive-style
    /// object keys URL-encode the separator characters.
    pub fn parse(kind: ColumnType, raw: &str) -> Result<Self, ValueParseError> {
        match kind {
            ColumnType::Int => raw
                .parse::<i64>()
                .map(TypedValue::Int)
                .map_err(|source| ValueParseError::Int {
                    value: raw.to_string(),
                    source,
                }),
            ColumnType::Text => Ok(TypedValue::Text(raw.to_string())),
            ColumnType::Date => NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .map(TypedValue::Date)
                .map_err(|source| ValueParseError::Timestamp {
                    kind: "date",
                    value: raw.to_string(),
                    source,
                }),
            ColumnType::DateTime => {
                let decoded = percent_decode(raw)?;
                NaiveDateTime::parse_from_str(&decoded, DATE_TIME_FORMAT)
                    .map(TypedValue::DateTime)
                    .map_err(|source| ValueParseError::Timestamp {
                        kind: "datetime",
                        value: raw.to_string(),
                        source,
                    })
            }
            ColumnType::Time => {
                let decoded = percent_decode(raw)?;
                NaiveTime::parse_from_str(&decoded, TIME_FORMAT)
                    .map(TypedValue::Time)
                    .map_err(|source| ValueParseError::Timestamp {
                        kind: "time",
                        value: raw.to_string(),
                        source,
                    })
            }
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            TypedValue::Int(_) => 0,
            TypedValue::Text(_) => 1,
            TypedValue::Date(_) => 2,
            TypedValue::DateTime(_) => 3,
            TypedValue::Time(_) => 4,
        }
    }
}

impl Ord for TypedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (TypedValue::Int(a), TypedValue::Int(b)) => a.cmp(b),
            (TypedValue::Text(a), TypedValue::Text(b)) => a.cmp(b),
            (TypedValue::Date(a), TypedValue::Date(b)) => a.cmp(b),
            (TypedValue::DateTime(a), TypedValue::DateTime(b)) => a.cmp(b),
            (TypedValue::Time(a), TypedValue::Time(b)) => a.cmp(b),
            (a, b) => a.variant_rank().cmp(&b.variant_rank()),
        }
    }
}

impl PartialOrd for TypedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Int(v) => write!(f, "{v}"),
            TypedValue::Text(v) => f.write_str(v),
            TypedValue::Date(v) => write!(f, "{}", v.format(DATE_FORMAT)),
            TypedValue::DateTime(v) => write!(f, "{}", v.format(DATE_TIME_FORMAT)),
            TypedValue::Time(v) => write!(f, "{}", v.format(TIME_FORMAT)),
        }
    }
}

fn percent_decode(raw: &str) -> Result<String, ValueParseError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ValueParseError::Encoding {
            value: raw.to_string(),
        })
}

/// Parse a full raw value tuple against a partition spec.
pub fn parse_values(
    spec: &[ColumnSpec],
    raw_values: &[String],
) -> Result<Vec<TypedValue>, ValueParseError> {
    if spec.len() != raw_values.len() {
        return Err(ValueParseError::LengthMismatch {
            expected: spec.len(),
            got: raw_values.len(),
        });
    }

    spec.iter()
        .zip(raw_values)
        .map(|(column, raw)| TypedValue::parse(column.kind, raw))
        .collect()
}

/// Tab-joined rendering of a typed value tuple, in spec column order.
pub fn hash_id(values: &[TypedValue]) -> String {
    values
        .iter()
        .map(TypedValue::to_string)
        .collect::<Vec<_>>()
        .join("\t")
}

#[derive(Debug, Error)]
pub enum ValueParseError {
    #[error("spec and raw values do not match for partition value parsing (expected {expected}, got {got})")]
    LengthMismatch { expected: usize, got: usize },

    #[error("invalid integer partition value {value:?}: {source}")]
    Int {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("invalid {kind} partition value {value:?}: {source}")]
    Timestamp {
        kind: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("partition value {value:?} is not valid percent-encoded UTF-8")]
    Encoding { value: String },
}
