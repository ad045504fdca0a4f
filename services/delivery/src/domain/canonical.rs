//! Deterministic rendering of request payloads for idempotency hashing.
//!
//! Two payloads that are equal up to object key order render to the same
//! string. Dates are normalised to RFC 3339 at the boundary, integral floats
//! render as integers, and explicit `null` is kept as a value (a missing key
//! and a `null` key hash differently).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Number, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<CanonicalValue>),
    Map(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    /// Build a map, skipping absent (`None`) fields.
    pub fn map<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<CanonicalValue>)>,
        K: Into<String>,
    {
        Self::Map(
            fields
                .into_iter()
                .filter_map(|(k, v)| v.map(|v| (k.into(), v)))
                .collect(),
        )
    }

    /// Compact JSON rendering with sorted keys.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Lowercase hex SHA-256 of [`CanonicalValue::render`].
    pub fn hash(&self) -> String {
        hex::encode(Sha256::digest(self.render().as_bytes()))
    }
}

fn normalise_number(n: Number) -> Number {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => {
            Number::from(f as i64)
        }
        _ => n,
    }
}

impl From<Value> for CanonicalValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(normalise_number(n)),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}

impl From<&Value> for CanonicalValue {
    fn from(value: &Value) -> Self {
        Self::from(value.clone())
    }
}

impl From<DateTime<Utc>> for CanonicalValue {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::String(courier_core::serde::format_rfc3339_ms(&dt))
    }
}

impl From<&str> for CanonicalValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for CanonicalValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for CanonicalValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for CanonicalValue {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl<T: Into<CanonicalValue>> From<Vec<T>> for CanonicalValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

fn write_json_string(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    let escaped = serde_json::to_string(s).map_err(|_| fmt::Error)?;
    f.write_str(&escaped)
}

impl fmt::Display for CanonicalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write_json_string(f, s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write_json_string(f, key)?;
                    write!(f, ":{value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Canonical string of a JSON payload.
pub fn canonicalize(value: &Value) -> String {
    CanonicalValue::from(value).render()
}

/// Hex SHA-256 of [`canonicalize`].
pub fn canonical_hash(value: &Value) -> String {
    CanonicalValue::from(value).hash()
}
