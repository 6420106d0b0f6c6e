//! Scalar cell values and their canonical string form.
//!
//! Extraction layers hand the engine [`FlatRecord`]s whose cells are typed
//! [`FieldValue`]s. Before anything is hashed or compared, every cell passes
//! through [`FieldValue::canonical()`], which is the only place type
//! ambiguity is resolved. `None` is the NULL sentinel: both a missing value
//! and an empty string canonicalize to it.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// One denormalized input row keyed by field name.
pub type FlatRecord = BTreeMap<String, FieldValue>;

/// Canonical cell: `None` is NULL.
pub type CanonicalValue = Option<String>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    String(String),
}

impl FieldValue {
    pub fn canonical(&self) -> CanonicalValue {
        match self {
            FieldValue::Null => None,
            FieldValue::String(s) if s.is_empty() => None,
            FieldValue::String(s) => Some(s.clone()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Unsigned(u) => Some(u.to_string()),
            FieldValue::Float(f) => Some(canonical_float(*f)),
            FieldValue::Boolean(b) => Some(b.to_string()),
        }
    }
}

/// Shortest round-trip form; always carries a `.` or an exponent, so a float
/// never shares text with an integer.
fn canonical_float(value: f64) -> String {
    format!("{value:?}")
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canonical() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Unsigned(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Builds a [`FlatRecord`] from `(field, value)` pairs.
pub fn record<K, V, I>(fields: I) -> FlatRecord
where
    K: Into<String>,
    V: Into<FieldValue>,
    I: IntoIterator<Item = (K, V)>,
{
    fields
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}
