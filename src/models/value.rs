//! Value types flowing through the invocation pipeline.
//!
//! `BindValue` is what the binder hands to the database driver; `ScalarValue`
//! is what the materializer reads back out of it. Keeping them separate keeps
//! the coercion rules (caller JSON -> bind) and the normalization rules
//! (driver value -> record) from leaking into each other.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as JsonValue;

/// A single column value materialized from a result row.
///
/// `Raw` only exists between the driver and the normalization pass; a
/// normalized record never contains it.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Raw(Vec<u8>),
}

impl ScalarValue {
    /// Collapse driver-specific byte buffers into portable text.
    ///
    /// Drivers that return string-like columns as raw buffers get their
    /// payload reinterpreted as UTF-8; buffers that are not valid UTF-8 fall
    /// back to base64 text. Every other variant passes through unchanged.
    pub fn normalize(self) -> Self {
        match self {
            Self::Raw(bytes) => match String::from_utf8(bytes) {
                Ok(s) => Self::Text(s),
                Err(e) => Self::Text(STANDARD.encode(e.as_bytes())),
            },
            other => other,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the kind name of this value for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::Raw(_) => "bytes",
        }
    }

    /// Render this value as a JSON value.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => JsonValue::Number((*i).into()),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(f.to_string())),
            Self::Text(s) => JsonValue::String(s.clone()),
            Self::Timestamp(ts) => JsonValue::String(ts.to_rfc3339()),
            Self::Raw(bytes) => JsonValue::String(STANDARD.encode(bytes)),
        }
    }
}

impl Serialize for ScalarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// A run-time parameter value ready for positional binding.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    Text(String),
    /// Homogeneous array (PostgreSQL only; rejected at configuration time
    /// for other databases)
    Array(Vec<BindValue>),
}

impl BindValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the kind name of this value for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
            Self::Array(_) => "array",
        }
    }
}

/// One result row: an ordered mapping from column name to normalized value.
///
/// Column order matches what the database reported for the query, which is
/// why this is a vector of pairs rather than a map; duplicate-free keys are
/// the database's contract, not ours. Serializes as a JSON object in column
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, ScalarValue)>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Create an empty record with capacity for `n` columns.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n),
        }
    }

    /// Append a column value, preserving insertion order.
    pub fn push(&mut self, column: impl Into<String>, value: ScalarValue) {
        self.entries.push((column.into(), value));
    }

    /// Look up a value by column name.
    pub fn get(&self, column: &str) -> Option<&ScalarValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Column names in report order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over (column, value) pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScalarValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl FromIterator<(String, ScalarValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, ScalarValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, ScalarValue);
    type IntoIter = std::vec::IntoIter<(String, ScalarValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_utf8_bytes_to_text() {
        let value = ScalarValue::Raw(b"alice@example.com".to_vec());
        assert_eq!(
            value.normalize(),
            ScalarValue::Text("alice@example.com".to_string())
        );
    }

    #[test]
    fn test_normalize_invalid_utf8_to_base64() {
        let value = ScalarValue::Raw(vec![0xFF, 0xFE, 0x00, 0x01]);
        assert_eq!(value.normalize(), ScalarValue::Text("//4AAQ==".to_string()));
    }

    #[test]
    fn test_normalize_passes_other_kinds_through() {
        assert_eq!(ScalarValue::Null.normalize(), ScalarValue::Null);
        assert_eq!(ScalarValue::Int(42).normalize(), ScalarValue::Int(42));
        assert_eq!(
            ScalarValue::Text("x".into()).normalize(),
            ScalarValue::Text("x".into())
        );
    }

    #[test]
    fn test_scalar_to_json_float_non_finite() {
        let json = ScalarValue::Float(f64::NAN).to_json();
        assert_eq!(json, JsonValue::String("NaN".to_string()));
    }

    #[test]
    fn test_record_preserves_column_order() {
        let mut record = Record::new();
        record.push("ZEBRA", ScalarValue::Int(1));
        record.push("ALPHA", ScalarValue::Int(2));
        record.push("MIDDLE", ScalarValue::Null);

        let columns: Vec<&str> = record.columns().collect();
        assert_eq!(columns, vec!["ZEBRA", "ALPHA", "MIDDLE"]);
    }

    #[test]
    fn test_record_serializes_in_order() {
        let mut record = Record::new();
        record.push("b", ScalarValue::Int(1));
        record.push("a", ScalarValue::Text("two".into()));

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"b":1,"a":"two"}"#);
    }

    #[test]
    fn test_record_get() {
        let mut record = Record::new();
        record.push("name", ScalarValue::Text("Alice".into()));
        assert_eq!(
            record.get("name"),
            Some(&ScalarValue::Text("Alice".into()))
        );
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn test_bind_value_kind_names() {
        assert_eq!(BindValue::Null.kind_name(), "null");
        assert_eq!(BindValue::Int(1).kind_name(), "integer");
        assert_eq!(BindValue::Array(vec![]).kind_name(), "array");
    }
}
