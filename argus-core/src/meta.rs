//! Tagged metadata values
//!
//! Entities and evidence carry open-ended key/value metadata. Values are
//! restricted to a small scalar set so ingestion routines stay exhaustive
//! while the map itself remains extensible.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar metadata value.
///
/// Serializes untagged, so `{"country": "US", "lat": 48.85, "cached": true}`
/// round-trips as plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl MetaValue {
    /// Borrow the string value, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            MetaValue::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Str(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Str(s)
    }
}

impl From<f64> for MetaValue {
    fn from(n: f64) -> Self {
        MetaValue::Num(n)
    }
}

impl From<i64> for MetaValue {
    fn from(n: i64) -> Self {
        MetaValue::Num(n as f64)
    }
}

impl From<usize> for MetaValue {
    fn from(n: usize) -> Self {
        MetaValue::Num(n as f64)
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        MetaValue::Bool(b)
    }
}

/// Open-ended metadata attached to entities and evidence.
pub type MetaMap = BTreeMap<String, MetaValue>;

/// Convert a loose JSON value into a `MetaValue`, flattening non-scalars
/// to their JSON text form.
pub fn meta_from_json(value: &serde_json::Value) -> MetaValue {
    match value {
        serde_json::Value::String(s) => MetaValue::Str(s.clone()),
        serde_json::Value::Number(n) => MetaValue::Num(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::Bool(b) => MetaValue::Bool(*b),
        other => MetaValue::Str(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_round_trip() {
        let mut map = MetaMap::new();
        map.insert("country".into(), "US".into());
        map.insert("lat".into(), 48.85.into());
        map.insert("cached".into(), true.into());

        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"country\":\"US\""));

        let back: MetaMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_meta_from_json_flattens_nested() {
        let v = serde_json::json!({"a": 1});
        let m = meta_from_json(&v);
        assert_eq!(m.as_str(), Some("{\"a\":1}"));
    }
}
