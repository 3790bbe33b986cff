//! Open key/value parameter maps.
//!
//! [`Params`] carries action parameters, resource payloads and per-file
//! stage parameters. Values may arrive as JSON scalars or as strings from
//! the command line, so the typed getters accept both.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::error::Result;
use crate::Error;

/// Ordered string-keyed map of JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value, which must be an object (or null).
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(Error::validation(format!(
                "expected an object of parameters, got {other}"
            ))),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// String value, only when stored as a JSON string.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// String rendering of a scalar value. Numbers and booleans are
    /// formatted; null, arrays and objects yield `None`.
    pub fn string(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn path(&self, key: &str) -> Option<PathBuf> {
        self.str(key).map(PathBuf::from)
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean value; accepts `true`/`false`, `1`/`0` and `yes`/`no`.
    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_u64().map(|v| v != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.bool(key).unwrap_or(default)
    }

    /// Required string value.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.str(key)
            .ok_or_else(|| Error::validation(format!("missing required parameter '{key}'")))
    }

    /// Required path value.
    pub fn require_path(&self, key: &str) -> Result<PathBuf> {
        self.require_str(key).map(PathBuf::from)
    }

    /// Shallow, last-write-wins merge of `other` into `self`.
    pub fn merge(&mut self, other: &Params) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_getters_accept_strings() {
        let p = Params::new()
            .with("bitrate", "30000")
            .with("nb_frames", 120)
            .with("hinting", "yes")
            .with("fps", "25.0");
        assert_eq!(p.u64("bitrate"), Some(30000));
        assert_eq!(p.u64("nb_frames"), Some(120));
        assert_eq!(p.bool("hinting"), Some(true));
        assert_eq!(p.f64("fps"), Some(25.0));
        assert_eq!(p.string("nb_frames").as_deref(), Some("120"));
        assert_eq!(p.str("nb_frames"), None);
    }

    #[test]
    fn bool_or_default() {
        let p = Params::new().with("debug", "maybe");
        assert_eq!(p.bool("debug"), None);
        assert!(p.bool_or("debug", true));
        assert!(!p.bool_or("absent", false));
    }

    #[test]
    fn require_missing_is_validation_error() {
        let p = Params::new();
        let err = p.require_str("path").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("'path'"));
    }

    #[test]
    fn merge_last_write_wins() {
        let mut a = Params::new().with("x", 1).with("y", 2);
        let b = Params::new().with("y", 3).with("z", 4);
        a.merge(&b);
        assert_eq!(a.u64("x"), Some(1));
        assert_eq!(a.u64("y"), Some(3));
        assert_eq!(a.u64("z"), Some(4));
    }

    #[test]
    fn from_value_rejects_scalars() {
        assert!(Params::from_value(json!({"a": 1})).is_ok());
        assert!(Params::from_value(Value::Null).unwrap().is_empty());
        assert!(Params::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn serializes_as_plain_object() {
        let p = Params::new().with("path", "/tmp/in.mxf");
        assert_eq!(serde_json::to_value(&p).unwrap(), json!({"path": "/tmp/in.mxf"}));
    }
}
