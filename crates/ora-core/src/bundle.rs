//! Typed argument bundles passed to actions.
//!
//! A [`Bundle`] is an ordered, string-keyed map whose values are drawn from
//! the closed set of payload kinds in [`Value`]. Typed getters replace
//! runtime class checks: asking for the wrong kind yields
//! [`BundleError::TypeMismatch`].
//!
//! ```rust
//! use ora_core::{Bundle, Value};
//!
//! let mut args = Bundle::new();
//! args.put("delta_cr", 1.5);
//! assert_eq!(args.get_f64("delta_cr").unwrap(), 1.5);
//! assert!(args.get_i64("delta_cr").is_err());
//! assert!(args.get("missing").is_err());
//! ```

use crate::error::BundleError;
use crate::urn::Urn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload kinds carried by bundles and observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Int,
    Double,
    Urn,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Int => write!(f, "int"),
            ValueKind::Double => write!(f, "double"),
            ValueKind::Urn => write!(f, "urn"),
        }
    }
}

/// A scalar payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Value {
    Int(i64),
    Double(f64),
    Urn(Urn),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Double(_) => ValueKind::Double,
            Value::Urn(_) => ValueKind::Urn,
        }
    }

    /// The value if it is an `Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The value if it is a `Double`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_urn(&self) -> Option<&Urn> {
        match self {
            Value::Urn(u) => Some(u),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Urn(u) => write!(f, "{u}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<Urn> for Value {
    fn from(v: Urn) -> Self {
        Value::Urn(v)
    }
}

/// Ordered key/value argument map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    entries: Vec<(String, Value)>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value, returning the previous one.
    ///
    /// Replacing keeps the key's original position.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Result<&Value, BundleError> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .ok_or_else(|| BundleError::MissingKey(key.to_string()))
    }

    /// Get a value, checking that it has the requested kind.
    pub fn get_typed(&self, key: &str, kind: ValueKind) -> Result<&Value, BundleError> {
        let value = self.get(key)?;
        if value.kind() != kind {
            return Err(BundleError::TypeMismatch {
                key: key.to_string(),
                expected: kind,
                found: value.kind(),
            });
        }
        Ok(value)
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, BundleError> {
        let value = self.get_typed(key, ValueKind::Double)?;
        Ok(value.as_f64().unwrap_or(f64::NAN))
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, BundleError> {
        let value = self.get_typed(key, ValueKind::Int)?;
        Ok(value.as_i64().unwrap_or_default())
    }

    pub fn get_urn(&self, key: &str) -> Result<&Urn, BundleError> {
        match self.get_typed(key, ValueKind::Urn)? {
            Value::Urn(u) => Ok(u),
            other => Err(BundleError::TypeMismatch {
                key: key.to_string(),
                expected: ValueKind::Urn,
                found: other.kind(),
            }),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Whether `key` is present and holds a value of `kind`.
    pub fn contains_key_of(&self, key: &str, kind: ValueKind) -> bool {
        self.value_kind(key) == Some(kind)
    }

    pub fn value_kind(&self, key: &str) -> Option<ValueKind> {
        self.get(key).ok().map(Value::kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_replaces_in_place() {
        let mut b = Bundle::new();
        assert!(b.put("a", 1).is_none());
        b.put("b", 2.0);
        assert_eq!(b.put("a", 3), Some(Value::Int(1)));

        let keys: Vec<_> = b.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_typed_access() {
        let mut b = Bundle::new();
        b.put("delta_cr", 2.0);
        b.put("cause", Urn::new("urn:demanes:events:nodeDegreeEvent").unwrap());

        assert_eq!(b.get_f64("delta_cr").unwrap(), 2.0);
        assert!(b.contains_key_of("delta_cr", ValueKind::Double));
        assert!(!b.contains_key_of("delta_cr", ValueKind::Int));
        assert_eq!(b.get_urn("cause").unwrap().nid(), "demanes");

        match b.get_i64("delta_cr") {
            Err(BundleError::TypeMismatch { expected, found, .. }) => {
                assert_eq!(expected, ValueKind::Int);
                assert_eq!(found, ValueKind::Double);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_key() {
        let b = Bundle::new();
        assert!(b.is_empty());
        assert_eq!(b.get("x"), Err(BundleError::MissingKey("x".into())));
        assert_eq!(b.value_kind("x"), None);
        assert!(!b.contains_key("x"));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Int(4).to_string(), "4");
        assert_eq!(Value::Double(-1.5).to_string(), "-1.5");
    }
}
