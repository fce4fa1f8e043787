//! Uniform resource names for observations, actions and events.
//!
//! A [`Urn`] has the form `urn:<nid>:<nss>` and compares case-insensitively.
//! It is validated once at construction and used as a map key afterwards.
//!
//! ```rust
//! use ora_core::Urn;
//!
//! let a: Urn = "urn:demanes:events:nodeDegreeEvent".parse().unwrap();
//! let b: Urn = "URN:DEMANES:EVENTS:NODEDEGREEEVENT".parse().unwrap();
//! assert_eq!(a, b);
//! assert_eq!(a.nid(), "demanes");
//! assert!("nodeDegreeEvent".parse::<Urn>().is_err());
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

const SCHEME: &str = "urn:";

/// Validated, case-insensitive resource name.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Urn {
    raw: String,
    key: String,
}

impl Urn {
    /// Parse and validate a URN.
    pub fn new(s: &str) -> Result<Self, ConfigError> {
        let trimmed = s.trim();
        let invalid = || ConfigError::InvalidUrn(s.to_string());

        let head = trimmed.get(..SCHEME.len()).ok_or_else(invalid)?;
        if !head.eq_ignore_ascii_case(SCHEME) {
            return Err(invalid());
        }
        let rest = &trimmed[SCHEME.len()..];
        let (nid, nss) = rest.split_once(':').ok_or_else(invalid)?;
        if nid.is_empty() || nss.is_empty() || nid.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        Ok(Self {
            raw: trimmed.to_string(),
            key: trimmed.to_ascii_lowercase(),
        })
    }

    /// Build a URN from a literal known to be well formed.
    pub(crate) fn from_static(s: &'static str) -> Self {
        debug_assert!(Urn::new(s).is_ok(), "malformed URN literal {s}");
        Self {
            raw: s.to_string(),
            key: s.to_ascii_lowercase(),
        }
    }

    /// The URN as originally written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Namespace identifier.
    pub fn nid(&self) -> &str {
        self.parts().0
    }

    /// Namespace-specific string (everything after the NID).
    pub fn nss(&self) -> &str {
        self.parts().1
    }

    /// Whether a `?` query component is present.
    pub fn has_params(&self) -> bool {
        self.raw.contains('?')
    }

    /// Case-insensitive prefix match.
    pub fn matches(&self, prefix: &str) -> bool {
        self.key.starts_with(&prefix.to_ascii_lowercase())
    }

    fn parts(&self) -> (&str, &str) {
        let rest = &self.raw[SCHEME.len()..];
        rest.split_once(':').unwrap_or((rest, ""))
    }
}

impl PartialEq for Urn {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Urn {}

impl Hash for Urn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for Urn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Urn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl fmt::Debug for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Urn({})", self.raw)
    }
}

impl FromStr for Urn {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Urn::new(s)
    }
}

impl TryFrom<String> for Urn {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Urn::new(&s)
    }
}

impl From<Urn> for String {
    fn from(urn: Urn) -> Self {
        urn.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_and_parts() {
        let urn = Urn::new("urn:demanes:cmsdemo:observation:NDObservation").unwrap();
        assert_eq!(urn.nid(), "demanes");
        assert_eq!(urn.nss(), "cmsdemo:observation:NDObservation");
        assert!(!urn.has_params());
        assert!(urn.matches("URN:DEMANES:cmsdemo"));
        assert!(!urn.matches("urn:other"));
        assert_eq!(urn.to_string(), "urn:demanes:cmsdemo:observation:NDObservation");
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "urn:", "urn:demanes", "urn::x", "urn:demanes:", "demanes:x:y", "ur"] {
            assert!(Urn::new(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_case_insensitive_key() {
        let mut map = HashMap::new();
        map.insert(Urn::new("urn:demanes:events:battLevelEvent").unwrap(), 1);
        let lookup = Urn::new("URN:Demanes:Events:BATTLEVELEVENT").unwrap();
        assert_eq!(map.get(&lookup), Some(&1));
    }

    #[test]
    fn test_params() {
        let urn = Urn::new("urn:demanes:action:setPower?level=3").unwrap();
        assert!(urn.has_params());
    }

    #[test]
    fn test_serde_validates() {
        let urn: Urn = serde_yaml::from_str("urn:demanes:x:y").unwrap();
        assert_eq!(urn.nid(), "demanes");
        assert!(serde_yaml::from_str::<Urn>("not-a-urn").is_err());
    }
}
