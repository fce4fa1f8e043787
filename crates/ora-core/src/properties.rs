//! # Reconfiguration Properties
//!
//! A flat, thread-safe string store holding every tunable of the control
//! loop. The sampling thread reads it fresh on each tick and the remote
//! management listener rewrites entries at runtime, so live changes take
//! effect without a restart.
//!
//! Every key the engine reads or writes is listed in [`keys`]. Values are
//! kept as strings and parsed on access with [`ReconfigurationProperties::parse`].
//!
//! ## File format
//!
//! `key=value` or `key: value`, one per line; lines starting with `#` or `!`
//! are comments. The same format is used by decision tables.
//!
//! ```rust
//! use ora_core::properties::{keys, ReconfigurationProperties};
//!
//! let props = ReconfigurationProperties::with_defaults(26);
//! props.derive_controller_constants(720.0).unwrap();
//!
//! let e_cr: f64 = props.parse(keys::E_CR).unwrap();
//! assert_eq!(e_cr, 144.0);
//! assert_eq!(props.parse::<i64>(keys::ND_R).unwrap(), 2);
//! ```

use crate::error::ConfigError;
use crate::radio;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Property names.
pub mod keys {
    // Reasoner
    /// Battery error normalization factor (derived: `2 / E_cr`)
    pub const KE: &str = "kE";
    /// Scale of the node-degree reference correction
    pub const KDELTA_ND: &str = "kdeltaND";
    /// Initial node degree
    pub const ND: &str = "ND";
    /// Externally configured node-degree reference
    pub const ND_REF: &str = "NDRef";
    /// Node-degree reference for the next sampling instant (written by the secondary loop)
    pub const ND_R: &str = "ND_R";
    /// Node-degree error normalization factor (derived: `2 / NDRef`)
    pub const K_ND: &str = "k_ND";
    /// Transmit-power index output scale
    pub const K_CR: &str = "k_CR";
    /// Critical battery level (derived: `max_capacity * E_cr_factor`)
    pub const E_CR: &str = "E_cr";
    pub const E_CR_FACTOR: &str = "E_cr_factor";
    /// Primary loop table file
    pub const FDM_PRIMARY: &str = "FDM_Prim_Prop_File";
    /// Secondary loop table file
    pub const FDM_SECONDARY: &str = "FDM_Sec_Prop_File";
    /// Decision variable IDs
    pub const VAR_E_E: &str = "e_E";
    pub const VAR_E_ND: &str = "e_ND";
    pub const VAR_DU_CR: &str = "du_CR";
    pub const VAR_DU_ND: &str = "du_ND";

    // Trigger policy
    /// Deadband half-width in node-degree units
    pub const KSI_ND: &str = "KSI_ND";
    pub const ND_MIN: &str = "ND_MIN";
    pub const CR_MAX: &str = "CR_MAX";
    pub const CR_MIN: &str = "CR_MIN";
    pub const DELTA_ND_MIN: &str = "DELTA_ND_MIN";
    pub const DELTA_CR_MIN: &str = "DELTA_CR_MIN";
    /// Saturation correction gain (optional, default 0)
    pub const ALPHA_KSI_ND: &str = "alpha_KSI_ND";
    /// Sampling period in milliseconds
    pub const TRIGGER_INTERVAL: &str = "trigger.interval";
    /// `true` requests a controller history reset on the next tick
    pub const RESET: &str = "reset";
    /// Transmit power (dBm) restored on reset
    pub const PTX: &str = "ptx";
    /// `started` enables firing
    pub const REASONING_STATUS: &str = "reasoning.status";

    // Actuator / mediator
    /// Base transmit-power index of the actuator
    pub const CR0: &str = "CR0";
    /// `static` or `dynamic`
    pub const UPDATE_LIST: &str = "mediator.update_list";
}

/// Default values.
pub mod defaults {
    pub const E_CR_FACTOR: f64 = 0.2;
    pub const KDELTA_ND: i64 = 1;
    pub const ND_REF: i64 = 1;
    pub const ND: i64 = 1;
    pub const K_CR: f64 = 1.0;
    pub const FDM_PRIMARY: &str = "CR_FDM_ND_v1.ini";
    pub const FDM_SECONDARY: &str = "NDr_FDM_E_v1.ini";
    pub const VAR_E_E: &str = "e_E";
    pub const VAR_E_ND: &str = "e_nd";
    pub const VAR_DU_CR: &str = "du_cr";
    pub const VAR_DU_ND: &str = "du_nd";
    pub const KSI_ND: i64 = 1;
    pub const ND_MIN: i64 = 1;
    pub const DELTA_ND_MIN: i64 = 1;
    pub const DELTA_CR_MIN: i64 = 1;
    pub const TRIGGER_INTERVAL_MS: u64 = 2000;
    /// Used by the trigger policy when `trigger.interval` is absent
    pub const FALLBACK_INTERVAL_MS: u64 = 1000;
    pub const PTX: i32 = -32;
    pub const REASONING_STATUS: &str = "started";
}

/// Shared, internally synchronized key/value store.
///
/// Cloning yields another handle to the same store.
#[derive(Debug, Clone, Default)]
pub struct ReconfigurationProperties {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl ReconfigurationProperties {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the built-in defaults for `channel`.
    ///
    /// Derived constants (`E_cr`, `kE`, `k_ND`, `ND_R`) need the battery
    /// capacity; call [`derive_controller_constants`](Self::derive_controller_constants).
    pub fn with_defaults(channel: u8) -> Self {
        let props = Self::new();
        props.set(keys::E_CR_FACTOR, defaults::E_CR_FACTOR);
        props.set(keys::KDELTA_ND, defaults::KDELTA_ND);
        props.set(keys::ND_REF, defaults::ND_REF);
        props.set(keys::ND, defaults::ND);
        props.set(keys::K_CR, defaults::K_CR);
        props.set(keys::FDM_PRIMARY, defaults::FDM_PRIMARY);
        props.set(keys::FDM_SECONDARY, defaults::FDM_SECONDARY);
        props.set(keys::VAR_E_E, defaults::VAR_E_E);
        props.set(keys::VAR_E_ND, defaults::VAR_E_ND);
        props.set(keys::VAR_DU_CR, defaults::VAR_DU_CR);
        props.set(keys::VAR_DU_ND, defaults::VAR_DU_ND);
        props.set(keys::KSI_ND, defaults::KSI_ND);
        props.set(keys::ND_MIN, defaults::ND_MIN);
        props.set(keys::CR_MAX, radio::max_ptx_index(channel));
        props.set(keys::CR_MIN, radio::min_ptx_index(channel));
        props.set(keys::DELTA_ND_MIN, defaults::DELTA_ND_MIN);
        props.set(keys::DELTA_CR_MIN, defaults::DELTA_CR_MIN);
        props.set(keys::TRIGGER_INTERVAL, defaults::TRIGGER_INTERVAL_MS);
        props.set(keys::RESET, true);
        props.set(keys::PTX, defaults::PTX);
        props.set(keys::REASONING_STATUS, defaults::REASONING_STATUS);
        props
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn set(&self, key: impl Into<String>, value: impl ToString) {
        self.lock().insert(key.into(), value.to_string());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.lock().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Get a value that must be present.
    pub fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingProperty(key.to_string()))
    }

    /// Get and parse a value that must be present.
    pub fn parse<T: FromStr>(&self, key: &str) -> Result<T, ConfigError> {
        let raw = self.require(key)?;
        raw.trim().parse().map_err(|_| ConfigError::InvalidProperty {
            key: key.to_string(),
            value: raw,
        })
    }

    /// Parse an optional value, falling back to `default` when absent.
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        if self.contains(key) {
            self.parse(key)
        } else {
            Ok(default)
        }
    }

    /// `true` when the value equals `expected`, ignoring ASCII case.
    pub fn is(&self, key: &str, expected: &str) -> bool {
        self.get(key)
            .map(|v| v.trim().eq_ignore_ascii_case(expected))
            .unwrap_or(false)
    }

    /// Boolean flag stored as `true`/`false`.
    pub fn flag(&self, key: &str) -> bool {
        self.is(key, "true")
    }

    /// Sorted copy of all entries.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Copy entries in, overwriting existing keys.
    pub fn merge<I, K, V>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let mut map = self.lock();
        for (k, v) in entries {
            map.insert(k.into(), v.to_string());
        }
    }

    /// Merge entries parsed from properties text. Returns the number of entries read.
    pub fn load_str(&self, text: &str) -> usize {
        let parsed = parse_properties(text);
        let count = parsed.len();
        self.merge(parsed);
        count
    }

    /// Merge entries from a properties file.
    pub fn load_file(&self, path: &Path) -> Result<usize, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        let count = self.load_str(&text);
        tracing::debug!(path = %path.display(), entries = count, "Loaded reconfiguration properties");
        Ok(count)
    }

    /// Recompute the derived controller constants.
    ///
    /// - `E_cr = max_capacity * E_cr_factor`
    /// - `kE = 2 / E_cr`
    /// - `k_ND = 2 / NDRef`
    /// - `ND_R = NDRef + kdeltaND`
    pub fn derive_controller_constants(&self, max_capacity: f64) -> Result<(), ConfigError> {
        let e_cr_factor = self.parse_or(keys::E_CR_FACTOR, defaults::E_CR_FACTOR)?;
        let nd_ref = self.parse_or(keys::ND_REF, defaults::ND_REF)?;
        let kdelta_nd = self.parse_or(keys::KDELTA_ND, defaults::KDELTA_ND)?;

        let e_cr = max_capacity * e_cr_factor;
        if !(e_cr.is_finite() && e_cr > 0.0) {
            return Err(ConfigError::InvalidProperty {
                key: keys::E_CR.to_string(),
                value: e_cr.to_string(),
            });
        }
        if nd_ref == 0 {
            return Err(ConfigError::InvalidProperty {
                key: keys::ND_REF.to_string(),
                value: nd_ref.to_string(),
            });
        }

        let k_e = 2.0 / e_cr;
        let k_nd = 2.0 / nd_ref as f64;
        let nd_r = nd_ref + kdelta_nd;

        self.set(keys::E_CR, e_cr);
        self.set(keys::KE, k_e);
        self.set(keys::K_ND, k_nd);
        self.set(keys::ND_R, nd_r);

        tracing::debug!(e_cr, k_e, k_nd, nd_r, "Derived controller constants");
        Ok(())
    }
}

/// Parse properties text into a map. Later duplicates win.
pub fn parse_properties(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = match line.find(['=', ':']) {
            Some(pos) => (&line[..pos], &line[pos + 1..]),
            None => (line, ""),
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), value.trim().to_string());
    }
    map
}
