//! # Node Configuration
//!
//! YAML configuration of a node running the reconfiguration engine:
//!
//! - Logging (level, format, record output)
//! - Control loop (properties file, table directory, inline property overrides)
//! - Mediator update-list behaviour
//! - Radio channel and initial transmit power
//! - Remote management listener
//!
//! ## Configuration Search Path
//!
//! Configuration is loaded from the first file found:
//! 1. Path specified via `ORA_CONFIG` environment variable
//! 2. `./ora.yaml` (current directory)
//! 3. `~/.config/ora/config.yaml` (user config)
//! 4. `/etc/ora/config.yaml` (system config)
//!
//! ## Example Configuration
//!
//! ```yaml
//! logging:
//!   level: debug
//!   format: compact
//!
//! control:
//!   table_dir: "/usr/share/ora/tables"
//!   properties:
//!     KSI_ND: 2
//!     trigger.interval: 1500
//!
//! radio:
//!   channel: 15
//!   initial_ptx: -25
//!
//! remote:
//!   enable: true
//!   bind: "0.0.0.0:201"
//! ```
//!
//! The control section seeds the [`ReconfigurationProperties`] store in
//! this order: built-in defaults, the properties file, inline overrides,
//! derived constants. Values given explicitly in the file or inline win
//! over derived ones.

use crate::error::ConfigError;
use crate::mediator::UpdateListBehaviour;
use crate::observe::LogConfig;
use crate::properties::{keys, parse_properties, ReconfigurationProperties};
use crate::radio;
use crate::reasoner;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Control loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// `key=value` properties file merged over the defaults
    pub properties_file: Option<PathBuf>,
    /// Directory holding the decision tables
    pub table_dir: PathBuf,
    /// Inline property overrides (scalars)
    pub properties: BTreeMap<String, serde_yaml::Value>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            properties_file: None,
            table_dir: PathBuf::from("tables"),
            properties: BTreeMap::new(),
        }
    }
}

/// Mediator settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorConfig {
    pub update_list: UpdateListBehaviour,
}

/// Radio settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// IEEE 802.15.4 channel (11-26)
    pub channel: u8,
    /// Transmit power at startup and after a reset (dBm)
    pub initial_ptx: i32,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            channel: radio::DEFAULT_CHANNEL,
            initial_ptx: radio::MIN_PTX,
        }
    }
}

/// Remote management listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enable: bool,
    pub bind: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enable: false,
            bind: "0.0.0.0:201".to_string(),
        }
    }
}

/// Main node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub logging: LogConfig,
    pub control: ControlConfig,
    pub mediator: MediatorConfig,
    pub radio: RadioConfig,
    pub remote: RemoteConfig,
}

impl NodeConfig {
    /// Load configuration from the default search path.
    ///
    /// Returns the default config if no file is found.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("ORA_CONFIG") {
            if Path::new(&path).exists() {
                return Self::load_from(Path::new(&path));
            }
        }

        for path in &Self::config_search_paths() {
            if path.exists() {
                return Self::load_from(path);
            }
        }

        tracing::debug!("No node configuration found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "Loading node configuration");
        Self::parse(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))
    }

    /// Get configuration search paths (after `ORA_CONFIG`).
    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./ora.yaml")];
        if let Some(dirs) = directories::ProjectDirs::from("", "", "ora") {
            paths.push(dirs.config_dir().join("config.yaml"));
        }
        paths.push(PathBuf::from("/etc/ora/config.yaml"));
        paths
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !radio::is_valid_channel(self.radio.channel) {
            return Err(ConfigError::Validation(format!(
                "channel must be {}-{}, got {}",
                radio::MIN_CHANNEL,
                radio::MAX_CHANNEL,
                self.radio.channel
            )));
        }
        if radio::ptx_index(self.radio.channel, self.radio.initial_ptx).is_none() {
            return Err(ConfigError::Validation(format!(
                "initial_ptx {} dBm is not a power level of channel {}",
                self.radio.initial_ptx, self.radio.channel
            )));
        }
        if self.control.table_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation("table_dir must not be empty".to_string()));
        }
        if self.remote.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "remote bind address is not host:port: {}",
                self.remote.bind
            )));
        }
        self.inline_properties()?;
        Ok(())
    }

    /// Inline overrides rendered as property strings.
    fn inline_properties(&self) -> Result<Vec<(String, String)>, ConfigError> {
        self.control
            .properties
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    serde_yaml::Value::String(s) => s.clone(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    _ => {
                        return Err(ConfigError::InvalidProperty {
                            key: key.clone(),
                            value: format!("{value:?}"),
                        })
                    }
                };
                Ok((key.clone(), text))
            })
            .collect()
    }

    /// Build the reconfiguration properties for a node whose battery holds
    /// `max_capacity`.
    pub fn build_properties(&self, max_capacity: f64) -> Result<ReconfigurationProperties, ConfigError> {
        let props = ReconfigurationProperties::with_defaults(self.radio.channel);
        props.set(keys::PTX, self.radio.initial_ptx);
        props.set(keys::UPDATE_LIST, self.mediator.update_list);

        let mut explicit: HashMap<String, String> = HashMap::new();
        if let Some(path) = &self.control.properties_file {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
            explicit.extend(parse_properties(&text));
        }
        explicit.extend(self.inline_properties()?);
        props.merge(explicit.clone());

        props.derive_controller_constants(max_capacity)?;
        props.merge(explicit);
        tracing::debug!(entries = props.len(), "Reconfiguration properties built");
        Ok(props)
    }

    /// Path of a decision table named by a properties value.
    pub fn resolve_table(&self, name: &str) -> PathBuf {
        reasoner::resolve_table(&self.control.table_dir, name)
    }

    /// Generate example configuration YAML.
    pub fn example_yaml() -> String {
        let mut config = Self::default();
        config.control.properties.insert(keys::KSI_ND.to_string(), 1.into());
        config
            .control
            .properties
            .insert(keys::TRIGGER_INTERVAL.to_string(), 2000.into());
        config.remote.enable = true;
        serde_yaml::to_string(&config).unwrap_or_default()
    }
}
