//! # Structured Logging
//!
//! Node logging via the `tracing` ecosystem:
//!
//! - JSON, Pretty or Compact output
//! - Level and per-module filtering (`RUST_LOG` honored when no filter is set)
//! - Trigger and status records on the `ora::record` target, switchable
//!   independently of the level
//!
//! ## Example
//!
//! ```rust,ignore
//! use ora_core::observe::{init_logging, LogConfig, LogFormat, LogLevel};
//!
//! let config = LogConfig {
//!     level: LogLevel::Debug,
//!     format: LogFormat::Json,
//!     ..Default::default()
//! };
//! init_logging(&config);
//!
//! tracing::info!(node_degree = 4, "Node up");
//! ```

use super::record::RECORD_TARGET;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{fmt as tfmt, prelude::*, EnvFilter};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Multi-line, colored
    #[default]
    Pretty,
    /// One line per event
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include source location (file:line)
    pub source_location: bool,
    pub thread_names: bool,
    /// Emit trigger and status records
    pub records: bool,
    /// Module filter (e.g., "ora_core=debug,ora_sim=trace")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            source_location: false,
            thread_names: false,
            records: true,
            filter: None,
        }
    }
}

impl LogConfig {
    /// Verbose, pretty, with thread names (sampler and listener threads are named).
    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            source_location: true,
            thread_names: true,
            ..Default::default()
        }
    }

    /// JSON for log shipping.
    pub fn production() -> Self {
        Self {
            format: LogFormat::Json,
            ..Default::default()
        }
    }

    /// Errors only, no records.
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            format: LogFormat::Compact,
            records: false,
            ..Default::default()
        }
    }

    /// The filter directive string this configuration installs.
    pub fn directives(&self) -> String {
        let base = match &self.filter {
            Some(custom) => custom.clone(),
            None => std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| self.level.to_string()),
        };
        if self.records {
            format!("{base},{RECORD_TARGET}=info")
        } else {
            format!("{base},{RECORD_TARGET}=off")
        }
    }
}

/// Initialize the global logging subscriber.
///
/// Call once at startup. Returns false if a subscriber was already installed.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_new(config.directives())
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    let result = match config.format {
        LogFormat::Json => {
            let layer = tfmt::layer()
                .json()
                .with_file(config.source_location)
                .with_line_number(config.source_location)
                .with_thread_names(config.thread_names);
            tracing::subscriber::set_global_default(tracing_subscriber::registry().with(filter).with(layer))
        }
        LogFormat::Pretty => {
            let layer = tfmt::layer()
                .pretty()
                .with_file(config.source_location)
                .with_line_number(config.source_location)
                .with_thread_names(config.thread_names);
            tracing::subscriber::set_global_default(tracing_subscriber::registry().with(filter).with(layer))
        }
        LogFormat::Compact => {
            let layer = tfmt::layer()
                .compact()
                .with_file(config.source_location)
                .with_line_number(config.source_location)
                .with_thread_names(config.thread_names);
            tracing::subscriber::set_global_default(tracing_subscriber::registry().with(filter).with(layer))
        }
    };

    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!("DEBUG".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Error.to_string(), "error");
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
    }

    #[test]
    fn test_config_presets() {
        let dev = LogConfig::development();
        assert_eq!(dev.level, LogLevel::Debug);
        assert!(dev.thread_names);

        assert_eq!(LogConfig::production().format, LogFormat::Json);

        let quiet = LogConfig::quiet();
        assert_eq!(quiet.level, LogLevel::Error);
        assert!(!quiet.records);
    }

    #[test]
    fn test_record_directive() {
        let config = LogConfig {
            filter: Some("ora_core=debug".into()),
            ..Default::default()
        };
        assert_eq!(config.directives(), "ora_core=debug,ora::record=info");

        let quiet = LogConfig {
            filter: Some("warn".into()),
            records: false,
            ..Default::default()
        };
        assert!(quiet.directives().ends_with("ora::record=off"));
    }

    #[test]
    fn test_yaml_partial() {
        let config: LogConfig = serde_yaml::from_str("level: trace\nformat: compact\n").unwrap();
        assert_eq!(config.level, LogLevel::Trace);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.records);
    }
}
