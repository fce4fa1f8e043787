//! Error types for the reconfiguration engine.
//!
//! Errors fall into five classes (see [`ErrorClass`]): configuration errors are
//! fatal at construction time, lookup and invocation errors are recoverable by
//! the caller, precondition errors are wiring bugs, and runtime errors come
//! from the host (thread spawning, sockets).

use crate::bundle::ValueKind;
use crate::urn::Urn;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, OraError>;

/// Failures while loading a decision table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    /// Fewer keys than the schema needs
    #[error("decision table has {found} keys, expected at least {expected}")]
    FieldCount { expected: usize, found: usize },

    /// A count field is not an integer
    #[error("'{key}' is not an integer: {value:?}")]
    NotANumber { key: String, value: String },

    /// Required key absent
    #[error("decision table key not found: {0}")]
    MissingKey(String),

    /// A bound, type or cell could not be interpreted
    #[error("bad value for '{key}': {value:?}")]
    BadValue { key: String, value: String },

    /// A points row has the wrong number of columns
    #[error("points row '{var}' has {found} columns, expected {expected}")]
    ColumnCount {
        var: String,
        expected: usize,
        found: usize,
    },

    /// An input points row is not non-decreasing
    #[error("points row '{0}' of an input variable is not sorted ascending")]
    Unsorted(String),

    /// The table file could not be read
    #[error("failed to read decision table {path}: {reason}")]
    Read { path: String, reason: String },
}

/// Configuration errors: tables, properties, node config files.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid decision table: {0}")]
    Table(#[from] TableError),

    #[error("missing property: {0}")]
    MissingProperty(String),

    #[error("invalid value for property '{key}': {value:?}")]
    InvalidProperty { key: String, value: String },

    #[error("invalid URN: {0:?}")]
    InvalidUrn(String),

    #[error("failed to read config: {0}")]
    Read(String),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Validation(String),
}

/// Bundle access failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BundleError {
    #[error("bundle has no key '{0}'")]
    MissingKey(String),

    #[error("bundle key '{key}' holds {found}, requested {expected}")]
    TypeMismatch {
        key: String,
        expected: ValueKind,
        found: ValueKind,
    },
}

/// Top-level engine error.
#[derive(Error, Debug)]
pub enum OraError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown observation: {0}")]
    UnknownObservation(Urn),

    #[error("unknown action: {0}")]
    UnknownAction(Urn),

    #[error("observation {urn} failed: {source}")]
    ObservationInvocation {
        urn: Urn,
        #[source]
        source: Box<OraError>,
    },

    #[error("action {urn} failed: {source}")]
    ActionInvocation {
        urn: Urn,
        #[source]
        source: Box<OraError>,
    },

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Coarse classification used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing or malformed table/property; fatal at construction
    Config,
    /// Unknown URN passed to the mediator
    Lookup,
    /// A collaborator failed while executing
    Invocation,
    /// Wiring or argument bug
    Precondition,
    /// Host failure (threads, sockets)
    Runtime,
}

impl OraError {
    /// Classify the error.
    pub fn class(&self) -> ErrorClass {
        match self {
            OraError::Config(_) => ErrorClass::Config,
            OraError::UnknownObservation(_) | OraError::UnknownAction(_) => ErrorClass::Lookup,
            OraError::ObservationInvocation { .. }
            | OraError::ActionInvocation { .. }
            | OraError::Device(_) => ErrorClass::Invocation,
            OraError::Bundle(_) | OraError::Precondition(_) => ErrorClass::Precondition,
            OraError::Runtime(_) => ErrorClass::Runtime,
        }
    }

    /// Check if the caller may continue after this error (skip a tick, retry later).
    pub fn is_recoverable(&self) -> bool {
        matches!(self.class(), ErrorClass::Lookup | ErrorClass::Invocation)
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        OraError::Precondition(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let urn: Urn = "urn:demanes:test:x".parse().unwrap();
        assert_eq!(OraError::UnknownAction(urn.clone()).class(), ErrorClass::Lookup);
        assert!(OraError::UnknownObservation(urn.clone()).is_recoverable());

        let wrapped = OraError::ActionInvocation {
            urn,
            source: Box::new(OraError::Device("radio busy".into())),
        };
        assert_eq!(wrapped.class(), ErrorClass::Invocation);
        assert!(wrapped.is_recoverable());
        assert!(wrapped.to_string().contains("radio busy"));

        let cfg: OraError = ConfigError::MissingProperty("kE".into()).into();
        assert_eq!(cfg.class(), ErrorClass::Config);
        assert!(!cfg.is_recoverable());
        assert!(!OraError::precondition("no provider").is_recoverable());
    }

    #[test]
    fn test_table_error_converts() {
        let err: ConfigError = TableError::Unsorted("e_nd".into()).into();
        assert!(matches!(err, ConfigError::Table(TableError::Unsorted(_))));
        assert!(err.to_string().contains("e_nd"));
    }
}
