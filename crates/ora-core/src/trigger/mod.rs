//! # Trigger Policy
//!
//! Decides when the reasoner runs. [`rules`] holds the pure per-tick
//! evaluation (deadband, convergence, saturation and battery rules);
//! [`monitor`] runs it on a sampling thread against live measurements.

pub mod monitor;
pub mod rules;

pub use monitor::{LastTrigger, PowerScalingMonitor};
pub use rules::{ControlState, RuleOutcome, RuleParams, Sample, TriggerCause, WARMUP_TICKS};
