//! Trigger and status records.
//!
//! One [`TriggerRecord`] per reasoner run and one [`StatusRecord`] per
//! sampling tick, rendered as CSV lines and emitted on the
//! [`RECORD_TARGET`] tracing target so a subscriber layer can route them
//! to a file or collector.

use serde::Serialize;
use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

/// Tracing target of emitted records.
pub const RECORD_TARGET: &str = "ora::record";

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Outcome of one reasoner run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerRecord {
    pub node_id: String,
    pub timestamp_ms: u64,
    /// -1 when the observation could not be read
    pub node_degree: i64,
    /// dBm
    pub transmit_power: i32,
    /// -1 when the observation could not be read
    pub battery_level: f64,
    pub delta_cr: f64,
    /// NaN unless the secondary loop ran
    pub delta_nd: f64,
    pub cause: String,
    pub value: String,
}

impl TriggerRecord {
    /// `node,timestamp,nd,ptx,battery,delta_cr,delta_nd,cause,value`
    pub fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{}",
            self.node_id,
            self.timestamp_ms,
            self.node_degree,
            self.transmit_power,
            self.battery_level,
            self.delta_cr,
            self.delta_nd,
            self.cause,
            self.value
        )
    }

    pub fn emit(&self) {
        tracing::info!(target: RECORD_TARGET, kind = "trigger", record = %self.to_csv());
    }
}

/// Node status at one sampling tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRecord {
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub node_degree: i64,
    pub max_battery: f64,
    pub available_battery: f64,
    /// dBm
    pub transmit_power: i32,
    pub nd_r: i64,
    pub ksi_nd: f64,
    pub k_cr: f64,
    pub e_cr: f64,
    pub neighbors: Vec<String>,
}

impl StatusRecord {
    /// `seq,timestamp,nd,max,available,ptx,nd_r,ksi,k_cr,e_cr,` followed by
    /// one `neighbor,` per neighbor.
    pub fn to_csv(&self) -> String {
        let mut line = format!(
            "{},{},{},{},{},{},{},{},{},{},",
            self.sequence,
            self.timestamp_ms,
            self.node_degree,
            self.max_battery,
            self.available_battery,
            self.transmit_power,
            self.nd_r,
            self.ksi_nd,
            self.k_cr,
            self.e_cr
        );
        for n in &self.neighbors {
            let _ = write!(line, "{n},");
        }
        line
    }

    pub fn emit(&self) {
        tracing::info!(target: RECORD_TARGET, kind = "status", record = %self.to_csv());
    }
}
