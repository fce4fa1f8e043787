//! Scenario description for a simulated node.
//!
//! ```yaml
//! seed: 42
//! step_ms: 100
//! battery:
//!   max_capacity: 720.0
//!   initial: 720.0
//!   idle_drain: 0.01
//!   tx_drain_per_mw: 0.5
//! churn: 0.05
//! neighbors:
//!   - { address: "fe80::1", required_ptx: -30 }
//!   - { address: "fe80::2", required_ptx: -25 }
//! ```

use crate::neighborhood::SimNeighbor;
use crate::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Battery model parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryScenario {
    pub max_capacity: f64,
    pub initial: f64,
    /// Charge lost per step regardless of radio activity.
    pub idle_drain: f64,
    /// Charge lost per step per milliwatt of transmit power.
    pub tx_drain_per_mw: f64,
}

impl Default for BatteryScenario {
    fn default() -> Self {
        Self {
            max_capacity: 720.0,
            initial: 720.0,
            idle_drain: 0.01,
            tx_drain_per_mw: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// RNG seed for neighbour churn.
    pub seed: u64,
    /// Environment step period in milliseconds.
    pub step_ms: u64,
    pub battery: BatteryScenario,
    pub churn: f64,
    pub neighbors: Vec<SimNeighbor>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            step_ms: 100,
            battery: BatteryScenario::default(),
            churn: 0.0,
            neighbors: vec![
                SimNeighbor::new("fe80::1", -30),
                SimNeighbor::new("fe80::2", -25),
                SimNeighbor::new("fe80::3", -19),
                SimNeighbor::new("fe80::4", -12),
            ],
        }
    }
}

impl ScenarioConfig {
    pub fn parse(yaml: &str) -> SimResult<Self> {
        let scenario: Self =
            serde_yaml::from_str(yaml).map_err(|e| SimError::Scenario(e.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load_from(path: &Path) -> SimResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SimError::Scenario(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.step_ms == 0 {
            return Err(SimError::Scenario("step_ms must be positive".into()));
        }
        if !(self.battery.max_capacity > 0.0) {
            return Err(SimError::Scenario("battery.max_capacity must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.churn) {
            return Err(SimError::Scenario(format!("churn {} outside [0, 1]", self.churn)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let scenario = ScenarioConfig::parse("seed: 7\nbattery:\n  initial: 100.0\n").unwrap();
        assert_eq!(scenario.seed, 7);
        assert_eq!(scenario.step_ms, 100);
        assert_eq!(scenario.battery.initial, 100.0);
        assert_eq!(scenario.battery.max_capacity, 720.0);
        assert_eq!(scenario.neighbors.len(), 4);
    }

    #[test]
    fn test_neighbors_parse() {
        let scenario = ScenarioConfig::parse(
            "neighbors:\n  - { address: \"a\", required_ptx: -10 }\n",
        )
        .unwrap();
        assert_eq!(scenario.neighbors, vec![SimNeighbor::new("a", -10)]);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(ScenarioConfig::parse("step_ms: 0\n").is_err());
        assert!(ScenarioConfig::parse("churn: 2.0\n").is_err());
        assert!(ScenarioConfig::parse("seed: [\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.yaml");
        std::fs::write(&path, "churn: 0.5\n").unwrap();
        assert_eq!(ScenarioConfig::load_from(&path).unwrap().churn, 0.5);
        assert!(ScenarioConfig::load_from(&dir.path().join("missing.yaml")).is_err());
    }
}
