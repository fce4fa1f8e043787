//! Simulated neighbour discovery.
//!
//! Each neighbour needs a minimum transmit power to be reachable. The node
//! degree is the number of neighbours whose requirement is at or below the
//! radio's current power. Churn moves those requirements up and down by a
//! few dB each step, seeded for reproducible runs.

use crate::radio::SimRadio;
use ora_core::devices::NeighborDiscovery;
use ora_core::radio::{MAX_PTX, MIN_PTX};
use ora_core::{RadioAccess, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// A neighbour and the power needed to reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimNeighbor {
    pub address: String,
    /// Minimum transmit power in dBm.
    pub required_ptx: i32,
}

impl SimNeighbor {
    pub fn new(address: impl Into<String>, required_ptx: i32) -> Self {
        Self {
            address: address.into(),
            required_ptx,
        }
    }
}

pub struct SimNeighborhood {
    radio: Arc<SimRadio>,
    neighbors: Mutex<Vec<SimNeighbor>>,
    rng: Mutex<StdRng>,
    /// Probability per step that a neighbour's requirement moves.
    churn: f64,
}

impl SimNeighborhood {
    pub fn new(radio: Arc<SimRadio>, neighbors: Vec<SimNeighbor>, seed: u64, churn: f64) -> Self {
        Self {
            radio,
            neighbors: Mutex::new(neighbors),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            churn: churn.clamp(0.0, 1.0),
        }
    }

    /// Perturb neighbour requirements by up to ±3 dB.
    pub fn step(&self) {
        if self.churn <= 0.0 {
            return;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        let mut neighbors = self.neighbors.lock().unwrap_or_else(|p| p.into_inner());
        for neighbor in neighbors.iter_mut() {
            if rng.gen_bool(self.churn) {
                let shift: i32 = rng.gen_range(-3..=3);
                neighbor.required_ptx = (neighbor.required_ptx + shift).clamp(MIN_PTX, MAX_PTX);
            }
        }
    }

    pub fn snapshot(&self) -> Vec<SimNeighbor> {
        self.neighbors.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn reachable(&self) -> Result<Vec<String>> {
        let dbm = self.radio.output_power()?;
        Ok(self
            .neighbors
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|n| n.required_ptx <= dbm)
            .map(|n| n.address.clone())
            .collect())
    }
}

impl NeighborDiscovery for SimNeighborhood {
    fn neighbor_count(&self) -> Result<usize> {
        Ok(self.reachable()?.len())
    }

    fn neighbors(&self) -> Vec<String> {
        self.reachable().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighborhood(churn: f64) -> (Arc<SimRadio>, SimNeighborhood) {
        let radio = Arc::new(SimRadio::new(26, -32).unwrap());
        let neighbors = vec![
            SimNeighbor::new("fe80::1", -32),
            SimNeighbor::new("fe80::2", -25),
            SimNeighbor::new("fe80::3", -10),
        ];
        let hood = SimNeighborhood::new(radio.clone(), neighbors, 7, churn);
        (radio, hood)
    }

    #[test]
    fn test_count_follows_power() {
        let (radio, hood) = neighborhood(0.0);
        assert_eq!(hood.neighbor_count().unwrap(), 1);
        radio.set_output_power(-25).unwrap();
        assert_eq!(hood.neighbor_count().unwrap(), 2);
        radio.set_output_power(-3).unwrap();
        assert_eq!(hood.neighbors(), vec!["fe80::1", "fe80::2", "fe80::3"]);
    }

    #[test]
    fn test_churn_is_seeded() {
        let (_, a) = neighborhood(1.0);
        let (_, b) = neighborhood(1.0);
        for _ in 0..10 {
            a.step();
            b.step();
        }
        assert_eq!(a.snapshot(), b.snapshot());
        assert!(a
            .snapshot()
            .iter()
            .all(|n| (MIN_PTX..=MAX_PTX).contains(&n.required_ptx)));
    }

    #[test]
    fn test_no_churn_is_static() {
        let (_, hood) = neighborhood(0.0);
        let before = hood.snapshot();
        hood.step();
        assert_eq!(hood.snapshot(), before);
    }
}
