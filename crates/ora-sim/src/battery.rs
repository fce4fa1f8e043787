//! Simulated battery draining with transmit power.

use ora_core::devices::BatteryMonitor;
use ora_core::Result;
use std::sync::Mutex;

/// Battery whose charge falls by `idle_drain + tx_drain_per_mw * P(mW)`
/// per simulation step.
#[derive(Debug)]
pub struct SimBattery {
    max_capacity: f64,
    available: Mutex<f64>,
    idle_drain: f64,
    tx_drain_per_mw: f64,
}

impl SimBattery {
    pub fn new(max_capacity: f64, initial: f64, idle_drain: f64, tx_drain_per_mw: f64) -> Self {
        Self {
            max_capacity,
            available: Mutex::new(initial.clamp(0.0, max_capacity)),
            idle_drain,
            tx_drain_per_mw,
        }
    }

    /// Drain one step at `tx_mw`. Returns the remaining charge.
    pub fn drain(&self, tx_mw: f64) -> f64 {
        let mut available = self.available.lock().unwrap_or_else(|p| p.into_inner());
        *available = (*available - self.idle_drain - self.tx_drain_per_mw * tx_mw).max(0.0);
        *available
    }

    pub fn level(&self) -> f64 {
        *self.available.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_level(&self, level: f64) {
        *self.available.lock().unwrap_or_else(|p| p.into_inner()) = level.clamp(0.0, self.max_capacity);
    }
}

impl BatteryMonitor for SimBattery {
    fn available_capacity(&self) -> Result<f64> {
        Ok(self.level())
    }

    fn maximum_capacity(&self) -> Result<f64> {
        Ok(self.max_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_drain_scales_with_power() {
        let battery = SimBattery::new(720.0, 720.0, 0.5, 2.0);
        assert_relative_eq!(battery.drain(1.0), 717.5);
        assert_relative_eq!(battery.drain(0.001), 717.5 - 0.5 - 0.002);
        assert_relative_eq!(battery.maximum_capacity().unwrap(), 720.0);
    }

    #[test]
    fn test_never_negative() {
        let battery = SimBattery::new(10.0, 1.0, 5.0, 0.0);
        assert_eq!(battery.drain(0.0), 0.0);
        battery.set_level(50.0);
        assert_eq!(battery.available_capacity().unwrap(), 10.0);
    }
}
