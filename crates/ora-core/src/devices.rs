//! Hardware-facing observations and the transmit-power actuator.
//!
//! The node's neighbour discovery, battery and radio are reached through
//! the [`NeighborDiscovery`], [`BatteryMonitor`] and
//! [`RadioAccess`](crate::radio::RadioAccess) traits so the same control
//! loop runs on real hardware and in simulation.

use crate::bundle::{Bundle, Value};
use crate::error::{OraError, Result};
use crate::observe::ControlMetrics;
use crate::ora::{Action, Actuator, Observation, Resettable};
use crate::properties::{keys, ReconfigurationProperties};
use crate::radio::{self, RadioAccess};
use crate::resources;
use crate::urn::Urn;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Source of the node's neighbour table.
pub trait NeighborDiscovery: Send + Sync {
    /// Number of neighbours currently reachable.
    fn neighbor_count(&self) -> Result<usize>;

    /// Addresses of the reachable neighbours.
    fn neighbors(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Source of battery capacity readings.
pub trait BatteryMonitor: Send + Sync {
    fn available_capacity(&self) -> Result<f64>;

    fn maximum_capacity(&self) -> Result<f64>;
}

/// Node degree (int). Serves the value measured by the last [`refresh`](Self::refresh).
pub struct NodeDegreeObservation {
    id: Urn,
    discovery: Arc<dyn NeighborDiscovery>,
    cached: AtomicI64,
}

impl NodeDegreeObservation {
    pub fn new(discovery: Arc<dyn NeighborDiscovery>) -> Self {
        Self {
            id: resources::nd_observation(),
            discovery,
            cached: AtomicI64::new(0),
        }
    }

    /// Measure the node degree now.
    pub fn refresh(&self) -> Result<i64> {
        let count = self.discovery.neighbor_count()? as i64;
        self.cached.store(count, Ordering::Relaxed);
        Ok(count)
    }

    /// Value of the last refresh.
    pub fn current(&self) -> i64 {
        self.cached.load(Ordering::Relaxed)
    }

    pub fn neighbors(&self) -> Vec<String> {
        self.discovery.neighbors()
    }
}

impl Observation for NodeDegreeObservation {
    fn id(&self) -> &Urn {
        &self.id
    }

    fn value(&self) -> Result<Value> {
        Ok(Value::Int(self.current()))
    }
}

/// Available battery capacity (double).
pub struct BatteryLevelObservation {
    id: Urn,
    battery: Arc<dyn BatteryMonitor>,
}

impl BatteryLevelObservation {
    pub fn new(battery: Arc<dyn BatteryMonitor>) -> Self {
        Self {
            id: resources::bl_observation(),
            battery,
        }
    }

    pub fn battery(&self) -> &Arc<dyn BatteryMonitor> {
        &self.battery
    }
}

impl Observation for BatteryLevelObservation {
    fn id(&self) -> &Urn {
        &self.id
    }

    fn value(&self) -> Result<Value> {
        self.battery.available_capacity().map(Value::Double)
    }
}

/// Applies transmit-power index deltas to the radio.
///
/// Deltas accumulate into `cr`; the applied index is `round(cr + CR0)`
/// saturated to the channel's table. A saturating delta is not kept.
pub struct PowerTransmissionAction {
    id: Urn,
    radio: Arc<dyn RadioAccess>,
    cr0: f64,
    cr: Mutex<f64>,
    metrics: Option<Arc<ControlMetrics>>,
}

impl PowerTransmissionAction {
    /// Read `CR0` from `props`, defaulting to the channel's lowest index.
    pub fn new(props: &ReconfigurationProperties, radio: Arc<dyn RadioAccess>) -> Result<Self> {
        let channel = radio.channel();
        let cr0 = props.parse_or(keys::CR0, radio::min_ptx_index(channel) as f64)?;
        Ok(Self {
            id: resources::pt_action(),
            radio,
            cr0,
            cr: Mutex::new(0.0),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<ControlMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Accumulated index offset.
    pub fn accumulated(&self) -> f64 {
        *self.cr.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn cr0(&self) -> f64 {
        self.cr0
    }

    fn apply(&self, delta_cr: f64) -> Result<()> {
        let channel = self.radio.channel();
        let min = radio::min_ptx_index(channel) as i64;
        let max = radio::max_ptx_index(channel) as i64;

        let mut cr = self.cr.lock().unwrap_or_else(|p| p.into_inner());
        *cr += delta_cr;
        let target = *cr + self.cr0;
        let mut index = (target + 0.5).floor() as i64;
        if index > max {
            index = max;
            *cr -= delta_cr;
        }
        if index < min {
            index = min;
            *cr -= delta_cr;
        }

        let dbm = radio::ptx_at_index(channel, index as usize).ok_or_else(|| {
            OraError::Device(format!("no power level at index {index} on channel {channel}"))
        })?;
        self.radio.set_output_power(dbm)?;
        tracing::debug!(delta_cr, cr = *cr, target, index, dbm, "Transmit power updated");

        if let Some(m) = &self.metrics {
            m.action_invocations.inc();
            m.cr_index.set(index);
        }
        Ok(())
    }
}

impl Action for PowerTransmissionAction {
    fn id(&self) -> &Urn {
        &self.id
    }

    fn invoke(&self, args: &Bundle) -> Result<()> {
        if !args.contains_key(resources::DELTA_CR_KEY) {
            tracing::debug!("Transmit power action invoked without delta_cr");
            return Ok(());
        }
        let delta_cr = args.get_f64(resources::DELTA_CR_KEY)?;
        if !delta_cr.is_finite() {
            tracing::warn!(delta_cr, "Transmit power action invoked with non-finite delta_cr");
            return Ok(());
        }
        self.apply(delta_cr)
    }
}

impl Resettable for PowerTransmissionAction {
    fn reset(&self) {
        *self.cr.lock().unwrap_or_else(|p| p.into_inner()) = 0.0;
    }
}

/// Actuator publishing the transmit-power action.
pub struct PowerTransmissionActuator {
    action: Arc<PowerTransmissionAction>,
}

impl PowerTransmissionActuator {
    pub fn new(action: PowerTransmissionAction) -> Self {
        Self {
            action: Arc::new(action),
        }
    }

    pub fn action(&self) -> &Arc<PowerTransmissionAction> {
        &self.action
    }
}

impl Actuator for PowerTransmissionActuator {
    fn actions(&self) -> Vec<Arc<dyn Action>> {
        vec![self.action.clone()]
    }
}

impl Resettable for PowerTransmissionActuator {
    fn reset(&self) {
        self.action.reset();
        tracing::debug!("Transmit power accumulator reset");
    }
}
