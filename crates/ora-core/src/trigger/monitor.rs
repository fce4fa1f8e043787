//! # Power Scaling Monitor
//!
//! The trigger policy: a named sampling thread that, once per
//! `trigger.interval`, measures the node and runs the [trigger rules](super::rules).
//!
//! ```text
//!            ┌────────────────────── tick ───────────────────────┐
//!            │ reset? ─> refresh ND ─> wait ─> rules ─> trigger() │
//!            └───────────────────────────────────────────────────┘
//!  start() ──> STARTED ──suspend()──> SUSPENDED   (ticks continue, no firing)
//!  stop()  ──> DIED ──(loop exits)──> CREATED
//! ```
//!
//! The wait is a condition-variable timed wait on the policy state, so
//! `stop()` wakes the loop immediately. Controller history is owned by the
//! loop and handed back through its join handle, so a restarted policy
//! resumes with the same history.

use super::rules::{ControlState, RuleOutcome, RuleParams, Sample, TriggerCause};
use crate::bundle::Value;
use crate::devices::{BatteryLevelObservation, BatteryMonitor, NeighborDiscovery, NodeDegreeObservation};
use crate::error::{ConfigError, Result};
use crate::observe::{now_millis, ControlMetrics, StatusRecord};
use crate::ora::{same_object, Observation, Observer, PolicyState, Resettable, Triggerable, TriggerPolicy};
use crate::properties::{defaults, keys, ReconfigurationProperties};
use crate::radio::RadioAccess;
use crate::resources;
use crate::rt::{self, ThreadConfig};
use crate::urn::Urn;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

/// Subtracted from the interval before each wait.
const TICK_OVERHEAD_MS: u64 = 500;
/// Shortest wait between ticks.
const MIN_WAIT_MS: u64 = 10;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Cause and error of the most recent firing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastTrigger {
    pub cause: TriggerCause,
    pub error: f64,
}

impl Default for LastTrigger {
    fn default() -> Self {
        Self {
            cause: TriggerCause::BatteryLevel,
            error: 0.0,
        }
    }
}

/// Publishes the cause of the last firing (urn).
struct TriggerReasonObservation {
    id: Urn,
    last: Arc<Mutex<LastTrigger>>,
}

impl Observation for TriggerReasonObservation {
    fn id(&self) -> &Urn {
        &self.id
    }

    fn value(&self) -> Result<Value> {
        Ok(Value::Urn(lock(&self.last).cause.urn()))
    }
}

/// Publishes the error of the last firing (double).
struct TriggerReasonValueObservation {
    id: Urn,
    last: Arc<Mutex<LastTrigger>>,
}

impl Observation for TriggerReasonValueObservation {
    fn id(&self) -> &Urn {
        &self.id
    }

    fn value(&self) -> Result<Value> {
        Ok(Value::Double(lock(&self.last).error))
    }
}

struct Shared {
    state: Mutex<PolicyState>,
    wake: Condvar,
    triggerables: Mutex<Vec<Arc<dyn Triggerable>>>,
    resettables: Mutex<Vec<Arc<dyn Resettable>>>,
    last: Arc<Mutex<LastTrigger>>,
    params: RuleParams,
    props: ReconfigurationProperties,
    radio: Arc<dyn RadioAccess>,
    node_degree: Arc<NodeDegreeObservation>,
    battery: Arc<BatteryLevelObservation>,
    reason: Arc<TriggerReasonObservation>,
    reason_value: Arc<TriggerReasonValueObservation>,
    metrics: Option<Arc<ControlMetrics>>,
}

/// Threaded trigger policy for transmit-power scaling.
pub struct PowerScalingMonitor {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<ControlState>>>,
    /// History used by the next start when no loop ran before
    initial: Mutex<Option<ControlState>>,
}

impl PowerScalingMonitor {
    /// Build the policy from the properties store.
    ///
    /// Reads `ND_MIN`, `CR_MAX`, `DELTA_ND_MIN`, `kE`, `DELTA_CR_MIN`,
    /// `E_cr` and `NDRef` once; `KSI_ND`, `ND_R`, `NDRef` and
    /// `trigger.interval` are re-read every tick.
    pub fn new(
        props: ReconfigurationProperties,
        radio: Arc<dyn RadioAccess>,
        discovery: Arc<dyn NeighborDiscovery>,
        battery: Arc<dyn BatteryMonitor>,
    ) -> std::result::Result<Self, ConfigError> {
        let params = RuleParams::from_properties(&props)?;
        let nd_ref: i64 = props.parse(keys::ND_REF)?;
        let interval = props.parse_or(keys::TRIGGER_INTERVAL, defaults::FALLBACK_INTERVAL_MS)?;
        tracing::debug!(interval_ms = interval, ?params, "Monitor configured");

        let last = Arc::new(Mutex::new(LastTrigger::default()));
        let shared = Shared {
            state: Mutex::new(PolicyState::Created),
            wake: Condvar::new(),
            triggerables: Mutex::new(Vec::new()),
            resettables: Mutex::new(Vec::new()),
            reason: Arc::new(TriggerReasonObservation {
                id: resources::trigger_reason(),
                last: last.clone(),
            }),
            reason_value: Arc::new(TriggerReasonValueObservation {
                id: resources::trigger_reason_value(),
                last: last.clone(),
            }),
            last,
            params,
            props,
            radio,
            node_degree: Arc::new(NodeDegreeObservation::new(discovery)),
            battery: Arc::new(BatteryLevelObservation::new(battery)),
            metrics: None,
        };

        Ok(Self {
            shared: Arc::new(shared),
            handle: Mutex::new(None),
            initial: Mutex::new(Some(ControlState::new(nd_ref))),
        })
    }

    /// Attach metrics. Call before `start`.
    pub fn with_metrics(mut self, metrics: Arc<ControlMetrics>) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.metrics = Some(metrics),
            None => tracing::warn!("Metrics must be attached before the monitor starts"),
        }
        self
    }

    /// Register a component cleared when the `reset` property is raised.
    pub fn register_resettable(&self, resettable: Arc<dyn Resettable>) {
        lock(&self.shared.resettables).push(resettable);
    }

    pub fn node_degree_observation(&self) -> &Arc<NodeDegreeObservation> {
        &self.shared.node_degree
    }

    pub fn battery_observation(&self) -> &Arc<BatteryLevelObservation> {
        &self.shared.battery
    }

    pub fn last_trigger(&self) -> LastTrigger {
        *lock(&self.shared.last)
    }

    pub fn params(&self) -> &RuleParams {
        &self.shared.params
    }
}

impl Shared {
    fn state(&self) -> PolicyState {
        *lock(&self.state)
    }

    fn nd_ref(&self) -> i64 {
        self.props.parse_or(keys::ND_REF, defaults::ND_REF).unwrap_or(defaults::ND_REF)
    }

    fn interval(&self) -> Duration {
        let interval = self
            .props
            .parse_or(keys::TRIGGER_INTERVAL, defaults::FALLBACK_INTERVAL_MS)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Bad trigger interval, using fallback");
                defaults::FALLBACK_INTERVAL_MS
            });
        Duration::from_millis(interval.saturating_sub(TICK_OVERHEAD_MS).max(MIN_WAIT_MS))
    }

    /// Sampling loop. Returns the controller history when the policy dies.
    fn run(self: Arc<Self>, mut control: ControlState) -> ControlState {
        let mut sequence = 0u64;
        tracing::info!("Sampling loop started");
        loop {
            sequence += 1;
            if self.props.flag(keys::RESET) {
                self.reset(&mut control);
            }
            if let Err(e) = self.node_degree.refresh() {
                tracing::warn!(error = %e, "Node degree refresh failed");
            }
            if let Some(m) = &self.metrics {
                m.node_degree.set(self.node_degree.current());
            }

            let wait = self.interval();
            let state = {
                let guard = lock(&self.state);
                let (mut guard, _) = self
                    .wake
                    .wait_timeout_while(guard, wait, |s| *s != PolicyState::Died)
                    .unwrap_or_else(|p| p.into_inner());
                if *guard == PolicyState::Died {
                    *guard = PolicyState::Created;
                    tracing::info!(ticks = control.ticks(), "Sampling loop stopped");
                    return control;
                }
                *guard
            };

            if let Some(m) = &self.metrics {
                m.ticks.inc();
            }
            if state == PolicyState::Started && self.props.is(keys::REASONING_STATUS, defaults::REASONING_STATUS) {
                self.fire_if_needed(&mut control);
            }
            self.status(sequence).emit();
        }
    }

    fn reset(&self, control: &mut ControlState) {
        tracing::info!("Resetting transmit-power history");
        self.props.set(keys::RESET, false);
        match self.props.parse_or(keys::PTX, defaults::PTX) {
            Ok(ptx) => {
                if let Err(e) = self.radio.set_output_power(ptx) {
                    tracing::warn!(error = %e, ptx, "Could not restore transmit power");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Bad ptx property"),
        }
        control.reset_history();
        let resettables: Vec<_> = lock(&self.resettables).clone();
        for r in resettables {
            r.reset();
        }
        if let Some(m) = &self.metrics {
            m.resets.inc();
        }
    }

    fn sample(&self) -> Result<Sample> {
        let battery_level = self.battery.battery().available_capacity()?;
        let cr_index = self.radio.cr_index()? as i64;
        if let Some(m) = &self.metrics {
            m.cr_index.set(cr_index);
            m.record_battery_level(battery_level);
        }
        Ok(Sample {
            node_degree: self.node_degree.current(),
            battery_level,
            nd_r: self.props.parse(keys::ND_R)?,
            ksi_nd: self.props.parse(keys::KSI_ND)?,
            nd_ref: self.props.parse(keys::ND_REF)?,
            cr_index,
        })
    }

    fn fire_if_needed(&self, control: &mut ControlState) {
        let sample = match self.sample() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Sampling failed, tick skipped");
                if let Some(m) = &self.metrics {
                    m.tick_failures.inc();
                }
                return;
            }
        };

        let outcome = control.evaluate(&sample, &self.params);
        tracing::debug!(
            node_degree = sample.node_degree,
            nd_r = sample.nd_r,
            cr = sample.cr_index,
            e_nd = outcome.e_nd,
            e_bl = outcome.e_bl,
            fired = outcome.fired(),
            "Trigger rules evaluated"
        );
        self.record(&outcome);

        let Some((cause, error)) = outcome.fire else {
            return;
        };
        *lock(&self.last) = LastTrigger { cause, error };
        tracing::info!(%cause, error, "Trigger fired");

        let first = lock(&self.triggerables).first().cloned();
        match first {
            Some(t) => {
                if let Err(e) = t.trigger() {
                    tracing::warn!(error = %e, "Triggered reasoner failed");
                    if let Some(m) = &self.metrics {
                        m.tick_failures.inc();
                    }
                }
            }
            None => tracing::warn!("Trigger fired with nothing registered"),
        }
    }

    fn record(&self, outcome: &RuleOutcome) {
        let Some(m) = &self.metrics else {
            return;
        };
        if outcome.suppressed {
            m.suppressed.inc();
        }
        match outcome.fire {
            Some((TriggerCause::NodeDegree, _)) => {
                m.fires.inc();
                m.nd_events.inc();
            }
            Some((TriggerCause::BatteryLevel, _)) => {
                m.fires.inc();
                m.bl_events.inc();
            }
            None => {}
        }
    }

    fn status(&self, sequence: u64) -> StatusRecord {
        let battery = self.battery.battery();
        StatusRecord {
            sequence,
            timestamp_ms: now_millis(),
            node_degree: self.node_degree.current(),
            max_battery: battery.maximum_capacity().unwrap_or(f64::NAN),
            available_battery: battery.available_capacity().unwrap_or(f64::NAN),
            transmit_power: self.radio.output_power().unwrap_or(i32::MIN),
            nd_r: self.props.parse_or(keys::ND_R, -1).unwrap_or(-1),
            ksi_nd: self.props.parse_or(keys::KSI_ND, f64::NAN).unwrap_or(f64::NAN),
            k_cr: self.props.parse_or(keys::K_CR, f64::NAN).unwrap_or(f64::NAN),
            e_cr: self.params.e_cr,
            neighbors: self.node_degree.neighbors(),
        }
    }
}

impl Observer for PowerScalingMonitor {
    fn observations(&self) -> Vec<Arc<dyn Observation>> {
        vec![
            self.shared.node_degree.clone(),
            self.shared.battery.clone(),
            self.shared.reason.clone(),
            self.shared.reason_value.clone(),
        ]
    }
}

impl TriggerPolicy for PowerScalingMonitor {
    fn start(&self) -> Result<()> {
        let mut handle = lock(&self.handle);
        if !matches!(self.shared.state(), PolicyState::Created | PolicyState::Died) {
            return Ok(());
        }

        // a stopped loop wakes on the notify, marks itself Created and exits;
        // the state lock must be free while joining it
        let control = match handle.take() {
            Some(previous) => previous.join().ok(),
            None => lock(&self.initial).take(),
        }
        .unwrap_or_else(|| ControlState::new(self.shared.nd_ref()));

        let mut state = lock(&self.shared.state);
        let shared = self.shared.clone();
        let config = ThreadConfig::builder().name(rt::SAMPLER_THREAD).build();
        match rt::spawn_named(config, move || shared.run(control)) {
            Ok(h) => {
                *handle = Some(h);
                *state = PolicyState::Started;
                tracing::info!("Trigger policy started");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not start sampling loop");
                Err(e)
            }
        }
    }

    fn stop(&self) {
        let mut state = lock(&self.shared.state);
        if *state == PolicyState::Started {
            *state = PolicyState::Died;
            self.shared.wake.notify_all();
            tracing::info!("Trigger policy stopping");
        }
    }

    fn suspend(&self) {
        let mut state = lock(&self.shared.state);
        if *state == PolicyState::Started {
            *state = PolicyState::Suspended;
            tracing::info!("Trigger policy suspended");
        }
    }

    fn resume(&self) {
        let mut state = lock(&self.shared.state);
        if *state == PolicyState::Suspended {
            *state = PolicyState::Started;
            tracing::info!("Trigger policy resumed");
        }
    }

    fn state(&self) -> PolicyState {
        self.shared.state()
    }

    fn register_triggerable(&self, triggerable: Arc<dyn Triggerable>) {
        lock(&self.shared.triggerables).push(triggerable);
    }

    fn unregister_triggerable(&self, triggerable: &Arc<dyn Triggerable>) {
        let mut list = lock(&self.shared.triggerables);
        if let Some(pos) = list.iter().position(|t| same_object(t, triggerable)) {
            list.remove(pos);
        }
    }
}

impl Drop for PowerScalingMonitor {
    fn drop(&mut self) {
        {
            let mut state = lock(&self.shared.state);
            if matches!(*state, PolicyState::Started | PolicyState::Suspended) {
                *state = PolicyState::Died;
                self.shared.wake.notify_all();
            }
        }
        if let Some(handle) = lock(&self.handle).take() {
            if handle.join().is_err() {
                tracing::error!("Sampling loop panicked");
            }
        }
    }
}

impl std::fmt::Debug for PowerScalingMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerScalingMonitor")
            .field("state", &self.shared.state())
            .field("params", &self.shared.params)
            .finish()
    }
}
