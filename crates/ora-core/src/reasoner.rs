//! # Power Scaling Reasoner
//!
//! Two cascaded decision loops turning a trigger into a transmit-power
//! index delta:
//!
//! ```text
//!  BL event: e_BL ──> secondary loop ──> ND_R = NDRef + ceil(Δu2) ──> e_ND = ND_R - ND ─┐
//!                                                                                     ▼
//!  ND event: e_ND ───────────────────────────────────────────────────────> primary loop ──> delta_cr
//!                                                                                     │
//!                                          updatePowerTransmission { delta_cr } <─────┘
//! ```
//!
//! The secondary loop writes `ND_R` back into the properties store, where
//! the trigger policy reads it as the node-degree reference of the next
//! sampling instant.

use crate::bundle::{Bundle, Value};
use crate::decision::{DecisionEngine, Interp1dEngine};
use crate::error::{ConfigError, OraError, Result};
use crate::observe::{now_millis, ControlMetrics, TriggerRecord};
use crate::ora::{ActionProvider, ObservationProvider, Reasoner, Triggerable};
use crate::properties::{keys, ReconfigurationProperties};
use crate::radio::RadioAccess;
use crate::resources;
use crate::trigger::TriggerCause;
use crate::urn::Urn;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

struct ReasonerState {
    primary: Box<dyn DecisionEngine>,
    secondary: Box<dyn DecisionEngine>,
    /// Node degree the secondary loop last based `ND_R` on
    nd: i64,
    /// `ND_R` written by the last secondary run
    nd_r: Option<i64>,
    delta_cr: f64,
}

/// Two-loop transmit-power controller.
pub struct PowerScalingReasoner {
    props: ReconfigurationProperties,
    k_e: f64,
    kdelta_nd: f64,
    state: Mutex<ReasonerState>,
    actions: Mutex<Option<Weak<dyn ActionProvider>>>,
    observations: Mutex<Option<Weak<dyn ObservationProvider>>>,
    radio: Option<Arc<dyn RadioAccess>>,
    metrics: Option<Arc<ControlMetrics>>,
    node_id: String,
}

/// Resolve a table file name against `dir`. A leading `/` is a resource
/// path relative to the table directory, not an absolute path.
pub fn resolve_table(dir: &Path, name: &str) -> PathBuf {
    dir.join(name.trim_start_matches('/'))
}

impl PowerScalingReasoner {
    /// Build the reasoner, loading both decision tables from `table_dir`.
    pub fn from_properties(props: ReconfigurationProperties, table_dir: &Path) -> std::result::Result<Self, ConfigError> {
        let primary = props.require(keys::FDM_PRIMARY)?;
        let secondary = props.require(keys::FDM_SECONDARY)?;
        let primary = Interp1dEngine::load(&resolve_table(table_dir, &primary))?;
        let secondary = Interp1dEngine::load(&resolve_table(table_dir, &secondary))?;
        Self::with_engines(props, Box::new(primary), Box::new(secondary))
    }

    /// Build the reasoner around already configured engines.
    ///
    /// Requires `kE`, `kdeltaND`, `ND`, `k_ND`, `k_CR` and the four
    /// decision variable IDs, each of which must exist in its engine.
    pub fn with_engines(
        props: ReconfigurationProperties,
        primary: Box<dyn DecisionEngine>,
        secondary: Box<dyn DecisionEngine>,
    ) -> std::result::Result<Self, ConfigError> {
        let k_e: f64 = props.parse(keys::KE)?;
        let kdelta_nd: f64 = props.parse(keys::KDELTA_ND)?;
        let nd: i64 = props.parse(keys::ND)?;
        let k_nd: f64 = props.parse(keys::K_ND)?;
        let k_cr: f64 = props.parse(keys::K_CR)?;

        for (key, engine) in [
            (keys::VAR_E_ND, &primary),
            (keys::VAR_DU_CR, &primary),
            (keys::VAR_E_E, &secondary),
            (keys::VAR_DU_ND, &secondary),
        ] {
            let id = props.require(key)?;
            if !engine.has_variable(&id) {
                return Err(ConfigError::Validation(format!(
                    "decision variable '{id}' ({key}) is not defined by its table"
                )));
            }
        }

        tracing::debug!(nd, k_e, kdelta_nd, k_cr, k_nd, "Reasoner configured");
        Ok(Self {
            props,
            k_e,
            kdelta_nd,
            state: Mutex::new(ReasonerState {
                primary,
                secondary,
                nd,
                nd_r: None,
                delta_cr: 0.0,
            }),
            actions: Mutex::new(None),
            observations: Mutex::new(None),
            radio: None,
            metrics: None,
            node_id: String::new(),
        })
    }

    /// Radio read for the transmit power column of trigger records.
    pub fn with_radio(mut self, radio: Arc<dyn RadioAccess>) -> Self {
        self.radio = Some(radio);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ControlMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    /// Output of the last primary loop run.
    pub fn delta_cr(&self) -> f64 {
        lock(&self.state).delta_cr
    }

    /// `ND_R` written by the last secondary loop run.
    pub fn node_degree_reference(&self) -> Option<i64> {
        lock(&self.state).nd_r
    }

    fn action_provider(&self) -> Result<Arc<dyn ActionProvider>> {
        lock(&self.actions)
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| OraError::precondition("no action provider set"))
    }

    fn observation_provider(&self) -> Result<Arc<dyn ObservationProvider>> {
        lock(&self.observations)
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| OraError::precondition("no observation provider set"))
    }

    fn variable_id(&self, key: &str) -> Result<String> {
        Ok(self.props.require(key)?)
    }

    fn node_degree(observations: &dyn ObservationProvider) -> Result<i64> {
        observations
            .value(&resources::nd_observation())?
            .as_i64()
            .ok_or_else(|| OraError::precondition("observed node degree is not an integer"))
    }

    /// Secondary loop: battery error to `ND_R`. Returns the new reference.
    fn run_secondary(&self, state: &mut ReasonerState, error: f64) -> Result<i64> {
        let e_e = self.variable_id(keys::VAR_E_E)?;
        let du_nd = self.variable_id(keys::VAR_DU_ND)?;
        let engine = &mut state.secondary;
        if !engine.set_norm_factor(&e_e, self.k_e) || !engine.set_norm_factor(&du_nd, self.kdelta_nd) {
            return Err(OraError::precondition(format!("cannot access variable {e_e} or {du_nd}")));
        }
        if !engine.set_input(&e_e, error) {
            return Err(OraError::precondition(format!("cannot access variable {e_e}")));
        }
        engine.evaluate();
        let out = engine.output(&du_nd).unwrap_or(f64::NAN);
        if !out.is_finite() {
            return Err(OraError::precondition(format!("secondary loop produced {out}")));
        }
        let incr_nd = out.ceil() as i64;

        state.nd = self.props.parse(keys::ND_REF)?;
        let nd_r = state.nd + incr_nd;
        self.props.set(keys::ND_R, nd_r);
        state.nd_r = Some(nd_r);
        tracing::info!(error, incr_nd, nd_r, "Secondary loop updated node-degree reference");
        Ok(nd_r)
    }

    /// Primary loop: node-degree error to `delta_cr`.
    fn run_primary(&self, state: &mut ReasonerState, error: f64) -> Result<f64> {
        let e_nd = self.variable_id(keys::VAR_E_ND)?;
        let du_cr = self.variable_id(keys::VAR_DU_CR)?;
        // gains may be changed remotely between runs
        let k_nd: f64 = self.props.parse(keys::K_ND)?;
        let k_cr: f64 = self.props.parse(keys::K_CR)?;

        let engine = &mut state.primary;
        if !engine.set_norm_factor(&e_nd, k_nd) || !engine.set_norm_factor(&du_cr, k_cr) {
            return Err(OraError::precondition(format!("cannot access variable {e_nd} or {du_cr}")));
        }
        if !engine.set_input(&e_nd, error) {
            return Err(OraError::precondition(format!("cannot access variable {e_nd}")));
        }
        engine.evaluate();
        state.delta_cr = engine.output(&du_cr).unwrap_or(f64::NAN);
        tracing::debug!(error, k_nd, k_cr, delta_cr = state.delta_cr, "Primary loop evaluated");
        Ok(state.delta_cr)
    }
}

impl Triggerable for PowerScalingReasoner {
    /// Fire with the cause and error published by the trigger policy.
    fn trigger(&self) -> Result<()> {
        let observations = self.observation_provider()?;
        let cause = observations.value(&resources::trigger_reason())?;
        let value = observations.value(&resources::trigger_reason_value())?;
        self.trigger_with(cause.as_urn(), Some(value))
    }
}

impl Reasoner for PowerScalingReasoner {
    fn set_action_provider(&self, provider: Weak<dyn ActionProvider>) {
        *lock(&self.actions) = Some(provider);
    }

    fn set_observation_provider(&self, provider: Weak<dyn ObservationProvider>) {
        *lock(&self.observations) = Some(provider);
    }

    fn trigger_with(&self, cause: Option<&Urn>, value: Option<Value>) -> Result<()> {
        let started = Instant::now();
        let timestamp_ms = now_millis();
        let transmit_power = self
            .radio
            .as_ref()
            .and_then(|r| r.output_power().ok())
            .unwrap_or(i32::MIN);

        // record-only readings; failures leave the -1 markers
        let (node_degree, battery_level) = match self.observation_provider() {
            Ok(obs) => (
                Self::node_degree(obs.as_ref()).unwrap_or(-1),
                obs.value(&resources::bl_observation())
                    .ok()
                    .and_then(|v| v.as_f64())
                    .unwrap_or(-1.0),
            ),
            Err(_) => (-1, -1.0),
        };

        let urn = cause.ok_or_else(|| OraError::precondition("no cause provided"))?;
        let cause = TriggerCause::from_urn(urn)
            .ok_or_else(|| OraError::precondition(format!("invalid cause: {urn}")))?;
        let value = value.ok_or_else(|| OraError::precondition("no value provided"))?;
        let actions = self.action_provider()?;
        let observations = self.observation_provider()?;
        let error = value.as_f64().ok_or_else(|| {
            OraError::precondition(format!("{cause} error must be a double, got {}", value.kind()))
        })?;
        tracing::debug!(%cause, error, "Reasoner triggered");

        let mut delta_nd = f64::NAN;
        let delta_cr = match cause {
            TriggerCause::BatteryLevel => {
                let nd_r = self.run_secondary(&mut lock(&self.state), error)?;
                let error_nd = nd_r - Self::node_degree(observations.as_ref())?;
                let mut state = lock(&self.state);
                delta_nd = (error_nd + node_degree - state.nd) as f64;
                self.run_primary(&mut state, error_nd as f64)?
            }
            TriggerCause::NodeDegree => self.run_primary(&mut lock(&self.state), error)?,
        };

        let mut args = Bundle::new();
        args.put(resources::DELTA_CR_KEY, delta_cr);
        actions.invoke(&resources::pt_action(), &args)?;
        tracing::info!(%cause, error, delta_cr, "Transmit power reconfigured");

        if let Some(m) = &self.metrics {
            m.reasoner_runs.inc();
            m.reasoner_latency_us.observe(started.elapsed().as_secs_f64() * 1e6);
        }
        TriggerRecord {
            node_id: self.node_id.clone(),
            timestamp_ms,
            node_degree,
            transmit_power,
            battery_level,
            delta_cr,
            delta_nd,
            cause: urn.to_string(),
            value: value.to_string(),
        }
        .emit();
        Ok(())
    }

    fn as_triggerable(self: Arc<Self>) -> Arc<dyn Triggerable> {
        self
    }
}

impl std::fmt::Debug for PowerScalingReasoner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerScalingReasoner")
            .field("k_e", &self.k_e)
            .field("kdelta_nd", &self.kdelta_nd)
            .field("node_id", &self.node_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    const PRIMARY: &str = "NumInputs=1\nNumOutputs=1\nNumPoints=3\n\
        VarID_1=e_nd\nVarType_1=IN\nVarMIN_1=-10\nVarMAX_1=10\n\
        VarID_2=du_cr\nVarType_2=OUT\nVarMIN_2=-10\nVarMAX_2=10\n\
        e_nd=-10, 0, 10\ndu_cr=-10, 0, 10\n";

    const SECONDARY: &str = "NumInputs=1\nNumOutputs=1\nNumPoints=3\n\
        VarID_1=e_E\nVarType_1=IN\nVarMIN_1=-10\nVarMAX_1=10\n\
        VarID_2=du_nd\nVarType_2=OUT\nVarMIN_2=-10\nVarMAX_2=10\n\
        e_E=-10, 0, 10\ndu_nd=-10, 0, 10\n";

    /// Mediator stand-in serving fixed observations and recording actions.
    struct Provider {
        node_degree: i64,
        reason: Mutex<(Value, Value)>,
        invoked: Mutex<Vec<Bundle>>,
    }

    impl Provider {
        fn new(node_degree: i64) -> Arc<Self> {
            Arc::new(Self {
                node_degree,
                reason: Mutex::new((Value::Urn(resources::nd_event()), Value::Double(0.0))),
                invoked: Mutex::new(Vec::new()),
            })
        }

        fn last_delta(&self) -> f64 {
            self.invoked
                .lock()
                .unwrap()
                .last()
                .unwrap()
                .get_f64(resources::DELTA_CR_KEY)
                .unwrap()
        }
    }

    impl ObservationProvider for Provider {
        fn observation_ids(&self) -> Vec<Urn> {
            vec![resources::nd_observation(), resources::bl_observation()]
        }

        fn value(&self, id: &Urn) -> Result<Value> {
            if *id == resources::nd_observation() {
                Ok(Value::Int(self.node_degree))
            } else if *id == resources::bl_observation() {
                Ok(Value::Double(500.0))
            } else if *id == resources::trigger_reason() {
                Ok(self.reason.lock().unwrap().0.clone())
            } else if *id == resources::trigger_reason_value() {
                Ok(self.reason.lock().unwrap().1.clone())
            } else {
                Err(OraError::UnknownObservation(id.clone()))
            }
        }
    }

    impl ActionProvider for Provider {
        fn action_ids(&self) -> Vec<Urn> {
            vec![resources::pt_action()]
        }

        fn invoke(&self, id: &Urn, args: &Bundle) -> Result<()> {
            if *id != resources::pt_action() {
                return Err(OraError::UnknownAction(id.clone()));
            }
            self.invoked.lock().unwrap().push(args.clone());
            Ok(())
        }
    }

    fn props() -> ReconfigurationProperties {
        let props = ReconfigurationProperties::with_defaults(26);
        props.set(keys::KE, 1.0);
        props.set(keys::KDELTA_ND, 1.0);
        props.set(keys::ND, 5);
        props.set(keys::ND_REF, 5);
        props.set(keys::ND_R, 6);
        props.set(keys::K_ND, 1.0);
        props.set(keys::K_CR, 1.0);
        props
    }

    fn reasoner(props: ReconfigurationProperties) -> PowerScalingReasoner {
        PowerScalingReasoner::with_engines(
            props,
            Box::new(Interp1dEngine::parse(PRIMARY).unwrap()),
            Box::new(Interp1dEngine::parse(SECONDARY).unwrap()),
        )
        .unwrap()
    }

    fn wire(reasoner: &PowerScalingReasoner, provider: &Arc<Provider>) {
        let actions: Arc<dyn ActionProvider> = provider.clone();
        let observations: Arc<dyn ObservationProvider> = provider.clone();
        reasoner.set_action_provider(Arc::downgrade(&actions));
        reasoner.set_observation_provider(Arc::downgrade(&observations));
    }

    #[test]
    fn test_node_degree_event_runs_primary_only() {
        let props = props();
        let reasoner = reasoner(props.clone());
        let provider = Provider::new(4);
        wire(&reasoner, &provider);

        reasoner
            .trigger_with(Some(&resources::nd_event()), Some(Value::Double(2.0)))
            .unwrap();
        assert_relative_eq!(provider.last_delta(), 2.0);
        assert_relative_eq!(reasoner.delta_cr(), 2.0);
        assert_eq!(props.parse::<i64>(keys::ND_R).unwrap(), 6);
        assert_eq!(reasoner.node_degree_reference(), None);
    }

    #[test]
    fn test_battery_event_updates_reference() {
        let props = props();
        let reasoner = reasoner(props.clone());
        let provider = Provider::new(4);
        wire(&reasoner, &provider);

        // ceil(0.4) = 1, ND_R = 5 + 1, e_ND = 6 - 4
        reasoner
            .trigger_with(Some(&resources::bl_event()), Some(Value::Double(0.4)))
            .unwrap();
        assert_eq!(props.parse::<i64>(keys::ND_R).unwrap(), 6);
        assert_eq!(reasoner.node_degree_reference(), Some(6));
        assert_relative_eq!(provider.last_delta(), 2.0);

        props.set(keys::ND_REF, 3);
        reasoner
            .trigger_with(Some(&resources::bl_event()), Some(Value::Double(-1.5)))
            .unwrap();
        // ceil(-1.5) = -1, ND_R = 3 - 1, e_ND = 2 - 4
        assert_eq!(props.parse::<i64>(keys::ND_R).unwrap(), 2);
        assert_relative_eq!(provider.last_delta(), -2.0);
    }

    #[test]
    fn test_primary_gains_are_read_live() {
        let props = props();
        let reasoner = reasoner(props.clone());
        let provider = Provider::new(4);
        wire(&reasoner, &provider);

        props.set(keys::K_CR, 0.5);
        reasoner
            .trigger_with(Some(&resources::nd_event()), Some(Value::Double(2.0)))
            .unwrap();
        assert_relative_eq!(provider.last_delta(), 1.0);

        props.set(keys::K_CR, "slow");
        assert!(matches!(
            reasoner.trigger_with(Some(&resources::nd_event()), Some(Value::Double(2.0))),
            Err(OraError::Config(ConfigError::InvalidProperty { .. }))
        ));
    }

    #[test]
    fn test_trigger_reads_published_cause() {
        let reasoner = reasoner(props());
        let provider = Provider::new(4);
        wire(&reasoner, &provider);
        *provider.reason.lock().unwrap() = (Value::Urn(resources::nd_event()), Value::Double(-3.0));

        reasoner.trigger().unwrap();
        assert_relative_eq!(provider.last_delta(), -3.0);
    }

    #[test]
    fn test_preconditions() {
        let reasoner = reasoner(props());
        let nd = resources::nd_event();
        let is_precondition = |r: Result<()>| matches!(r, Err(OraError::Precondition(_)));

        // providers not set
        assert!(is_precondition(reasoner.trigger_with(Some(&nd), Some(Value::Double(1.0)))));

        let provider = Provider::new(4);
        wire(&reasoner, &provider);
        assert!(is_precondition(reasoner.trigger_with(None, Some(Value::Double(1.0)))));
        assert!(is_precondition(reasoner.trigger_with(Some(&nd), None)));
        assert!(is_precondition(reasoner.trigger_with(Some(&nd), Some(Value::Int(1)))));
        let other: Urn = "urn:demanes:events:otherEvent".parse().unwrap();
        assert!(is_precondition(reasoner.trigger_with(Some(&other), Some(Value::Double(1.0)))));
        assert!(provider.invoked.lock().unwrap().is_empty());

        drop(provider);
        assert!(is_precondition(reasoner.trigger_with(Some(&nd), Some(Value::Double(1.0)))));
    }

    #[test]
    fn test_construction_requires_constants() {
        let props = props();
        props.remove(keys::KDELTA_ND);
        let result = PowerScalingReasoner::with_engines(
            props,
            Box::new(Interp1dEngine::parse(PRIMARY).unwrap()),
            Box::new(Interp1dEngine::parse(SECONDARY).unwrap()),
        );
        assert!(matches!(result, Err(ConfigError::MissingProperty(k)) if k == keys::KDELTA_ND));
    }

    #[test]
    fn test_construction_checks_variable_ids() {
        let props = props();
        props.set(keys::VAR_DU_CR, "du_power");
        let result = PowerScalingReasoner::with_engines(
            props,
            Box::new(Interp1dEngine::parse(PRIMARY).unwrap()),
            Box::new(Interp1dEngine::parse(SECONDARY).unwrap()),
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_from_properties_loads_tables() {
        let dir = tempfile::tempdir().unwrap();
        for (name, text) in [("prim.ini", PRIMARY), ("sec.ini", SECONDARY)] {
            let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
            f.write_all(text.as_bytes()).unwrap();
        }
        let props = props();
        props.set(keys::FDM_PRIMARY, "/prim.ini");
        props.set(keys::FDM_SECONDARY, "sec.ini");
        assert!(PowerScalingReasoner::from_properties(props.clone(), dir.path()).is_ok());

        props.set(keys::FDM_SECONDARY, "missing.ini");
        assert!(matches!(
            PowerScalingReasoner::from_properties(props, dir.path()),
            Err(ConfigError::Table(_))
        ));
    }
}
