//! # ORA Mediator
//!
//! Single point of wiring: maps observation and action URNs to the
//! components that serve them, hands itself to the reasoner as both
//! providers, and binds the reasoner to the trigger policy.
//!
//! In [`UpdateListBehaviour::Static`] mode the dispatch maps are updated
//! incrementally on register/unregister. In [`UpdateListBehaviour::Dynamic`]
//! mode they are re-derived from the registered observers and actuators on
//! every lookup, so components whose published lists change are always
//! seen current.
//!
//! ## Example
//!
//! ```rust,ignore
//! let mediator = Arc::new(OraMediator::new());
//! mediator.register_observer(monitor.clone());
//! mediator.register_actuator(actuator.clone());
//! mediator.set_reasoner(Some(reasoner));
//! mediator.set_trigger_policy(Some(monitor))?; // starts sampling
//! ```

use crate::bundle::{Bundle, Value};
use crate::error::{ConfigError, OraError, Result};
use crate::ora::{
    same_object, Action, ActionProvider, Actuator, Observation, ObservationProvider, Observer, Reasoner,
    TriggerPolicy,
};
use crate::urn::Urn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// How the dispatch maps are maintained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateListBehaviour {
    /// Incremental updates on register/unregister
    #[default]
    Static,
    /// Rebuilt from the registered components on every call
    Dynamic,
}

impl FromStr for UpdateListBehaviour {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "dynamic" => Ok(Self::Dynamic),
            _ => Err(ConfigError::InvalidProperty {
                key: crate::properties::keys::UPDATE_LIST.to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for UpdateListBehaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Dynamic => write!(f, "dynamic"),
        }
    }
}

#[derive(Default)]
struct Registry {
    observers: Vec<Arc<dyn Observer>>,
    actuators: Vec<Arc<dyn Actuator>>,
    observations: HashMap<Urn, Arc<dyn Observation>>,
    actions: HashMap<Urn, Arc<dyn Action>>,
}

/// Registry and dispatcher of the ORA loop.
pub struct OraMediator {
    behaviour: UpdateListBehaviour,
    registry: Mutex<Registry>,
    reasoner: Mutex<Option<Arc<dyn Reasoner>>>,
    policy: Mutex<Option<Arc<dyn TriggerPolicy>>>,
}

impl OraMediator {
    pub fn new() -> Self {
        Self::with_behaviour(UpdateListBehaviour::default())
    }

    pub fn with_behaviour(behaviour: UpdateListBehaviour) -> Self {
        tracing::debug!(%behaviour, "Mediator created");
        Self {
            behaviour,
            registry: Mutex::new(Registry::default()),
            reasoner: Mutex::new(None),
            policy: Mutex::new(None),
        }
    }

    pub fn behaviour(&self) -> UpdateListBehaviour {
        self.behaviour
    }

    /// Register an observer and merge its observations. Registering the
    /// same observer twice has no effect.
    pub fn register_observer(&self, observer: Arc<dyn Observer>) {
        let mut reg = lock(&self.registry);
        if reg.observers.iter().any(|o| same_object(o, &observer)) {
            return;
        }
        let published = observer.observations();
        tracing::debug!(observations = published.len(), "Observer registered");
        for obs in published {
            reg.observations.insert(obs.id().clone(), obs);
        }
        reg.observers.push(observer);
    }

    /// Remove an observer and the observations it published.
    pub fn unregister_observer(&self, observer: &Arc<dyn Observer>) {
        let mut reg = lock(&self.registry);
        let Some(pos) = reg.observers.iter().position(|o| same_object(o, observer)) else {
            return;
        };
        reg.observers.remove(pos);
        for obs in observer.observations() {
            if reg.observations.get(obs.id()).is_some_and(|cur| same_object(cur, &obs)) {
                reg.observations.remove(obs.id());
            }
        }
        tracing::debug!("Observer unregistered");
    }

    /// Register an actuator and merge its actions.
    pub fn register_actuator(&self, actuator: Arc<dyn Actuator>) {
        let mut reg = lock(&self.registry);
        if reg.actuators.iter().any(|a| same_object(a, &actuator)) {
            return;
        }
        let published = actuator.actions();
        tracing::debug!(actions = published.len(), "Actuator registered");
        for action in published {
            reg.actions.insert(action.id().clone(), action);
        }
        reg.actuators.push(actuator);
    }

    /// Remove an actuator and the actions it published.
    pub fn unregister_actuator(&self, actuator: &Arc<dyn Actuator>) {
        let mut reg = lock(&self.registry);
        let Some(pos) = reg.actuators.iter().position(|a| same_object(a, actuator)) else {
            return;
        };
        reg.actuators.remove(pos);
        for action in actuator.actions() {
            if reg.actions.get(action.id()).is_some_and(|cur| same_object(cur, &action)) {
                reg.actions.remove(action.id());
            }
        }
        tracing::debug!("Actuator unregistered");
    }

    /// Replace the reasoner, moving its trigger registration to the new one.
    pub fn set_reasoner(self: &Arc<Self>, reasoner: Option<Arc<dyn Reasoner>>) {
        let policy = lock(&self.policy).clone();
        let old = std::mem::replace(&mut *lock(&self.reasoner), reasoner.clone());

        if let (Some(policy), Some(old)) = (&policy, old) {
            policy.unregister_triggerable(&old.as_triggerable());
        }
        if let Some(reasoner) = reasoner {
            let actions: Arc<dyn ActionProvider> = self.clone();
            let observations: Arc<dyn ObservationProvider> = self.clone();
            reasoner.set_action_provider(Arc::downgrade(&actions));
            reasoner.set_observation_provider(Arc::downgrade(&observations));
            if let Some(policy) = &policy {
                policy.register_triggerable(reasoner.as_triggerable());
            }
            tracing::info!("Reasoner installed");
        }
    }

    /// Replace the trigger policy. The old policy is stopped; the new one
    /// gets the reasoner and is started immediately.
    pub fn set_trigger_policy(&self, policy: Option<Arc<dyn TriggerPolicy>>) -> Result<()> {
        let reasoner = lock(&self.reasoner).clone();
        let old = std::mem::replace(&mut *lock(&self.policy), policy.clone());

        if let Some(old) = old {
            old.stop();
            if let Some(r) = &reasoner {
                old.unregister_triggerable(&r.clone().as_triggerable());
            }
        }
        if let Some(policy) = policy {
            if let Some(r) = reasoner {
                policy.register_triggerable(r.as_triggerable());
            }
            policy.start()?;
            tracing::info!("Trigger policy installed and started");
        }
        Ok(())
    }

    pub fn reasoner(&self) -> Option<Arc<dyn Reasoner>> {
        lock(&self.reasoner).clone()
    }

    pub fn trigger_policy(&self) -> Option<Arc<dyn TriggerPolicy>> {
        lock(&self.policy).clone()
    }

    fn observation(&self, id: &Urn) -> Option<Arc<dyn Observation>> {
        match self.behaviour {
            UpdateListBehaviour::Static => lock(&self.registry).observations.get(id).cloned(),
            UpdateListBehaviour::Dynamic => self.rebuilt_observations().remove(id),
        }
    }

    fn action(&self, id: &Urn) -> Option<Arc<dyn Action>> {
        match self.behaviour {
            UpdateListBehaviour::Static => lock(&self.registry).actions.get(id).cloned(),
            UpdateListBehaviour::Dynamic => self.rebuilt_actions().remove(id),
        }
    }

    fn rebuilt_observations(&self) -> HashMap<Urn, Arc<dyn Observation>> {
        let observers = lock(&self.registry).observers.clone();
        observers
            .iter()
            .flat_map(|o| o.observations())
            .map(|obs| (obs.id().clone(), obs))
            .collect()
    }

    fn rebuilt_actions(&self) -> HashMap<Urn, Arc<dyn Action>> {
        let actuators = lock(&self.registry).actuators.clone();
        actuators
            .iter()
            .flat_map(|a| a.actions())
            .map(|action| (action.id().clone(), action))
            .collect()
    }
}

impl Default for OraMediator {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservationProvider for OraMediator {
    fn observation_ids(&self) -> Vec<Urn> {
        let mut ids: Vec<Urn> = match self.behaviour {
            UpdateListBehaviour::Static => lock(&self.registry).observations.keys().cloned().collect(),
            UpdateListBehaviour::Dynamic => self.rebuilt_observations().into_keys().collect(),
        };
        ids.sort();
        ids
    }

    fn value(&self, id: &Urn) -> Result<Value> {
        let obs = self
            .observation(id)
            .ok_or_else(|| OraError::UnknownObservation(id.clone()))?;
        obs.value().map_err(|e| OraError::ObservationInvocation {
            urn: id.clone(),
            source: Box::new(e),
        })
    }
}

impl ActionProvider for OraMediator {
    fn action_ids(&self) -> Vec<Urn> {
        let mut ids: Vec<Urn> = match self.behaviour {
            UpdateListBehaviour::Static => lock(&self.registry).actions.keys().cloned().collect(),
            UpdateListBehaviour::Dynamic => self.rebuilt_actions().into_keys().collect(),
        };
        ids.sort();
        ids
    }

    fn invoke(&self, id: &Urn, args: &Bundle) -> Result<()> {
        let action = self.action(id).ok_or_else(|| OraError::UnknownAction(id.clone()))?;
        action.invoke(args).map_err(|e| OraError::ActionInvocation {
            urn: id.clone(),
            source: Box::new(e),
        })
    }
}

impl fmt::Debug for OraMediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reg = lock(&self.registry);
        f.debug_struct("OraMediator")
            .field("behaviour", &self.behaviour)
            .field("observers", &reg.observers.len())
            .field("actuators", &reg.actuators.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::ControlMetrics;
    use crate::ora::{PolicyState, Triggerable};
    use crate::properties::{keys, ReconfigurationProperties};
    use crate::trigger::PowerScalingMonitor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Weak;
    use std::time::{Duration, Instant};

    fn urn(s: &str) -> Urn {
        format!("urn:demanes:test:{s}").parse().unwrap()
    }

    struct Fixed {
        id: Urn,
        value: f64,
    }

    impl Observation for Fixed {
        fn id(&self) -> &Urn {
            &self.id
        }
        fn value(&self) -> Result<Value> {
            if self.value.is_nan() {
                return Err(OraError::Device("sensor offline".into()));
            }
            Ok(Value::Double(self.value))
        }
    }

    struct Sensors(Mutex<Vec<Arc<dyn Observation>>>);

    impl Sensors {
        fn new(entries: &[(&str, f64)]) -> Arc<Self> {
            let list = entries
                .iter()
                .map(|(id, v)| Arc::new(Fixed { id: urn(id), value: *v }) as Arc<dyn Observation>)
                .collect();
            Arc::new(Self(Mutex::new(list)))
        }
    }

    impl Observer for Sensors {
        fn observations(&self) -> Vec<Arc<dyn Observation>> {
            self.0.lock().unwrap().clone()
        }
    }

    struct Recorder {
        id: Urn,
        calls: AtomicUsize,
        fail: bool,
    }

    impl Action for Recorder {
        fn id(&self) -> &Urn {
            &self.id
        }
        fn invoke(&self, _args: &Bundle) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(OraError::Device("radio busy".into()));
            }
            Ok(())
        }
    }

    struct Switches(Vec<Arc<Recorder>>);

    impl Switches {
        fn new(ids: &[&str]) -> Arc<Self> {
            Arc::new(Self(
                ids.iter()
                    .map(|id| {
                        Arc::new(Recorder {
                            id: urn(id),
                            calls: AtomicUsize::new(0),
                            fail: id.starts_with("broken"),
                        })
                    })
                    .collect(),
            ))
        }
    }

    impl Actuator for Switches {
        fn actions(&self) -> Vec<Arc<dyn Action>> {
            self.0.iter().map(|a| a.clone() as Arc<dyn Action>).collect()
        }
    }

    #[derive(Default)]
    struct StubReasoner {
        actions: Mutex<Option<Weak<dyn ActionProvider>>>,
    }

    impl Triggerable for StubReasoner {
        fn trigger(&self) -> Result<()> {
            Ok(())
        }
    }

    impl Reasoner for StubReasoner {
        fn set_action_provider(&self, provider: Weak<dyn ActionProvider>) {
            *self.actions.lock().unwrap() = Some(provider);
        }
        fn set_observation_provider(&self, _provider: Weak<dyn ObservationProvider>) {}
        fn trigger_with(&self, _cause: Option<&Urn>, _value: Option<Value>) -> Result<()> {
            Ok(())
        }
        fn as_triggerable(self: Arc<Self>) -> Arc<dyn Triggerable> {
            self
        }
    }

    #[derive(Default)]
    struct StubPolicy {
        state: Mutex<Option<PolicyState>>,
        starts: AtomicUsize,
        triggerables: Mutex<Vec<Arc<dyn Triggerable>>>,
    }

    impl TriggerPolicy for StubPolicy {
        fn start(&self) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            *self.state.lock().unwrap() = Some(PolicyState::Started);
            Ok(())
        }
        fn stop(&self) {
            *self.state.lock().unwrap() = Some(PolicyState::Died);
        }
        fn suspend(&self) {}
        fn resume(&self) {}
        fn state(&self) -> PolicyState {
            self.state.lock().unwrap().unwrap_or(PolicyState::Created)
        }
        fn register_triggerable(&self, triggerable: Arc<dyn Triggerable>) {
            self.triggerables.lock().unwrap().push(triggerable);
        }
        fn unregister_triggerable(&self, triggerable: &Arc<dyn Triggerable>) {
            self.triggerables
                .lock()
                .unwrap()
                .retain(|t| !same_object(t, triggerable));
        }
    }

    #[test]
    fn test_action_union_and_dispatch() {
        let mediator = OraMediator::new();
        let left = Switches::new(&["a", "b"]);
        let right = Switches::new(&["c"]);
        mediator.register_actuator(left.clone());
        mediator.register_actuator(right.clone());

        assert_eq!(mediator.action_ids(), vec![urn("a"), urn("b"), urn("c")]);
        mediator.invoke(&urn("c"), &Bundle::new()).unwrap();
        assert_eq!(right.0[0].calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            mediator.invoke(&urn("z"), &Bundle::new()),
            Err(OraError::UnknownAction(u)) if u == urn("z")
        ));
    }

    #[test]
    fn test_unregister_removes_only_own_actions() {
        let mediator = OraMediator::new();
        let left = Switches::new(&["a", "b"]);
        let right = Switches::new(&["c"]);
        let left_dyn: Arc<dyn Actuator> = left.clone();
        mediator.register_actuator(left_dyn.clone());
        mediator.register_actuator(right);

        mediator.unregister_actuator(&left_dyn);
        assert_eq!(mediator.action_ids(), vec![urn("c")]);
        mediator.unregister_actuator(&left_dyn);
        assert_eq!(mediator.action_ids(), vec![urn("c")]);
    }

    #[test]
    fn test_collision_last_registration_wins() {
        let mediator = OraMediator::new();
        let first = Sensors::new(&[("temp", 1.0)]);
        let second = Sensors::new(&[("temp", 2.0)]);
        let second_dyn: Arc<dyn Observer> = second.clone();
        mediator.register_observer(first.clone());
        mediator.register_observer(second_dyn.clone());
        mediator.register_observer(first);

        assert_eq!(mediator.value(&urn("temp")).unwrap(), Value::Double(2.0));
        mediator.unregister_observer(&second_dyn);
        assert!(matches!(
            mediator.value(&urn("temp")),
            Err(OraError::UnknownObservation(_))
        ));
    }

    #[test]
    fn test_invocation_errors_are_wrapped() {
        let mediator = OraMediator::new();
        mediator.register_observer(Sensors::new(&[("dead", f64::NAN)]));
        mediator.register_actuator(Switches::new(&["broken"]));

        let dead = urn("dead");
        let err = mediator.value(&dead).unwrap_err();
        assert!(matches!(err, OraError::ObservationInvocation { urn: ref u, .. } if *u == dead));
        assert!(err.is_recoverable());
        assert!(matches!(
            mediator.invoke(&urn("broken"), &Bundle::new()),
            Err(OraError::ActionInvocation { .. })
        ));
    }

    #[test]
    fn test_dynamic_mode_sees_changed_lists() {
        let sensors = Sensors::new(&[("temp", 1.0)]);
        for (behaviour, expect_new) in [
            (UpdateListBehaviour::Static, false),
            (UpdateListBehaviour::Dynamic, true),
        ] {
            let mediator = OraMediator::with_behaviour(behaviour);
            mediator.register_observer(sensors.clone());
            sensors
                .0
                .lock()
                .unwrap()
                .push(Arc::new(Fixed { id: urn("humidity"), value: 0.5 }));
            assert_eq!(mediator.value(&urn("humidity")).is_ok(), expect_new, "{behaviour}");
            sensors.0.lock().unwrap().pop();
        }
    }

    #[test]
    fn test_policy_assignment_wires_and_starts() {
        let mediator = Arc::new(OraMediator::new());
        let reasoner = Arc::new(StubReasoner::default());
        mediator.set_reasoner(Some(reasoner.clone()));
        assert!(reasoner.actions.lock().unwrap().as_ref().unwrap().upgrade().is_some());

        let first = Arc::new(StubPolicy::default());
        mediator.set_trigger_policy(Some(first.clone())).unwrap();
        assert_eq!(first.starts.load(Ordering::SeqCst), 1);
        assert_eq!(first.triggerables.lock().unwrap().len(), 1);

        let second = Arc::new(StubPolicy::default());
        mediator.set_trigger_policy(Some(second.clone())).unwrap();
        assert_eq!(first.state(), PolicyState::Died);
        assert!(first.triggerables.lock().unwrap().is_empty());
        assert_eq!(second.state(), PolicyState::Started);
        assert_eq!(second.triggerables.lock().unwrap().len(), 1);

        let replacement = Arc::new(StubReasoner::default());
        mediator.set_reasoner(Some(replacement.clone()));
        let registered = second.triggerables.lock().unwrap();
        assert_eq!(registered.len(), 1);
        assert!(same_object(&registered[0], &replacement));
    }

    struct Radio;

    impl crate::radio::RadioAccess for Radio {
        fn channel(&self) -> u8 {
            26
        }
        fn output_power(&self) -> Result<i32> {
            Ok(crate::radio::MIN_PTX)
        }
        fn set_output_power(&self, _dbm: i32) -> Result<()> {
            Ok(())
        }
    }

    struct Hardware;

    impl crate::devices::NeighborDiscovery for Hardware {
        fn neighbor_count(&self) -> Result<usize> {
            Ok(2)
        }
    }

    impl crate::devices::BatteryMonitor for Hardware {
        fn available_capacity(&self) -> Result<f64> {
            Ok(700.0)
        }
        fn maximum_capacity(&self) -> Result<f64> {
            Ok(720.0)
        }
    }

    fn sampling_monitor(metrics: &Arc<ControlMetrics>) -> Arc<PowerScalingMonitor> {
        let props = ReconfigurationProperties::with_defaults(26);
        props.derive_controller_constants(720.0).unwrap();
        props.set(keys::TRIGGER_INTERVAL, 510);
        props.set(keys::RESET, false);
        let monitor = PowerScalingMonitor::new(props, Arc::new(Radio), Arc::new(Hardware), Arc::new(Hardware))
            .unwrap()
            .with_metrics(metrics.clone());
        Arc::new(monitor)
    }

    fn keeps_ticking(metrics: &ControlMetrics) -> bool {
        let seen = metrics.ticks.get();
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if metrics.ticks.get() >= seen + 2 {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_reassigning_policy_keeps_it_sampling() {
        let mediator = Arc::new(OraMediator::new());
        mediator.set_reasoner(Some(Arc::new(StubReasoner::default())));
        let a_metrics = Arc::new(ControlMetrics::new());
        let a = sampling_monitor(&a_metrics);

        mediator.set_trigger_policy(Some(a.clone())).unwrap();
        mediator.set_trigger_policy(Some(a.clone())).unwrap();
        assert_eq!(a.state(), PolicyState::Started);
        assert!(keeps_ticking(&a_metrics));

        let b_metrics = Arc::new(ControlMetrics::new());
        let b = sampling_monitor(&b_metrics);
        mediator.set_trigger_policy(Some(b.clone())).unwrap();
        mediator.set_trigger_policy(Some(a.clone())).unwrap();
        assert_eq!(a.state(), PolicyState::Started);
        assert_ne!(b.state(), PolicyState::Started);
        assert!(keeps_ticking(&a_metrics));

        mediator.set_trigger_policy(None).unwrap();
        assert_ne!(a.state(), PolicyState::Started);
    }

    #[test]
    fn test_behaviour_parse() {
        assert_eq!("Dynamic".parse::<UpdateListBehaviour>().unwrap(), UpdateListBehaviour::Dynamic);
        assert_eq!(UpdateListBehaviour::default(), UpdateListBehaviour::Static);
        assert!("sometimes".parse::<UpdateListBehaviour>().is_err());
    }
}
