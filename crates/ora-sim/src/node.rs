//! A complete node wired against simulated hardware.

use crate::battery::SimBattery;
use crate::neighborhood::SimNeighborhood;
use crate::radio::SimRadio;
use crate::scenario::ScenarioConfig;
use crate::SimResult;
use ora_core::radio::RadioAccess;
use ora_core::{
    ControlMetrics, MetricsSnapshot, NodeConfig, OraMediator, PowerScalingMonitor, PowerScalingReasoner,
    PowerTransmissionAction, PowerTransmissionActuator, ReconfigurationProperties, RemoteManagement,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct SimNode {
    radio: Arc<SimRadio>,
    battery: Arc<SimBattery>,
    neighborhood: Arc<SimNeighborhood>,
    props: ReconfigurationProperties,
    metrics: Arc<ControlMetrics>,
    monitor: Arc<PowerScalingMonitor>,
    reasoner: Arc<PowerScalingReasoner>,
    mediator: Arc<OraMediator>,
    remote: Option<RemoteManagement>,
    step: Duration,
}

impl SimNode {
    /// Wire the node and start its trigger policy.
    pub fn build(config: &NodeConfig, scenario: &ScenarioConfig) -> SimResult<Self> {
        config.validate()?;
        scenario.validate()?;

        let radio = Arc::new(SimRadio::new(config.radio.channel, config.radio.initial_ptx)?);
        let b = &scenario.battery;
        let battery = Arc::new(SimBattery::new(b.max_capacity, b.initial, b.idle_drain, b.tx_drain_per_mw));
        let neighborhood = Arc::new(SimNeighborhood::new(
            radio.clone(),
            scenario.neighbors.clone(),
            scenario.seed,
            scenario.churn,
        ));

        let props = config.build_properties(b.max_capacity)?;
        let metrics = Arc::new(ControlMetrics::new());

        let monitor = Arc::new(
            PowerScalingMonitor::new(props.clone(), radio.clone(), neighborhood.clone(), battery.clone())?
                .with_metrics(metrics.clone()),
        );

        let action = PowerTransmissionAction::new(&props, radio.clone())?.with_metrics(metrics.clone());
        let actuator = Arc::new(PowerTransmissionActuator::new(action));
        monitor.register_resettable(actuator.clone());

        let reasoner = Arc::new(
            PowerScalingReasoner::from_properties(props.clone(), &config.control.table_dir)?
                .with_radio(radio.clone())
                .with_metrics(metrics.clone())
                .with_node_id(format!("ch{}", radio.channel())),
        );

        let mediator = Arc::new(OraMediator::with_behaviour(config.mediator.update_list));
        mediator.register_observer(monitor.clone());
        mediator.register_actuator(actuator);
        mediator.set_reasoner(Some(reasoner.clone()));
        mediator.set_trigger_policy(Some(monitor.clone()))?;

        let remote = if config.remote.enable {
            let mut remote = RemoteManagement::new(props.clone());
            let addr = remote.start(&config.remote.bind)?;
            tracing::info!(%addr, "Remote management enabled");
            Some(remote)
        } else {
            None
        };

        tracing::info!(
            channel = radio.channel(),
            ptx = config.radio.initial_ptx,
            neighbors = scenario.neighbors.len(),
            "Simulated node started"
        );

        Ok(Self {
            radio,
            battery,
            neighborhood,
            props,
            metrics,
            monitor,
            reasoner,
            mediator,
            remote,
            step: Duration::from_millis(scenario.step_ms),
        })
    }

    /// Advance the environment one step.
    pub fn step(&self) {
        let level = self.battery.drain(self.radio.output_mw());
        self.metrics.record_battery_level(level);
        self.neighborhood.step();
    }

    /// Step the environment in real time for `duration`.
    pub fn run_for(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            self.step();
            std::thread::sleep(self.step.min(deadline.saturating_duration_since(Instant::now())));
        }
    }

    /// Stop the trigger policy and remote listener.
    pub fn shutdown(&mut self) -> SimResult<()> {
        self.mediator.set_trigger_policy(None)?;
        if let Some(remote) = self.remote.as_mut() {
            remote.stop();
        }
        tracing::info!(dbm = ?self.radio.output_power().ok(), "Simulated node stopped");
        Ok(())
    }

    pub fn radio(&self) -> &Arc<SimRadio> {
        &self.radio
    }

    pub fn battery(&self) -> &Arc<SimBattery> {
        &self.battery
    }

    pub fn properties(&self) -> &ReconfigurationProperties {
        &self.props
    }

    pub fn monitor(&self) -> &Arc<PowerScalingMonitor> {
        &self.monitor
    }

    pub fn reasoner(&self) -> &Arc<PowerScalingReasoner> {
        &self.reasoner
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn metrics_prometheus(&self) -> String {
        self.metrics.to_prometheus()
    }

    pub fn remote_addr(&self) -> Option<std::net::SocketAddr> {
        self.remote.as_ref().and_then(|r| r.local_addr())
    }
}
