//! # ORA Reconfiguration Engine
//!
//! Self-adaptive transmit-power control for wireless sensor nodes, built
//! as an Observe-Reason-Act loop:
//!
//! - **Observe**: node degree and battery level observations ([`devices`])
//! - **Trigger**: a sampling thread with hysteresis rules deciding when to
//!   react ([`trigger`])
//! - **Reason**: two cascaded decision loops mapping errors to a
//!   transmit-power index delta ([`reasoner`], [`decision`])
//! - **Act**: the transmit-power actuator applying the delta to the radio
//!   ([`devices`])
//!
//! The [`mediator`] ties them together by URN, and every tunable lives in a
//! shared [`ReconfigurationProperties`] store that can be rewritten at
//! runtime through [`remote`] management.
//!
//! ## Control Flow
//!
//! ```text
//!  sampler tick ─> rules fire? ─> Reasoner::trigger() ─> Mediator::value(TriggerReason)
//!                                        │
//!                         secondary loop (battery) ─> ND_R ─> primary loop
//!                                        │
//!                      Mediator::invoke(updatePowerTransmission, {delta_cr}) ─> radio
//! ```
//!
//! ## Example
//!
//! ```rust
//! use ora_core::decision::{DecisionEngine, Interp1dEngine};
//! use ora_core::properties::{keys, ReconfigurationProperties};
//!
//! let props = ReconfigurationProperties::with_defaults(26);
//! props.derive_controller_constants(720.0).unwrap();
//! assert_eq!(props.parse::<i64>(keys::CR_MAX).unwrap(), 18);
//!
//! let mut engine = Interp1dEngine::parse(
//!     "NumInputs=1\nNumOutputs=1\nNumPoints=3\n\
//!      VarID_1=e_nd\nVarType_1=IN\nVarMIN_1=-1\nVarMAX_1=1\n\
//!      VarID_2=du_cr\nVarType_2=OUT\nVarMIN_2=-2\nVarMAX_2=2\n\
//!      e_nd=-1, 0, 1\ndu_cr=-2, 0, 2\n",
//! ).unwrap();
//! engine.set_norm_factor("e_nd", 0.5);
//! engine.set_input("e_nd", 1.0);
//! engine.evaluate();
//! assert_eq!(engine.output("du_cr"), Some(1.0));
//! ```
//!
//! See the `ora-sim` crate for a complete node wired against simulated
//! hardware.

pub mod bundle;
pub mod config;
pub mod decision;
pub mod devices;
pub mod error;
pub mod mediator;
pub mod observe;
pub mod ora;
pub mod properties;
pub mod radio;
pub mod reasoner;
pub mod remote;
pub mod resources;
pub mod rt;
pub mod trigger;
pub mod urn;

pub use bundle::{Bundle, Value, ValueKind};
pub use config::NodeConfig;
pub use decision::{DecisionEngine, DecisionTable, Interp1dEngine};
pub use devices::{
    BatteryLevelObservation, BatteryMonitor, NeighborDiscovery, NodeDegreeObservation, PowerTransmissionAction,
    PowerTransmissionActuator,
};
pub use error::{BundleError, ConfigError, ErrorClass, OraError, Result, TableError};
pub use mediator::{OraMediator, UpdateListBehaviour};
pub use observe::{ControlMetrics, LogConfig, MetricsSnapshot};
pub use ora::{
    Action, ActionProvider, Actuator, Observation, ObservationProvider, Observer, PolicyState, Reasoner, Resettable,
    TriggerPolicy, Triggerable,
};
pub use properties::ReconfigurationProperties;
pub use radio::RadioAccess;
pub use reasoner::PowerScalingReasoner;
pub use remote::RemoteManagement;
pub use trigger::{PowerScalingMonitor, TriggerCause};
pub use urn::Urn;
