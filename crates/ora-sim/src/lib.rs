//! # ORA Node Simulator
//!
//! Pure-software stand-ins for the hardware a sensor node exposes to the
//! reconfiguration engine, plus the wiring that turns them into a running
//! node.
//!
//! ```text
//! ┌──────────────────────────── SimNode ────────────────────────────┐
//! │                                                                 │
//! │  SimNeighborhood ──ND──┐                        ┌──> SimRadio   │
//! │  SimBattery ─────BL────┼──> Monitor ─> Reasoner ┤    (ptx)      │
//! │                        │        ▲               └──> Actuator   │
//! │                        └─ OraMediator (URN dispatch)            │
//! │                                                                 │
//! │  step(): battery drains with ptx, neighbours churn              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod battery;
pub mod neighborhood;
pub mod node;
pub mod radio;
pub mod scenario;

pub use battery::SimBattery;
pub use neighborhood::{SimNeighbor, SimNeighborhood};
pub use node::SimNode;
pub use radio::SimRadio;
pub use scenario::ScenarioConfig;

use ora_core::{ConfigError, OraError};
use thiserror::Error;

/// Simulation errors.
#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Engine(#[from] OraError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid scenario: {0}")]
    Scenario(String),
}

pub type SimResult<T> = std::result::Result<T, SimError>;
