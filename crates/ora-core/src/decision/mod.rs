//! Table-driven decision engine.

pub mod engine;
pub mod table;
pub mod variable;

pub use engine::{interp1d, DecisionEngine, Interp1dEngine};
pub use table::DecisionTable;
pub use variable::{denormalize, normalize, VarRole, Variable};
