//! # Decision Engine
//!
//! Maps input variables to output variables through a [`DecisionTable`].
//!
//! ```text
//! set_norm_factor / set_input
//!        │
//!        ▼
//!   normalize inputs ──> interp1d(first input row, output row) ──> denormalize outputs
//! ```
//!
//! ## Example
//!
//! ```rust
//! use ora_core::decision::{DecisionEngine, Interp1dEngine};
//!
//! let mut engine = Interp1dEngine::parse(
//!     "NumInputs=1\nNumOutputs=1\nNumPoints=2\n\
//!      VarID_1=x\nVarType_1=IN\nVarMIN_1=0\nVarMAX_1=1\n\
//!      VarID_2=y\nVarType_2=OUT\nVarMIN_2=0\nVarMAX_2=10\n\
//!      x=0, 1\ny=0, 10\n",
//! ).unwrap();
//!
//! engine.set_input("x", 0.25);
//! engine.evaluate();
//! assert_eq!(engine.output("y"), Some(2.5));
//! ```

use super::table::DecisionTable;
use super::variable::Variable;
use crate::error::TableError;
use std::path::Path;

/// A configured engine mapping normalized inputs to outputs.
pub trait DecisionEngine: Send {
    /// Set the normalization factor of a variable. Inputs are searched
    /// first. Returns false for an unknown ID.
    fn set_norm_factor(&mut self, var_id: &str, k: f64) -> bool;

    /// Set the raw value of an input. Returns false for an unknown ID.
    fn set_input(&mut self, var_id: &str, value: f64) -> bool;

    /// Recompute every output from the current inputs.
    fn evaluate(&mut self);

    /// Raw value of an output; NaN until the first evaluation.
    fn output(&self, var_id: &str) -> Option<f64>;

    fn input_ids(&self) -> Vec<&str>;

    fn output_ids(&self) -> Vec<&str>;

    /// Whether `var_id` names an input or an output.
    fn has_variable(&self, var_id: &str) -> bool {
        self.input_ids().contains(&var_id) || self.output_ids().contains(&var_id)
    }
}

/// Piecewise-linear lookup of `xi` in the points `(x[j], y[j])`.
///
/// Below the first point returns `y[0]`, above the last `y[last]`.
/// Otherwise interpolates on the first segment with `x[j] < xi <= x[j+1]`.
/// NaN input yields NaN.
pub fn interp1d(xi: f64, x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if xi.is_nan() || n == 0 {
        return f64::NAN;
    }
    if xi <= x[0] {
        return y[0];
    }
    if xi >= x[n - 1] {
        return y[n - 1];
    }

    for j in 0..n - 1 {
        let (x0, x1) = (x[j], x[j + 1]);
        if xi > x0 && xi <= x1 {
            if xi == x1 {
                return y[j + 1];
            }
            return y[j] + (xi - x0) * (y[j + 1] - y[j]) / (x1 - x0);
        }
    }
    f64::NAN
}

/// Single-input interpolation engine.
///
/// Every output is interpolated against the first declared input.
#[derive(Debug, Clone)]
pub struct Interp1dEngine {
    table: DecisionTable,
}

impl Interp1dEngine {
    pub fn new(table: DecisionTable) -> Self {
        Self { table }
    }

    pub fn parse(text: &str) -> Result<Self, TableError> {
        DecisionTable::parse(text).map(Self::new)
    }

    pub fn load(path: &Path) -> Result<Self, TableError> {
        DecisionTable::load(path).map(Self::new)
    }

    pub fn table(&self) -> &DecisionTable {
        &self.table
    }

    pub fn input(&self, var_id: &str) -> Option<&Variable> {
        self.table.inputs.iter().find(|v| v.id() == var_id)
    }

    pub fn output_variable(&self, var_id: &str) -> Option<&Variable> {
        self.table.outputs.iter().find(|v| v.id() == var_id)
    }

    fn variable_mut(&mut self, var_id: &str) -> Option<&mut Variable> {
        let table = &mut self.table;
        table
            .inputs
            .iter_mut()
            .chain(table.outputs.iter_mut())
            .find(|v| v.id() == var_id)
    }
}

impl DecisionEngine for Interp1dEngine {
    fn set_norm_factor(&mut self, var_id: &str, k: f64) -> bool {
        match self.variable_mut(var_id) {
            Some(var) => {
                var.set_k_norm(k);
                true
            }
            None => false,
        }
    }

    fn set_input(&mut self, var_id: &str, value: f64) -> bool {
        match self.table.inputs.iter_mut().find(|v| v.id() == var_id) {
            Some(var) => {
                var.set_value(value);
                true
            }
            None => false,
        }
    }

    fn evaluate(&mut self) {
        let table = &mut self.table;
        for var in table.inputs.iter_mut() {
            var.normalize();
        }

        let Some(first) = table.inputs.first() else {
            return;
        };
        let xi = first.value_norm();
        let Some(x) = table.points.get(first.id()) else {
            return;
        };

        for out in table.outputs.iter_mut() {
            if let Some(y) = table.points.get(out.id()) {
                out.set_value_norm(interp1d(xi, x, y));
                out.denormalize();
            }
        }
    }

    fn output(&self, var_id: &str) -> Option<f64> {
        self.output_variable(var_id).map(Variable::value)
    }

    fn input_ids(&self) -> Vec<&str> {
        self.table.inputs.iter().map(Variable::id).collect()
    }

    fn output_ids(&self) -> Vec<&str> {
        self.table.outputs.iter().map(Variable::id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const X: [f64; 5] = [-1.0, -0.5, 0.0, 0.5, 1.0];
    const Y: [f64; 5] = [3.0, 1.0, 0.0, -0.7, -2.0];

    const TABLE: &str = "\
NumInputs=1
NumOutputs=2
NumPoints=3
VarID_1=e
VarType_1=IN
VarMIN_1=-1
VarMAX_1=1
VarID_2=u
VarType_2=OUT
VarMIN_2=-2
VarMAX_2=2
VarID_3=w
VarType_3=OUT
VarMIN_3=0
VarMAX_3=1
e=-1.0, 0.0, 1.0
u=-2.0, 0.0, 2.0
w=1.0 0.0 1.0
";

    #[test]
    fn test_interp_exact_at_points() {
        for j in 0..X.len() {
            assert_eq!(interp1d(X[j], &X, &Y), Y[j]);
        }
    }

    #[test]
    fn test_interp_clamps() {
        assert_eq!(interp1d(-10.0, &X, &Y), 3.0);
        assert_eq!(interp1d(10.0, &X, &Y), -2.0);
        assert_eq!(interp1d(f64::INFINITY, &X, &Y), -2.0);
        assert_eq!(interp1d(f64::NEG_INFINITY, &X, &Y), 3.0);
    }

    #[test]
    fn test_interp_linear_between_points() {
        for xi in [-0.9, -0.3, 0.1, 0.37, 0.99] {
            let j = X.windows(2).position(|w| xi > w[0] && xi <= w[1]).unwrap();
            let expected = Y[j] + (xi - X[j]) * (Y[j + 1] - Y[j]) / (X[j + 1] - X[j]);
            assert_relative_eq!(interp1d(xi, &X, &Y), expected);
        }
        assert_relative_eq!(interp1d(-0.75, &X, &Y), 2.0);
    }

    #[test]
    fn test_interp_nan_and_empty() {
        assert!(interp1d(f64::NAN, &X, &Y).is_nan());
        assert!(interp1d(0.0, &[], &[]).is_nan());
    }

    #[test]
    fn test_interp_duplicate_abscissa() {
        let x = [0.0, 1.0, 1.0, 2.0];
        let y = [0.0, 1.0, 5.0, 6.0];
        assert_eq!(interp1d(1.0, &x, &y), 1.0);
        assert_relative_eq!(interp1d(1.5, &x, &y), 5.5);
    }

    #[test]
    fn test_evaluate_all_outputs() {
        let mut engine = Interp1dEngine::parse(TABLE).unwrap();
        assert!(engine.output("u").unwrap().is_nan());

        assert!(engine.set_input("e", 0.5));
        engine.evaluate();
        assert_relative_eq!(engine.output("u").unwrap(), 1.0);
        assert_relative_eq!(engine.output("w").unwrap(), 0.5);
    }

    #[test]
    fn test_norm_factors_scale_both_sides() {
        let mut engine = Interp1dEngine::parse(TABLE).unwrap();
        assert!(engine.set_norm_factor("e", 0.1));
        assert!(engine.set_norm_factor("u", 3.0));
        engine.set_input("e", 5.0);
        engine.evaluate();

        assert_relative_eq!(engine.input("e").unwrap().value_norm(), 0.5);
        let u = engine.output_variable("u").unwrap();
        assert_relative_eq!(u.value_norm(), 1.0);
        assert_relative_eq!(u.value(), 3.0);
    }

    #[test]
    fn test_unknown_ids() {
        let mut engine = Interp1dEngine::parse(TABLE).unwrap();
        assert!(!engine.set_input("u", 1.0));
        assert!(!engine.set_input("nope", 1.0));
        assert!(!engine.set_norm_factor("nope", 1.0));
        assert_eq!(engine.output("e"), None);
        assert!(engine.has_variable("w"));
        assert!(!engine.has_variable("nope"));
        assert_eq!(engine.input_ids(), vec!["e"]);
        assert_eq!(engine.output_ids(), vec!["u", "w"]);
    }

    #[test]
    fn test_evaluate_without_input_keeps_unset() {
        let mut engine = Interp1dEngine::parse(TABLE).unwrap();
        engine.evaluate();
        assert!(engine.output("u").unwrap().is_nan());
    }
}
