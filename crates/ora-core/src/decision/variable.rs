//! Normalized scalar decision variables.

use std::fmt;
use std::str::FromStr;

/// Whether a variable feeds or is produced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarRole {
    Input,
    Output,
}

impl FromStr for VarRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "IN" => Ok(VarRole::Input),
            "OUT" => Ok(VarRole::Output),
            _ => Err(()),
        }
    }
}

impl fmt::Display for VarRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarRole::Input => write!(f, "IN"),
            VarRole::Output => write!(f, "OUT"),
        }
    }
}

/// Scale `value` by `k`. NaN stays NaN.
#[inline]
pub fn normalize(value: f64, k: f64) -> f64 {
    value * k
}

/// Scale a normalized value back by `k`. NaN stays NaN.
///
/// Both directions multiply: the factor of an output variable is its gain.
#[inline]
pub fn denormalize(value_norm: f64, k: f64) -> f64 {
    value_norm * k
}

/// A named scalar with bounds, a normalization factor and a raw and
/// normalized value. NaN means "unset".
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    id: String,
    number: usize,
    role: VarRole,
    min: f64,
    max: f64,
    k_norm: f64,
    value: f64,
    value_norm: f64,
}

impl Variable {
    pub fn new(id: impl Into<String>, role: VarRole) -> Self {
        Self {
            id: id.into(),
            number: 1,
            role,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            k_norm: 1.0,
            value: f64::NAN,
            value_norm: f64::NAN,
        }
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_number(mut self, number: usize) -> Self {
        self.number = number;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 1-based position in the table declaration.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn role(&self) -> VarRole {
        self.role
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn k_norm(&self) -> f64 {
        self.k_norm
    }

    pub fn set_k_norm(&mut self, k: f64) {
        self.k_norm = k;
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    pub fn value_norm(&self) -> f64 {
        self.value_norm
    }

    pub fn set_value_norm(&mut self, value_norm: f64) {
        self.value_norm = value_norm;
    }

    /// `value_norm = value * k_norm`, skipped while `value` is unset.
    pub fn normalize(&mut self) {
        if !self.value.is_nan() {
            self.value_norm = normalize(self.value, self.k_norm);
        }
    }

    /// `value = value_norm * k_norm`, skipped while `value_norm` is unset.
    pub fn denormalize(&mut self) {
        if !self.value_norm.is_nan() {
            self.value = denormalize(self.value_norm, self.k_norm);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_unset() {
        let v = Variable::new("e_nd", VarRole::Input);
        assert!(v.value().is_nan());
        assert!(v.value_norm().is_nan());
        assert_eq!(v.k_norm(), 1.0);
        assert_eq!(v.min(), f64::NEG_INFINITY);
        assert_eq!(v.max(), f64::INFINITY);
    }

    #[test]
    fn test_nan_is_noop() {
        let mut v = Variable::new("x", VarRole::Input);
        v.set_k_norm(3.0);
        v.normalize();
        assert!(v.value_norm().is_nan());

        v.denormalize();
        assert!(v.value().is_nan());

        assert!(normalize(f64::NAN, 2.0).is_nan());
        assert!(denormalize(f64::NAN, 2.0).is_nan());
    }

    #[test]
    fn test_scaling() {
        let mut v = Variable::new("x", VarRole::Input);
        v.set_k_norm(0.5);
        v.set_value(4.0);
        v.normalize();
        assert_eq!(v.value_norm(), 2.0);

        let mut out = Variable::new("y", VarRole::Output);
        out.set_k_norm(3.0);
        out.set_value_norm(0.5);
        out.denormalize();
        assert_eq!(out.value(), 1.5);
    }

    #[test]
    fn test_unit_factor_round_trip() {
        for v in [-7.25, 0.0, 1e-9, 42.0] {
            for k in [1.0, -1.0] {
                assert_eq!(denormalize(normalize(v, k), k), v);
            }
        }
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("IN".parse::<VarRole>(), Ok(VarRole::Input));
        assert_eq!(" OUT ".parse::<VarRole>(), Ok(VarRole::Output));
        assert!("in".parse::<VarRole>().is_err());
        assert_eq!(VarRole::Output.to_string(), "OUT");
    }
}
