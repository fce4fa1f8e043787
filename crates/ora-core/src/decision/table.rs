//! Decision table loading and validation.
//!
//! A table is a properties document:
//!
//! ```text
//! NumInputs = 1
//! NumOutputs = 1
//! NumPoints = 3
//! VarID_1 = e_nd
//! VarType_1 = IN
//! VarMIN_1 = -1.0
//! VarMAX_1 = 1.0
//! VarID_2 = du_cr
//! VarType_2 = OUT
//! VarMIN_2 = -1.0
//! VarMAX_2 = 1.0
//! e_nd = -1.0, 0.0, 1.0
//! du_cr = -1.0, 0.0, 1.0
//! ```
//!
//! Each declared variable ID names a row of `NumPoints` sample points
//! separated by commas and/or spaces. Input rows must be non-decreasing.
//! `VarMin_i`/`VarMax_i` are accepted as spellings of `VarMIN_i`/`VarMAX_i`.

use super::variable::{VarRole, Variable};
use crate::error::TableError;
use crate::properties::parse_properties;
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub const NUM_INPUTS: &str = "NumInputs";
pub const NUM_OUTPUTS: &str = "NumOutputs";
pub const NUM_POINTS: &str = "NumPoints";
pub const VAR_ID: &str = "VarID";
pub const VAR_TYPE: &str = "VarType";
pub const VAR_MIN: &str = "VarMIN";
pub const VAR_MAX: &str = "VarMAX";
const VAR_MIN_ALT: &str = "VarMin";
const VAR_MAX_ALT: &str = "VarMax";

/// Keys of the smallest valid table (one input, one output), rows excluded.
const SCHEMA_KEYS: [&str; 11] = [
    NUM_INPUTS,
    NUM_OUTPUTS,
    "VarID_1",
    "VarType_1",
    "VarMIN_1",
    "VarMAX_1",
    "VarID_2",
    "VarType_2",
    "VarMIN_2",
    "VarMAX_2",
    NUM_POINTS,
];

/// Keys contributed by each variable: ID, type, min, max and its points row.
const KEYS_PER_VARIABLE: usize = 5;

/// A validated interpolation table.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTable {
    pub(super) num_points: usize,
    pub(super) inputs: Vec<Variable>,
    pub(super) outputs: Vec<Variable>,
    pub(super) points: HashMap<String, Vec<f64>>,
}

impl DecisionTable {
    /// Parse a table from properties text.
    pub fn parse(text: &str) -> Result<Self, TableError> {
        Self::from_map(&parse_properties(text))
    }

    /// Load a table file.
    pub fn load(path: &Path) -> Result<Self, TableError> {
        let text = std::fs::read_to_string(path).map_err(|e| TableError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let table = Self::parse(&text)?;
        tracing::debug!(
            path = %path.display(),
            inputs = table.inputs.len(),
            outputs = table.outputs.len(),
            points = table.num_points,
            "Loaded decision table"
        );
        Ok(table)
    }

    /// Validate a key/value map into a table.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, TableError> {
        if map.len() < SCHEMA_KEYS.len() {
            return Err(TableError::FieldCount {
                expected: SCHEMA_KEYS.len(),
                found: map.len(),
            });
        }
        for key in SCHEMA_KEYS {
            field(map, key)?;
        }

        let num_inputs = count(map, NUM_INPUTS)?;
        let num_outputs = count(map, NUM_OUTPUTS)?;
        let num_points = count(map, NUM_POINTS)?;

        // counts too large for any table the map could hold
        let too_many = || TableError::FieldCount {
            expected: usize::MAX,
            found: map.len(),
        };
        let num_vars = num_inputs.checked_add(num_outputs).ok_or_else(too_many)?;
        let expected = KEYS_PER_VARIABLE
            .checked_mul(num_vars)
            .and_then(|keys| keys.checked_add(SCHEMA_KEYS.len() - 8))
            .ok_or_else(too_many)?;
        if map.len() < expected {
            return Err(TableError::FieldCount {
                expected,
                found: map.len(),
            });
        }
        for (key, n) in [(NUM_INPUTS, num_inputs), (NUM_OUTPUTS, num_outputs), (NUM_POINTS, num_points)] {
            if n == 0 {
                return Err(bad_value(key, "0"));
            }
        }

        let (inputs, outputs) = variables(map, num_vars)?;
        if inputs.len() != num_inputs {
            return Err(bad_value(NUM_INPUTS, &num_inputs.to_string()));
        }
        if outputs.len() != num_outputs {
            return Err(bad_value(NUM_OUTPUTS, &num_outputs.to_string()));
        }

        let mut points = HashMap::with_capacity(num_vars);
        for var in &inputs {
            let row = points_row(map, var.id(), num_points)?;
            if row.windows(2).any(|w| w[1] < w[0]) {
                return Err(TableError::Unsorted(var.id().to_string()));
            }
            points.insert(var.id().to_string(), row);
        }
        for var in &outputs {
            let row = points_row(map, var.id(), num_points)?;
            points.insert(var.id().to_string(), row);
        }

        Ok(Self {
            num_points,
            inputs,
            outputs,
            points,
        })
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn inputs(&self) -> &[Variable] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Variable] {
        &self.outputs
    }

    /// Sample points of a variable.
    pub fn points(&self, var_id: &str) -> Option<&[f64]> {
        self.points.get(var_id).map(Vec::as_slice)
    }
}

fn bad_value(key: &str, value: &str) -> TableError {
    TableError::BadValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn alternate_spelling(key: &str) -> Option<String> {
    key.strip_prefix(VAR_MIN)
        .map(|rest| format!("{VAR_MIN_ALT}{rest}"))
        .or_else(|| key.strip_prefix(VAR_MAX).map(|rest| format!("{VAR_MAX_ALT}{rest}")))
}

fn field<'a>(map: &'a HashMap<String, String>, key: &str) -> Result<&'a str, TableError> {
    map.get(key)
        .or_else(|| alternate_spelling(key).and_then(|alt| map.get(&alt)))
        .map(|v| v.trim())
        .ok_or_else(|| TableError::MissingKey(key.to_string()))
}

fn count(map: &HashMap<String, String>, key: &str) -> Result<usize, TableError> {
    let raw = field(map, key)?;
    raw.parse().map_err(|_| TableError::NotANumber {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn bound(map: &HashMap<String, String>, key: &str) -> Result<f64, TableError> {
    let raw = field(map, key)?;
    raw.parse().map_err(|_| bad_value(key, raw))
}

fn variables(
    map: &HashMap<String, String>,
    num_vars: usize,
) -> Result<(Vec<Variable>, Vec<Variable>), TableError> {
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    let mut seen = HashSet::new();

    for n in 1..=num_vars {
        let type_key = format!("{VAR_TYPE}_{n}");
        let raw_type = field(map, &type_key)?;
        let role: VarRole = raw_type
            .parse()
            .map_err(|_| bad_value(&type_key, raw_type))?;

        let min_key = format!("{VAR_MIN}_{n}");
        let max_key = format!("{VAR_MAX}_{n}");
        let min = bound(map, &min_key)?;
        let max = bound(map, &max_key)?;
        if min > max {
            return Err(bad_value(&max_key, &max.to_string()));
        }

        let id_key = format!("{VAR_ID}_{n}");
        let id = field(map, &id_key)?;
        if id.is_empty() || !seen.insert(id.to_string()) {
            return Err(bad_value(&id_key, id));
        }

        let var = Variable::new(id, role).with_bounds(min, max).with_number(n);
        match role {
            VarRole::Input => inputs.push(var),
            VarRole::Output => outputs.push(var),
        }
    }

    Ok((inputs, outputs))
}

fn points_row(
    map: &HashMap<String, String>,
    var_id: &str,
    num_points: usize,
) -> Result<Vec<f64>, TableError> {
    let raw = map
        .get(var_id)
        .ok_or_else(|| TableError::MissingKey(var_id.to_string()))?;

    let row = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|cell| !cell.is_empty())
        .map(|cell| match cell.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(bad_value(var_id, cell)),
        })
        .collect::<Result<Vec<f64>, TableError>>()?;

    if row.len() != num_points {
        return Err(TableError::ColumnCount {
            var: var_id.to_string(),
            expected: num_points,
            found: row.len(),
        });
    }
    Ok(row)
}
