//! State layout and storage shared by populations and projections

use crate::{error::*, rng::SimRng};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How the initial value of a state variable is produced
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Initializer {
    /// Same value for every unit or edge
    Constant {
        /// Value
        value: f64,
    },
    /// Uniform draw in `[low, high)`
    Uniform {
        /// Lower bound
        low: f64,
        /// Upper bound
        high: f64,
    },
    /// Normal draw
    Normal {
        /// Mean
        mean: f64,
        /// Standard deviation
        std: f64,
    },
}

impl Initializer {
    /// Constant initializer
    pub fn constant(value: f64) -> Self {
        Self::Constant { value }
    }

    /// Check parameters
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Constant { value } if !value.is_finite() => Err(RuntimeError::invalid_parameter(
                "value",
                value.to_string(),
                "finite",
            )),
            Self::Uniform { low, high }
                if !(low.is_finite() && high.is_finite() && low <= high) =>
            {
                Err(RuntimeError::invalid_parameter(
                    "high",
                    format!("{} (with low={})", high, low),
                    ">= low",
                ))
            }
            Self::Normal { mean, std } if !(mean.is_finite() && std.is_finite() && std >= 0.0) => {
                Err(RuntimeError::invalid_parameter("std", std.to_string(), ">= 0.0"))
            }
            _ => Ok(()),
        }
    }

    /// Produce one value. Constants draw nothing from the stream.
    pub fn sample(&self, rng: &mut SimRng) -> f64 {
        match *self {
            Self::Constant { value } => value,
            Self::Uniform { low, high } => rng.uniform(low, high),
            Self::Normal { mean, std } => rng.normal(mean, std),
        }
    }
}

impl From<f64> for Initializer {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

impl Default for Initializer {
    fn default() -> Self {
        Self::constant(0.0)
    }
}

/// A named state variable and its initializer
#[derive(Debug, Clone, PartialEq)]
pub struct StateVar {
    /// Variable name
    pub name: String,
    /// Initial value
    pub init: Initializer,
}

impl StateVar {
    /// Declare a variable
    pub fn new(name: impl Into<String>, init: impl Into<Initializer>) -> Self {
        Self {
            name: name.into(),
            init: init.into(),
        }
    }
}

/// Check a variable layout for empty or duplicated names and bad initializers
pub(crate) fn validate_layout(vars: &[StateVar], owner: &str) -> Result<()> {
    for (k, var) in vars.iter().enumerate() {
        if var.name.is_empty() {
            return Err(RuntimeError::invalid_config(format!(
                "{}: variable {} has an empty name",
                owner, k
            )));
        }
        if vars[..k].iter().any(|other| other.name == var.name) {
            return Err(RuntimeError::invalid_config(format!(
                "{}: variable '{}' declared twice",
                owner, var.name
            )));
        }
        var.init.validate()?;
    }
    Ok(())
}

/// Per-step values every rule may read.
///
/// `globals` are the network-wide variables in declaration order. `shared`
/// holds the group-wide variables of the population or projection whose rule
/// is running, in the model's shared layout order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepContext<'a> {
    /// Current step
    pub t: i64,
    /// Step size (ms)
    pub dt: f64,
    /// Network-wide variables
    pub globals: &'a [f64],
    /// Group-wide variables of the running group
    pub shared: &'a [f64],
}

impl<'a> StepContext<'a> {
    /// Context with no globals and no shared variables
    pub fn new(t: i64, dt: f64) -> Self {
        Self {
            t,
            dt,
            globals: &[],
            shared: &[],
        }
    }

    /// Replace the network-wide values
    pub fn with_globals(self, globals: &'a [f64]) -> Self {
        Self { globals, ..self }
    }

    /// Replace the group-wide values
    pub fn with_shared(self, shared: &'a [f64]) -> Self {
        Self { shared, ..self }
    }

    /// Current time in milliseconds
    pub fn time_ms(&self) -> f64 {
        self.t as f64 * self.dt
    }
}

/// Read-only view of one unit, handed to plasticity rules
#[derive(Debug, Clone, Copy)]
pub struct UnitView<'a> {
    /// Global index of the unit in its population
    pub index: usize,
    /// State values in the population model's declaration order
    pub state: &'a [f64],
    /// Step of the most recent spike (`NEVER_SPIKED` if none)
    pub last_spike: i64,
    /// Sliding-window rate estimate (0 without a window)
    pub rate: f64,
    /// Shared variables of the unit's population
    pub shared: &'a [f64],
}

impl UnitView<'_> {
    /// Whether the unit spiked in step `t`
    pub fn spiked_at(&self, t: i64) -> bool {
        self.last_spike == t
    }
}

/// Row-major per-unit storage: row `i` holds every variable of unit `i`
#[derive(Debug, Clone, PartialEq)]
pub struct StateMatrix {
    vars: Vec<StateVar>,
    rows: usize,
    data: Vec<f64>,
}

impl StateMatrix {
    /// Storage for `rows` units with layout `vars`, zero-filled
    pub fn new(vars: Vec<StateVar>, rows: usize) -> Self {
        let data = vec![0.0; vars.len() * rows];
        Self { vars, rows, data }
    }

    /// Number of units
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of variables per unit
    pub fn width(&self) -> usize {
        self.vars.len()
    }

    /// Layout
    pub fn vars(&self) -> &[StateVar] {
        &self.vars
    }

    /// Position of a variable in the layout
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.vars.iter().position(|v| v.name == name)
    }

    /// Fill from the initializers, variable by variable
    pub fn initialize(&mut self, rng: &mut SimRng) {
        let width = self.width();
        for (k, var) in self.vars.iter().enumerate() {
            for row in 0..self.rows {
                self.data[row * width + k] = var.init.sample(rng);
            }
        }
    }

    /// Values of unit `i`. Panics if `i` is out of range.
    pub fn row(&self, i: usize) -> &[f64] {
        let w = self.width();
        &self.data[i * w..(i + 1) * w]
    }

    /// Mutable values of unit `i`
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        let w = self.width();
        &mut self.data[i * w..(i + 1) * w]
    }

    /// Whole backing buffer
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Whole backing buffer, mutable
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Snapshot of one variable across all units
    pub fn column(&self, k: usize) -> Vec<f64> {
        let w = self.width();
        (0..self.rows).map(|i| self.data[i * w + k]).collect()
    }

    /// Overwrite one variable across all units
    pub fn set_column(&mut self, k: usize, values: &[f64]) -> Result<()> {
        if values.len() != self.rows {
            return Err(RuntimeError::invalid_config(format!(
                "variable '{}' expects {} values, got {}",
                self.vars[k].name,
                self.rows,
                values.len()
            )));
        }
        let w = self.width();
        for (i, value) in values.iter().enumerate() {
            self.data[i * w + k] = *value;
        }
        Ok(())
    }
}
