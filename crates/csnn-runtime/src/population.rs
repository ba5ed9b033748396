//! Populations: homogeneous groups of units sharing one neuron model

use crate::{
    error::*,
    neuron::NeuronModel,
    rng::SimRng,
    state::{validate_layout, StateMatrix, StateVar, StepContext, UnitView},
};
use std::collections::VecDeque;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// `last_spike` value of a unit that has not spiked yet
pub const NEVER_SPIKED: i64 = -10_000;

/// Sliding window for the firing-rate estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateWindow {
    /// Window length in steps
    pub steps: i64,
    /// Factor turning a spike count into a rate
    pub scale: f64,
}

impl RateWindow {
    /// Window of `steps` steps with an explicit scale
    pub fn new(steps: i64, scale: f64) -> Result<Self> {
        if steps < 1 {
            return Err(RuntimeError::invalid_parameter(
                "steps",
                steps.to_string(),
                ">= 1",
            ));
        }
        if !scale.is_finite() {
            return Err(RuntimeError::invalid_parameter("scale", scale.to_string(), "finite"));
        }
        Ok(Self { steps, scale })
    }

    /// Window of `window_ms` milliseconds at step size `dt`; the rate is in
    /// spikes per second
    pub fn from_duration(window_ms: f64, dt: f64) -> Result<Self> {
        if !(window_ms.is_finite() && window_ms > 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "window_ms",
                window_ms.to_string(),
                "> 0.0",
            ));
        }
        let steps = (window_ms / dt) as i64;
        if steps < 1 {
            return Err(RuntimeError::invalid_parameter(
                "window_ms",
                format!("{} (with dt={})", window_ms, dt),
                ">= dt",
            ));
        }
        Ok(Self {
            steps,
            scale: 1000.0 / window_ms,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RateSetting {
    Fixed(RateWindow),
    Duration(f64),
}

/// A group of `size` units running the same model
#[derive(Debug)]
pub struct Population {
    name: String,
    size: usize,
    model: Box<dyn NeuronModel>,
    state: StateMatrix,
    shared: StateMatrix,
    input: Vec<f64>,
    last_spike: Vec<i64>,
    spiked: Vec<usize>,
    spike_flags: Vec<bool>,
    spike_history: Vec<VecDeque<i64>>,
    rate_setting: Option<RateSetting>,
    rate_window: Option<RateWindow>,
    rates: Vec<f64>,
}

impl Population {
    /// Create a population. State holds zeros until [`initialize`] runs.
    ///
    /// [`initialize`]: Population::initialize
    pub fn new(
        name: impl Into<String>,
        size: usize,
        model: impl NeuronModel + 'static,
    ) -> Result<Self> {
        Self::from_boxed(name, size, Box::new(model))
    }

    /// Create a population from a boxed model
    pub fn from_boxed(
        name: impl Into<String>,
        size: usize,
        model: Box<dyn NeuronModel>,
    ) -> Result<Self> {
        let name = name.into();
        if size == 0 {
            return Err(RuntimeError::invalid_parameter(
                "size",
                format!("0 (population '{}')", name),
                ">= 1",
            ));
        }
        let vars = model.variables();
        if vars.is_empty() {
            return Err(RuntimeError::invalid_config(format!(
                "{}: model '{}' declares no state variables",
                name,
                model.name()
            )));
        }
        let shared = model.shared_variables();
        // per-unit and shared names live in one namespace
        let all: Vec<StateVar> = vars.iter().chain(&shared).cloned().collect();
        validate_layout(&all, &name)?;

        Ok(Self {
            state: StateMatrix::new(vars, size),
            shared: StateMatrix::new(shared, 1),
            input: vec![0.0; size],
            last_spike: vec![NEVER_SPIKED; size],
            spiked: Vec::new(),
            spike_flags: vec![false; size],
            spike_history: vec![VecDeque::new(); size],
            rate_setting: None,
            rate_window: None,
            rates: vec![0.0; size],
            name,
            size,
            model,
        })
    }

    /// Estimate firing rates over a window given in milliseconds, resolved
    /// against `dt` at initialization
    pub fn with_rate_window_ms(mut self, window_ms: f64) -> Result<Self> {
        if !(window_ms.is_finite() && window_ms > 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "window_ms",
                window_ms.to_string(),
                "> 0.0",
            ));
        }
        self.rate_setting = Some(RateSetting::Duration(window_ms));
        Ok(self)
    }

    /// Estimate firing rates over a window given in steps
    pub fn with_rate_window(mut self, window: RateWindow) -> Self {
        self.set_rate_window(Some(window));
        self
    }

    /// Replace the rate window; `None` disables the estimate
    pub fn set_rate_window(&mut self, window: Option<RateWindow>) {
        self.rate_setting = window.map(RateSetting::Fixed);
        self.rate_window = window;
        if window.is_none() {
            self.rates.iter_mut().for_each(|r| *r = 0.0);
            self.spike_history.iter_mut().for_each(VecDeque::clear);
        }
    }

    /// Reset every per-unit value to its initial state
    pub fn initialize(&mut self, dt: f64, rng: &mut SimRng) -> Result<()> {
        self.rate_window = match self.rate_setting {
            Some(RateSetting::Fixed(window)) => Some(window),
            Some(RateSetting::Duration(ms)) => Some(RateWindow::from_duration(ms, dt)?),
            None => None,
        };

        self.shared.initialize(rng);
        self.state.initialize(rng);
        self.input.iter_mut().for_each(|x| *x = 0.0);
        self.last_spike.iter_mut().for_each(|t| *t = NEVER_SPIKED);
        self.spiked.clear();
        self.spike_flags.iter_mut().for_each(|f| *f = false);
        self.spike_history.iter_mut().for_each(VecDeque::clear);
        self.rates.iter_mut().for_each(|r| *r = 0.0);

        log::debug!(
            "Initialized population '{}' ({} x {})",
            self.name,
            self.size,
            self.model.name()
        );
        Ok(())
    }

    /// Run one step: integrate, consume input, detect spikes, reset, and
    /// refresh the rate estimate
    pub fn update(&mut self, ctx: &StepContext) {
        self.spiked.clear();

        let width = self.state.width();
        let model = self.model.as_ref();
        let ctx = &ctx.with_shared(self.shared.row(0));

        #[cfg(feature = "parallel")]
        self.state
            .as_mut_slice()
            .par_chunks_mut(width)
            .zip(self.input.par_iter_mut())
            .zip(self.spike_flags.par_iter_mut())
            .for_each(|((row, input), flag)| *flag = step_unit(model, row, input, ctx));

        #[cfg(not(feature = "parallel"))]
        self.state
            .as_mut_slice()
            .chunks_mut(width)
            .zip(self.input.iter_mut())
            .zip(self.spike_flags.iter_mut())
            .for_each(|((row, input), flag)| *flag = step_unit(model, row, input, ctx));

        let t = ctx.t;
        for i in 0..self.size {
            if self.spike_flags[i] {
                self.spiked.push(i);
                self.last_spike[i] = t;
                if self.rate_window.is_some() {
                    self.spike_history[i].push_back(t);
                }
            }

            if let Some(window) = self.rate_window {
                let history = &mut self.spike_history[i];
                while history.front().map_or(false, |&s| s <= t - window.steps) {
                    history.pop_front();
                }
                self.rates[i] = window.scale * history.len() as f64;
            }
        }
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of units
    pub fn size(&self) -> usize {
        self.size
    }

    /// Model driving this population
    pub fn model(&self) -> &dyn NeuronModel {
        self.model.as_ref()
    }

    /// Names of the state variables, in row order
    pub fn variable_names(&self) -> Vec<&str> {
        self.state.vars().iter().map(|v| v.name.as_str()).collect()
    }

    /// Position of a variable in each unit's row
    pub fn var_index(&self, name: &str) -> Option<usize> {
        self.state.index_of(name)
    }

    fn require_var(&self, name: &str) -> Result<usize> {
        self.var_index(name)
            .ok_or_else(|| RuntimeError::unknown_variable(name, self.name.clone()))
    }

    /// Snapshot of one variable across all units
    pub fn variable(&self, name: &str) -> Option<Vec<f64>> {
        self.var_index(name).map(|k| self.state.column(k))
    }

    /// Overwrite one variable across all units
    pub fn set_variable(&mut self, name: &str, values: &[f64]) -> Result<()> {
        let k = self.require_var(name)?;
        self.state.set_column(k, values)
    }

    /// Value of one variable of one unit
    pub fn get(&self, name: &str, unit: usize) -> Option<f64> {
        let k = self.var_index(name)?;
        (unit < self.size).then(|| self.state.row(unit)[k])
    }

    /// Set one variable of one unit
    pub fn set(&mut self, name: &str, unit: usize, value: f64) -> Result<()> {
        let k = self.require_var(name)?;
        self.check_unit(unit)?;
        self.state.row_mut(unit)[k] = value;
        Ok(())
    }

    fn check_unit(&self, unit: usize) -> Result<()> {
        if unit >= self.size {
            return Err(RuntimeError::invalid_config(format!(
                "unit {} out of range for population '{}' (size {})",
                unit, self.name, self.size
            )));
        }
        Ok(())
    }

    /// Full state row of one unit
    pub fn row(&self, unit: usize) -> Option<&[f64]> {
        (unit < self.size).then(|| self.state.row(unit))
    }

    /// Names of the population-wide variables
    pub fn shared_names(&self) -> Vec<&str> {
        self.shared.vars().iter().map(|v| v.name.as_str()).collect()
    }

    /// All population-wide values, in the model's shared layout order
    pub fn shared_values(&self) -> &[f64] {
        self.shared.row(0)
    }

    /// Value of one population-wide variable
    pub fn shared(&self, name: &str) -> Option<f64> {
        self.shared.index_of(name).map(|k| self.shared.row(0)[k])
    }

    /// Set one population-wide variable
    pub fn set_shared(&mut self, name: &str, value: f64) -> Result<()> {
        let k = self
            .shared
            .index_of(name)
            .ok_or_else(|| RuntimeError::unknown_variable(name, self.name.clone()))?;
        self.shared.row_mut(0)[k] = value;
        Ok(())
    }

    /// Input accumulated for the coming update
    pub fn input(&self) -> &[f64] {
        &self.input
    }

    /// Mutable input accumulator
    pub fn input_mut(&mut self) -> &mut [f64] {
        &mut self.input
    }

    /// Add to one unit's input accumulator
    pub fn add_input(&mut self, unit: usize, amount: f64) -> Result<()> {
        self.check_unit(unit)?;
        self.input[unit] += amount;
        Ok(())
    }

    /// Units that spiked in the last completed step, ascending
    pub fn spiked(&self) -> &[usize] {
        &self.spiked
    }

    /// Split borrow used when a projection feeds its own population
    pub(crate) fn spikes_and_input_mut(&mut self) -> (&[usize], &mut [f64]) {
        (&self.spiked, &mut self.input)
    }

    /// Step of each unit's most recent spike
    pub fn last_spike(&self) -> &[i64] {
        &self.last_spike
    }

    /// Current rate estimates (zero without a window)
    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    /// Resolved rate window
    pub fn rate_window(&self) -> Option<RateWindow> {
        self.rate_window
    }

    /// Spike steps still inside the rate window for one unit
    pub fn spike_history(&self, unit: usize) -> Option<Vec<i64>> {
        self.spike_history
            .get(unit)
            .map(|h| h.iter().copied().collect())
    }

    /// Read-only view of one unit for plasticity rules; `unit` must be in
    /// range
    pub(crate) fn unit_view(&self, unit: usize) -> UnitView<'_> {
        UnitView {
            index: unit,
            state: self.state.row(unit),
            last_spike: self.last_spike[unit],
            rate: self.rates[unit],
            shared: self.shared.row(0),
        }
    }
}

/// Per-unit part of the update; returns whether the unit spiked
fn step_unit(
    model: &dyn NeuronModel,
    row: &mut [f64],
    input: &mut f64,
    ctx: &StepContext,
) -> bool {
    model.update(row, *input, ctx);
    *input = 0.0;
    if model.spike(row, ctx) {
        model.reset(row, ctx);
        true
    } else {
        false
    }
}
