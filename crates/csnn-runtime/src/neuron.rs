//! Neuron models: the per-unit update, spike and reset rules

use crate::{
    error::*,
    state::{StateVar, StepContext},
};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-unit rules a population runs every step.
///
/// `state` is the unit's row in the order returned by [`variables`]. The
/// population's values for [`shared_variables`] arrive in `ctx.shared`. Rules
/// must only depend on their arguments; the engine may call them for
/// different units concurrently.
///
/// [`variables`]: NeuronModel::variables
/// [`shared_variables`]: NeuronModel::shared_variables
pub trait NeuronModel: fmt::Debug + Send + Sync {
    /// State layout with initial values
    fn variables(&self) -> Vec<StateVar>;

    /// Variables held once per population
    fn shared_variables(&self) -> Vec<StateVar> {
        Vec::new()
    }

    /// Advance one unit by one step, consuming its accumulated `input`
    fn update(&self, state: &mut [f64], input: f64, ctx: &StepContext);

    /// Spike condition, evaluated on post-update state
    fn spike(&self, state: &[f64], ctx: &StepContext) -> bool;

    /// Applied once after a spike
    fn reset(&self, state: &mut [f64], ctx: &StepContext);

    /// Model name for logs
    fn name(&self) -> &str {
        "neuron"
    }
}

/// Parameters for Leaky Integrate-and-Fire neurons
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LifParams {
    /// Membrane time constant (ms)
    pub tau_m: f64,
    /// Resting potential (mV)
    pub v_rest: f64,
    /// Reset potential (mV)
    pub v_reset: f64,
    /// Threshold potential (mV)
    pub v_thresh: f64,
    /// Refractory period (ms)
    pub t_refrac: f64,
    /// Membrane resistance (MΩ)
    pub r_m: f64,
}

impl Default for LifParams {
    fn default() -> Self {
        Self {
            tau_m: 20.0,     // 20ms membrane time constant
            v_rest: -70.0,   // -70mV resting potential
            v_reset: -70.0,  // -70mV reset potential
            v_thresh: -50.0, // -50mV threshold
            t_refrac: 2.0,   // 2ms refractory period
            r_m: 10.0,       // 10MΩ resistance
        }
    }
}

impl LifParams {
    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.tau_m > 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "tau_m",
                self.tau_m.to_string(),
                "> 0.0",
            ));
        }
        if !(self.v_thresh > self.v_rest) {
            return Err(RuntimeError::invalid_parameter(
                "v_thresh",
                format!("{} (with v_rest={})", self.v_thresh, self.v_rest),
                "> v_rest",
            ));
        }
        if !(self.t_refrac >= 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "t_refrac",
                self.t_refrac.to_string(),
                ">= 0.0",
            ));
        }
        if !(self.r_m > 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "r_m",
                self.r_m.to_string(),
                "> 0.0",
            ));
        }
        Ok(())
    }
}

/// Leaky Integrate-and-Fire neuron with an absolute refractory period.
///
/// State: `v` (membrane potential, mV) and `refrac` (remaining refractory
/// time, ms). Input is treated as a current in nA for one step.
#[derive(Debug, Clone)]
pub struct LifModel {
    params: LifParams,
}

impl LifModel {
    /// Index of `v` in the state row
    pub const V: usize = 0;
    /// Index of `refrac` in the state row
    pub const REFRAC: usize = 1;

    /// Create a model from validated parameters
    pub fn new(params: LifParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Parameters
    pub fn params(&self) -> &LifParams {
        &self.params
    }
}

impl NeuronModel for LifModel {
    fn variables(&self) -> Vec<StateVar> {
        vec![
            StateVar::new("v", self.params.v_rest),
            StateVar::new("refrac", 0.0),
        ]
    }

    fn update(&self, state: &mut [f64], input: f64, ctx: &StepContext) {
        let p = &self.params;
        if state[Self::REFRAC] > 0.0 {
            let remaining = state[Self::REFRAC] - ctx.dt;
            // absorb rounding left over from fractional dt
            state[Self::REFRAC] = if remaining > 1e-9 { remaining } else { 0.0 };
            return;
        }

        // Euler step of dV/dt = (v_rest - v + R*I) / tau_m
        let dv_dt = (p.v_rest - state[Self::V] + p.r_m * input) / p.tau_m;
        state[Self::V] += dv_dt * ctx.dt;
    }

    fn spike(&self, state: &[f64], _ctx: &StepContext) -> bool {
        state[Self::V] >= self.params.v_thresh
    }

    fn reset(&self, state: &mut [f64], _ctx: &StepContext) {
        state[Self::V] = self.params.v_reset;
        state[Self::REFRAC] = self.params.t_refrac;
    }

    fn name(&self) -> &str {
        "lif"
    }
}

type UpdateRule = Box<dyn Fn(&mut [f64], f64, &StepContext) + Send + Sync>;
type SpikeRule = Box<dyn Fn(&[f64], &StepContext) -> bool + Send + Sync>;
type ResetRule = Box<dyn Fn(&mut [f64], &StepContext) + Send + Sync>;

/// Neuron model assembled from closures, the shape generated code takes.
///
/// Without a spike rule the unit never spikes; without a reset rule a spike
/// leaves the state untouched.
pub struct RuleNeuron {
    name: String,
    vars: Vec<StateVar>,
    shared: Vec<StateVar>,
    update: UpdateRule,
    spike: Option<SpikeRule>,
    reset: Option<ResetRule>,
}

impl RuleNeuron {
    /// Model with the given layout and no-op rules
    pub fn new(name: impl Into<String>, vars: Vec<StateVar>) -> Self {
        Self {
            name: name.into(),
            vars,
            shared: Vec::new(),
            update: Box::new(|_, _, _| {}),
            spike: None,
            reset: None,
        }
    }

    /// Declare population-wide variables
    pub fn with_shared(mut self, shared: Vec<StateVar>) -> Self {
        self.shared = shared;
        self
    }

    /// Set the update rule
    pub fn on_update<F>(mut self, rule: F) -> Self
    where
        F: Fn(&mut [f64], f64, &StepContext) + Send + Sync + 'static,
    {
        self.update = Box::new(rule);
        self
    }

    /// Set the spike condition
    pub fn spike_when<F>(mut self, rule: F) -> Self
    where
        F: Fn(&[f64], &StepContext) -> bool + Send + Sync + 'static,
    {
        self.spike = Some(Box::new(rule));
        self
    }

    /// Set the reset rule
    pub fn on_reset<F>(mut self, rule: F) -> Self
    where
        F: Fn(&mut [f64], &StepContext) + Send + Sync + 'static,
    {
        self.reset = Some(Box::new(rule));
        self
    }
}

impl fmt::Debug for RuleNeuron {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleNeuron")
            .field("name", &self.name)
            .field("vars", &self.vars)
            .field("shared", &self.shared)
            .field("spikes", &self.spike.is_some())
            .finish()
    }
}

impl NeuronModel for RuleNeuron {
    fn variables(&self) -> Vec<StateVar> {
        self.vars.clone()
    }

    fn shared_variables(&self) -> Vec<StateVar> {
        self.shared.clone()
    }

    fn update(&self, state: &mut [f64], input: f64, ctx: &StepContext) {
        (self.update)(state, input, ctx)
    }

    fn spike(&self, state: &[f64], ctx: &StepContext) -> bool {
        self.spike.as_ref().map_or(false, |rule| rule(state, ctx))
    }

    fn reset(&self, state: &mut [f64], ctx: &StepContext) {
        if let Some(rule) = &self.reset {
            rule(state, ctx);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(t: i64) -> StepContext<'static> {
        StepContext::new(t, 1.0)
    }

    fn fresh(model: &LifModel) -> Vec<f64> {
        model
            .variables()
            .iter()
            .map(|var| match var.init {
                crate::state::Initializer::Constant { value } => value,
                _ => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn test_lif_params_default() {
        let params = LifParams::default();
        assert!(params.validate().is_ok());
        assert!(params.v_thresh > params.v_rest);
    }

    #[test]
    fn test_lif_params_validation() {
        let bad_tau = LifParams { tau_m: -1.0, ..LifParams::default() };
        assert!(LifModel::new(bad_tau).is_err());

        let bad_thresh = LifParams { v_thresh: -80.0, ..LifParams::default() };
        assert!(LifModel::new(bad_thresh).is_err());

        let bad_refrac = LifParams { t_refrac: -2.0, ..LifParams::default() };
        assert!(LifModel::new(bad_refrac).is_err());

        let nan = LifParams { r_m: f64::NAN, ..LifParams::default() };
        assert!(LifModel::new(nan).is_err());
    }

    #[test]
    fn test_lif_subthreshold() {
        let model = LifModel::new(LifParams::default()).unwrap();
        let mut state = fresh(&model);
        model.update(&mut state, 1.0, &ctx(0));
        assert!(!model.spike(&state, &ctx(0)));
        assert!((state[LifModel::V] - (-69.5)).abs() < 1e-12);
    }

    #[test]
    fn test_lif_spike_and_reset() {
        let model = LifModel::new(LifParams::default()).unwrap();
        let mut state = fresh(&model);
        model.update(&mut state, 100.0, &ctx(0));
        assert!(model.spike(&state, &ctx(0)));
        model.reset(&mut state, &ctx(0));
        assert_eq!(state[LifModel::V], -70.0);
        assert_eq!(state[LifModel::REFRAC], 2.0);
    }

    #[test]
    fn test_refractory_period() {
        let model = LifModel::new(LifParams::default()).unwrap();
        let mut state = fresh(&model);
        model.update(&mut state, 100.0, &ctx(0));
        model.reset(&mut state, &ctx(0));

        // two 1ms steps are absorbed by the refractory period
        for t in 1..=2 {
            model.update(&mut state, 100.0, &ctx(t));
            assert!(!model.spike(&state, &ctx(t)));
        }

        model.update(&mut state, 100.0, &ctx(3));
        assert!(model.spike(&state, &ctx(3)));
    }

    #[test]
    fn test_fractional_dt_refractory_terminates() {
        let model = LifModel::new(LifParams::default()).unwrap();
        let mut state = vec![-70.0, 2.0];
        let ctx = StepContext::new(0, 0.1);
        let mut blocked = 0;
        while state[LifModel::REFRAC] > 0.0 {
            model.update(&mut state, 0.0, &ctx);
            blocked += 1;
        }
        assert_eq!(blocked, 20);
    }

    #[test]
    fn test_rule_neuron() {
        let model = RuleNeuron::new("counter", vec![StateVar::new("x", 0.0)])
            .on_update(|s, input, _| s[0] += input)
            .spike_when(|s, _| s[0] >= 3.0)
            .on_reset(|s, _| s[0] = 0.0);

        let mut state = vec![0.0];
        model.update(&mut state, 2.0, &ctx(0));
        assert!(!model.spike(&state, &ctx(0)));
        model.update(&mut state, 2.0, &ctx(1));
        assert!(model.spike(&state, &ctx(1)));
        model.reset(&mut state, &ctx(1));
        assert_eq!(state, vec![0.0]);
        assert_eq!(model.name(), "counter");
    }

    #[test]
    fn test_rule_neuron_reads_shared() {
        let model = RuleNeuron::new("gain", vec![StateVar::new("x", 0.0)])
            .with_shared(vec![StateVar::new("gain", 2.0)])
            .on_update(|s, input, ctx| s[0] += ctx.shared[0] * input);
        assert_eq!(model.shared_variables().len(), 1);
        assert!(LifModel::new(LifParams::default()).unwrap().shared_variables().is_empty());

        let shared = [2.0];
        let mut state = vec![0.0];
        model.update(&mut state, 1.5, &ctx(0).with_shared(&shared));
        assert_eq!(state, vec![3.0]);
    }

    #[test]
    fn test_rule_neuron_defaults() {
        let model = RuleNeuron::new("silent", vec![StateVar::new("x", 1.0)]);
        let mut state = vec![5.0];
        model.update(&mut state, 3.0, &ctx(0));
        assert_eq!(state, vec![5.0]);
        assert!(!model.spike(&state, &ctx(0)));
    }
}
