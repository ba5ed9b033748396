//! Synapse models: per-edge state and plasticity rules

use crate::{
    error::*,
    state::{StateVar, StepContext, UnitView},
};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Everything a plasticity rule may read for one edge, taken before any
/// edge of the step is modified
#[derive(Debug, Clone, Copy)]
pub struct EdgeView<'a> {
    /// Current weight
    pub weight: f64,
    /// Auxiliary variables in the model's declaration order
    pub vars: &'a [f64],
    /// Source unit
    pub pre: UnitView<'a>,
    /// Destination unit
    pub post: UnitView<'a>,
    /// Step being computed
    pub ctx: StepContext<'a>,
}

/// Per-edge rules of a projection.
///
/// `deltas` receives the weight change at index 0 and one change per
/// auxiliary variable after it. All deltas of an edge are computed before any
/// of them is added. The projection's shared values arrive in
/// `edge.ctx.shared`.
pub trait SynapseModel: fmt::Debug + Send + Sync {
    /// Auxiliary per-edge variables (the weight is implicit)
    fn variables(&self) -> Vec<StateVar> {
        Vec::new()
    }

    /// Variables held once per projection
    fn shared_variables(&self) -> Vec<StateVar> {
        Vec::new()
    }

    /// Whether `deltas` needs to run at all
    fn is_plastic(&self) -> bool {
        false
    }

    /// Compute per-edge changes
    fn deltas(&self, _edge: &EdgeView<'_>, _deltas: &mut [f64]) {}

    /// Model name for logs
    fn name(&self) -> &str {
        "synapse"
    }
}

/// Fixed weights, no auxiliary state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StaticSynapse;

impl SynapseModel for StaticSynapse {
    fn name(&self) -> &str {
        "static"
    }
}

/// Parameters for trace-based STDP (Spike-Timing Dependent Plasticity)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StdpParams {
    /// Learning rate for potentiation (weight increase)
    pub a_plus: f64,
    /// Learning rate for depression (weight decrease)
    pub a_minus: f64,
    /// Time constant of the presynaptic trace (ms)
    pub tau_plus: f64,
    /// Time constant of the postsynaptic trace (ms)
    pub tau_minus: f64,
    /// Maximum weight value
    pub w_max: f64,
    /// Minimum weight value
    pub w_min: f64,
}

impl Default for StdpParams {
    fn default() -> Self {
        Self {
            a_plus: 0.01,    // 1% potentiation rate
            a_minus: 0.012,  // 1.2% depression rate (slightly stronger)
            tau_plus: 20.0,  // 20ms potentiation window
            tau_minus: 20.0, // 20ms depression window
            w_max: 1.0,
            w_min: 0.0,
        }
    }
}

impl StdpParams {
    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("a_plus", self.a_plus),
            ("a_minus", self.a_minus),
            ("tau_plus", self.tau_plus),
            ("tau_minus", self.tau_minus),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(RuntimeError::invalid_parameter(name, value.to_string(), "> 0.0"));
            }
        }
        if !(self.w_max > self.w_min) {
            return Err(RuntimeError::invalid_parameter(
                "w_max",
                format!("{} (with w_min={})", self.w_max, self.w_min),
                "> w_min",
            ));
        }
        Ok(())
    }
}

/// Pair-based STDP with exponentially decaying traces.
///
/// Each edge carries `pre_trace` and `post_trace`. A postsynaptic spike
/// potentiates by the presynaptic trace (including a presynaptic spike in the
/// same step); a presynaptic spike depresses by the postsynaptic trace left
/// from earlier steps. Weights stay within `[w_min, w_max]`.
#[derive(Debug, Clone)]
pub struct StdpModel {
    params: StdpParams,
}

impl StdpModel {
    /// Index of `pre_trace` among the auxiliary variables
    pub const PRE_TRACE: usize = 0;
    /// Index of `post_trace` among the auxiliary variables
    pub const POST_TRACE: usize = 1;

    /// Create a model from validated parameters
    pub fn new(params: StdpParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Parameters
    pub fn params(&self) -> &StdpParams {
        &self.params
    }
}

impl SynapseModel for StdpModel {
    fn variables(&self) -> Vec<StateVar> {
        vec![StateVar::new("pre_trace", 0.0), StateVar::new("post_trace", 0.0)]
    }

    fn is_plastic(&self) -> bool {
        true
    }

    fn deltas(&self, edge: &EdgeView<'_>, deltas: &mut [f64]) {
        let p = &self.params;
        let t = edge.ctx.t;
        let pre_spiked = edge.pre.spiked_at(t);
        let post_spiked = edge.post.spiked_at(t);

        let x = edge.vars[Self::PRE_TRACE];
        let y = edge.vars[Self::POST_TRACE];
        let x_decayed = x * (-edge.ctx.dt / p.tau_plus).exp();
        let y_decayed = y * (-edge.ctx.dt / p.tau_minus).exp();
        let x_next = x_decayed + if pre_spiked { p.a_plus } else { 0.0 };
        let y_next = y_decayed + if post_spiked { p.a_minus } else { 0.0 };

        let mut dw = 0.0;
        if post_spiked {
            dw += x_next;
        }
        if pre_spiked {
            dw -= y_decayed;
        }
        let w_next = (edge.weight + dw).clamp(p.w_min, p.w_max);

        deltas[0] = w_next - edge.weight;
        deltas[1 + Self::PRE_TRACE] = x_next - x;
        deltas[1 + Self::POST_TRACE] = y_next - y;
    }

    fn name(&self) -> &str {
        "stdp"
    }
}

type DeltaRule = Box<dyn Fn(&EdgeView<'_>, &mut [f64]) + Send + Sync>;

/// Synapse model assembled from a closure
pub struct RuleSynapse {
    name: String,
    vars: Vec<StateVar>,
    shared: Vec<StateVar>,
    rule: Option<DeltaRule>,
}

impl RuleSynapse {
    /// Model with the given auxiliary layout and no plasticity
    pub fn new(name: impl Into<String>, vars: Vec<StateVar>) -> Self {
        Self {
            name: name.into(),
            vars,
            shared: Vec::new(),
            rule: None,
        }
    }

    /// Declare projection-wide variables
    pub fn with_shared(mut self, shared: Vec<StateVar>) -> Self {
        self.shared = shared;
        self
    }

    /// Set the delta rule
    pub fn on_deltas<F>(mut self, rule: F) -> Self
    where
        F: Fn(&EdgeView<'_>, &mut [f64]) + Send + Sync + 'static,
    {
        self.rule = Some(Box::new(rule));
        self
    }
}

impl fmt::Debug for RuleSynapse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSynapse")
            .field("name", &self.name)
            .field("vars", &self.vars)
            .field("shared", &self.shared)
            .field("plastic", &self.rule.is_some())
            .finish()
    }
}

impl SynapseModel for RuleSynapse {
    fn variables(&self) -> Vec<StateVar> {
        self.vars.clone()
    }

    fn shared_variables(&self) -> Vec<StateVar> {
        self.shared.clone()
    }

    fn is_plastic(&self) -> bool {
        self.rule.is_some()
    }

    fn deltas(&self, edge: &EdgeView<'_>, deltas: &mut [f64]) {
        if let Some(rule) = &self.rule {
            rule(edge, deltas);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
