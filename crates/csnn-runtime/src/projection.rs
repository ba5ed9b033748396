//! Projections: sparse weighted edges from one population to another
//!
//! Edges are stored destination-major (`post_index[i]`, `pre_index[i][j]`)
//! with every per-edge value index-aligned to `pre_index`. Spike
//! propagation walks the [`InverseIndex`] instead, so a spike costs
//! O(out-degree).

use crate::{
    connectivity::{build_connectivity, AllToAll, ConnectivityPattern, Connectivity},
    delay::DelayQueue,
    error::*,
    inverse::InverseIndex,
    network::PopulationId,
    plasticity::{EdgeView, StaticSynapse, SynapseModel},
    population::Population,
    rng::SimRng,
    state::{validate_layout, Initializer, StateMatrix, StateVar, StepContext},
};
use smallvec::{smallvec, SmallVec};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Name under which the weight is exposed by [`Projection::variable`]
pub const WEIGHT_VAR: &str = "w";

/// How per-edge delays are produced
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum DelayInit {
    /// No delays: events reach their destination in the step they are generated
    #[default]
    None,
    /// Same delay in steps for every edge
    Steps {
        /// Delay in steps
        steps: u32,
    },
    /// Same delay in milliseconds, rounded to steps at initialization
    Milliseconds {
        /// Delay in ms
        ms: f64,
    },
    /// Per-edge delay drawn uniformly from `[min, max]` steps
    UniformSteps {
        /// Smallest delay
        min: u32,
        /// Largest delay
        max: u32,
    },
}

impl DelayInit {
    /// Check parameters
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Milliseconds { ms } if !(ms.is_finite() && ms >= 0.0) => Err(
                RuntimeError::invalid_parameter("delay_ms", ms.to_string(), ">= 0.0"),
            ),
            Self::UniformSteps { min, max } if min > max => Err(RuntimeError::invalid_parameter(
                "max",
                format!("{} (with min={})", max, min),
                ">= min",
            )),
            _ => Ok(()),
        }
    }

    fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Event transmission mode of a projection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transmission {
    /// Weights are added to the destination input directly
    Immediate,
    /// Events go through the delay queue
    Delayed,
}

/// Everything needed to create a projection
#[derive(Debug)]
pub struct ProjectionSpec {
    pub(crate) name: Option<String>,
    pub(crate) pre: PopulationId,
    pub(crate) post: PopulationId,
    pub(crate) pattern: Box<dyn ConnectivityPattern>,
    pub(crate) model: Box<dyn SynapseModel>,
    pub(crate) weight: Initializer,
    pub(crate) delay: DelayInit,
}

impl ProjectionSpec {
    /// All-to-all static projection with unit weights and no delays
    pub fn new(pre: PopulationId, post: PopulationId) -> Self {
        Self {
            name: None,
            pre,
            post,
            pattern: Box::new(AllToAll),
            model: Box::new(StaticSynapse),
            weight: Initializer::constant(1.0),
            delay: DelayInit::None,
        }
    }

    /// Set the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the connectivity pattern
    pub fn with_pattern(mut self, pattern: impl ConnectivityPattern + 'static) -> Self {
        self.pattern = Box::new(pattern);
        self
    }

    /// Set a boxed connectivity pattern
    pub fn with_boxed_pattern(mut self, pattern: Box<dyn ConnectivityPattern>) -> Self {
        self.pattern = pattern;
        self
    }

    /// Set the synapse model
    pub fn with_model(mut self, model: impl SynapseModel + 'static) -> Self {
        self.model = Box::new(model);
        self
    }

    /// Set a boxed synapse model
    pub fn with_boxed_model(mut self, model: Box<dyn SynapseModel>) -> Self {
        self.model = model;
        self
    }

    /// Set the weight initializer
    pub fn with_weight(mut self, weight: impl Into<Initializer>) -> Self {
        self.weight = weight.into();
        self
    }

    /// Set the delay initializer
    pub fn with_delay(mut self, delay: DelayInit) -> Self {
        self.delay = delay;
        self
    }

    /// Source population
    pub fn pre(&self) -> PopulationId {
        self.pre
    }

    /// Destination population
    pub fn post(&self) -> PopulationId {
        self.post
    }
}

/// Directed weighted edges between two populations
#[derive(Debug)]
pub struct Projection {
    name: String,
    pre: PopulationId,
    post: PopulationId,
    pre_size: usize,
    post_size: usize,
    model: Box<dyn SynapseModel>,
    aux_vars: Vec<StateVar>,
    shared: StateMatrix,
    weight_init: Initializer,
    delay_init: DelayInit,
    /// Delays came from `set_delays` and survive `initialize`
    explicit_delays: bool,
    post_index: Vec<usize>,
    pre_index: Vec<Vec<usize>>,
    weights: Vec<Vec<f64>>,
    /// Per destination, edge-major: edge `j` owns `aux[i][j*n..(j+1)*n]`
    aux: Vec<Vec<f64>>,
    delays: Option<Vec<Vec<u32>>>,
    inverse: InverseIndex,
    queue: DelayQueue,
}

impl Projection {
    /// Validate `spec` and build its connectivity from `rng`
    pub(crate) fn new(
        spec: ProjectionSpec,
        pre_size: usize,
        post_size: usize,
        rng: &mut SimRng,
    ) -> Result<Self> {
        let ProjectionSpec {
            name,
            pre,
            post,
            pattern,
            model,
            weight,
            delay,
        } = spec;
        let name = name.unwrap_or_else(|| format!("{}->{}", pre.index(), post.index()));

        weight.validate()?;
        delay.validate()?;
        let aux_vars = model.variables();
        let shared = model.shared_variables();
        let all: Vec<StateVar> = aux_vars.iter().chain(&shared).cloned().collect();
        validate_layout(&all, &name)?;
        if all.iter().any(|v| v.name == WEIGHT_VAR) {
            return Err(RuntimeError::invalid_config(format!(
                "{}: synapse variable '{}' collides with the weight",
                name, WEIGHT_VAR
            )));
        }

        let connectivity = build_connectivity(pattern.as_ref(), pre_size, post_size, rng)?;

        let mut projection = Self {
            name,
            pre,
            post,
            pre_size,
            post_size,
            model,
            aux_vars,
            shared: StateMatrix::new(shared, 1),
            weight_init: weight,
            delay_init: delay,
            explicit_delays: false,
            post_index: Vec::new(),
            pre_index: Vec::new(),
            weights: Vec::new(),
            aux: Vec::new(),
            delays: None,
            inverse: InverseIndex::default(),
            queue: DelayQueue::new(),
        };
        projection.install(connectivity);
        Ok(projection)
    }

    /// Adopt new adjacency with zeroed per-edge values. Explicit delays do
    /// not fit the new shape and give way to the configured [`DelayInit`].
    fn install(&mut self, connectivity: Connectivity) {
        if self.explicit_delays {
            log::warn!(
                "'{}': explicit delays dropped with the old connectivity, using {:?}",
                self.name,
                self.delay_init
            );
            self.explicit_delays = false;
        }
        let (post_index, pre_index) = connectivity.into_parts();
        let n_aux = self.aux_vars.len();
        self.weights = pre_index.iter().map(|s| vec![0.0; s.len()]).collect();
        self.aux = pre_index.iter().map(|s| vec![0.0; s.len() * n_aux]).collect();
        self.delays = if self.delay_init.is_none() {
            None
        } else {
            Some(pre_index.iter().map(|s| vec![0; s.len()]).collect())
        };
        self.inverse = InverseIndex::build(self.pre_size, self.post_size, &post_index, &pre_index);
        self.post_index = post_index;
        self.pre_index = pre_index;
        self.queue.clear();
    }

    /// Draw shared values, weights, auxiliary variables and delays from their
    /// initializers and drop pending events.
    ///
    /// Values set by hand before this call are overwritten, except delays
    /// given through [`set_delays`](Projection::set_delays).
    pub fn initialize(&mut self, dt: f64, rng: &mut SimRng) -> Result<()> {
        self.shared.initialize(rng);
        for w in self.weights.iter_mut().flatten() {
            *w = self.weight_init.sample(rng);
        }

        let n_aux = self.aux_vars.len();
        for (k, var) in self.aux_vars.iter().enumerate() {
            for row in self.aux.iter_mut() {
                for value in row.iter_mut().skip(k).step_by(n_aux) {
                    *value = var.init.sample(rng);
                }
            }
        }

        let delay_init = self.delay_init;
        let drawn = self.delays.as_mut().filter(|_| !self.explicit_delays);
        if let Some(delays) = drawn {
            for d in delays.iter_mut().flatten() {
                *d = match delay_init {
                    DelayInit::None => 0,
                    DelayInit::Steps { steps } => steps,
                    DelayInit::Milliseconds { ms } => (ms / dt).round() as u32,
                    DelayInit::UniformSteps { min, max } => rng.uniform_int(min, max),
                };
            }
        }

        self.queue.clear();

        log::debug!(
            "Initialized projection '{}': {} edges, {:?}",
            self.name,
            self.edge_count(),
            self.transmission()
        );
        Ok(())
    }

    /// Propagate the spikes of the previous step. Returns the number of
    /// edges traversed.
    pub fn generate_events(&mut self, spiked: &[usize], input: &mut [f64], t: i64) -> usize {
        let mut events = 0;
        for &pre in spiked {
            for edge in self.inverse.lookup(pre) {
                let post = self.post_index[edge.dest];
                let weight = self.weights[edge.dest][edge.edge];
                match &self.delays {
                    None => input[post] += weight,
                    Some(delays) => {
                        let at = t + i64::from(delays[edge.dest][edge.edge]);
                        self.queue.push(post, at, weight);
                    }
                }
                events += 1;
            }
        }
        events
    }

    /// Apply every queued event due at `t`
    pub fn deliver_due(&mut self, input: &mut [f64], t: i64) -> usize {
        self.queue.deliver_due(t, input)
    }

    /// Run the synapse model on every edge. No-op for non-plastic models.
    pub fn update_plasticity(&mut self, pre: &Population, post: &Population, ctx: &StepContext) {
        let model = self.model.as_ref();
        if !model.is_plastic() {
            return;
        }
        let n_aux = self.aux_vars.len();
        let ctx = &ctx.with_shared(self.shared.row(0));

        #[cfg(feature = "parallel")]
        self.weights
            .par_iter_mut()
            .zip(self.aux.par_iter_mut())
            .zip(self.post_index.par_iter())
            .zip(self.pre_index.par_iter())
            .for_each(|(((weights, aux), &post_unit), sources)| {
                update_destination(model, n_aux, weights, aux, sources, pre, post, post_unit, ctx)
            });

        #[cfg(not(feature = "parallel"))]
        self.weights
            .iter_mut()
            .zip(self.aux.iter_mut())
            .zip(self.post_index.iter())
            .zip(self.pre_index.iter())
            .for_each(|(((weights, aux), &post_unit), sources)| {
                update_destination(model, n_aux, weights, aux, sources, pre, post, post_unit, ctx)
            });
    }

    /// Replace the adjacency. Per-edge values are re-drawn from their
    /// initializers and the inverse index is rebuilt.
    pub fn set_connectivity(
        &mut self,
        connectivity: Connectivity,
        dt: f64,
        rng: &mut SimRng,
    ) -> Result<()> {
        self.replace_connectivity(connectivity)?;
        self.initialize(dt, rng)
    }

    /// Replace the adjacency, leaving per-edge values zeroed until the next
    /// [`initialize`](Projection::initialize)
    pub(crate) fn replace_connectivity(&mut self, connectivity: Connectivity) -> Result<()> {
        if connectivity.pre_size() != self.pre_size || connectivity.post_size() != self.post_size {
            return Err(RuntimeError::invalid_config(format!(
                "{}: connectivity is {}x{}, projection is {}x{}",
                self.name,
                connectivity.pre_size(),
                connectivity.post_size(),
                self.pre_size,
                self.post_size
            )));
        }
        self.install(connectivity);
        log::debug!(
            "Replaced connectivity of '{}': {} edges",
            self.name,
            self.edge_count()
        );
        Ok(())
    }

    fn check_shape<T>(&self, what: &str, values: &[Vec<T>]) -> Result<()> {
        let matches = values.len() == self.pre_index.len()
            && values
                .iter()
                .zip(&self.pre_index)
                .all(|(row, sources)| row.len() == sources.len());
        if !matches {
            return Err(RuntimeError::invalid_config(format!(
                "{}: {} must have the shape of pre_index",
                self.name, what
            )));
        }
        Ok(())
    }

    /// Set every delay in steps; switches the projection to delayed mode.
    ///
    /// The delays are kept by [`initialize`](Projection::initialize) and
    /// dropped when the connectivity is replaced.
    pub fn set_delays(&mut self, delays: Vec<Vec<u32>>) -> Result<()> {
        self.check_shape("delays", &delays)?;
        self.delays = Some(delays);
        self.explicit_delays = true;
        Ok(())
    }

    /// Drop delays and pending events; switches to immediate mode
    pub fn clear_delays(&mut self) {
        self.delays = None;
        self.delay_init = DelayInit::None;
        self.explicit_delays = false;
        self.queue.clear();
    }

    /// Overwrite every weight
    pub fn set_weights(&mut self, weights: Vec<Vec<f64>>) -> Result<()> {
        self.check_shape("weights", &weights)?;
        self.weights = weights;
        Ok(())
    }

    /// Weights per active destination
    pub fn weights(&self) -> &[Vec<f64>] {
        &self.weights
    }

    /// Weight of edge `j` of active destination `i`
    pub fn weight(&self, i: usize, j: usize) -> Option<f64> {
        self.weights.get(i)?.get(j).copied()
    }

    fn locate(&self, post: usize, pre: usize) -> Option<(usize, usize)> {
        let i = self.inverse.local_of(post)?;
        let j = self.pre_index[i].iter().position(|&s| s == pre)?;
        Some((i, j))
    }

    /// Weight of the edge `pre -> post` by global unit indices
    pub fn synapse_weight(&self, post: usize, pre: usize) -> Option<f64> {
        self.locate(post, pre).map(|(i, j)| self.weights[i][j])
    }

    /// Set the weight of the edge `pre -> post`
    pub fn set_synapse_weight(&mut self, post: usize, pre: usize, weight: f64) -> Result<()> {
        let (i, j) = self.locate(post, pre).ok_or_else(|| {
            RuntimeError::invalid_config(format!(
                "{}: no edge {} -> {}",
                self.name, pre, post
            ))
        })?;
        self.weights[i][j] = weight;
        Ok(())
    }

    /// Per-edge values of a variable, shaped like `pre_index`. `"w"` names
    /// the weight.
    pub fn variable(&self, name: &str) -> Option<Vec<Vec<f64>>> {
        if name == WEIGHT_VAR {
            return Some(self.weights.clone());
        }
        let k = self.aux_vars.iter().position(|v| v.name == name)?;
        let n = self.aux_vars.len();
        Some(
            self.aux
                .iter()
                .map(|row| row.iter().skip(k).step_by(n).copied().collect())
                .collect(),
        )
    }

    /// Overwrite a per-edge variable
    pub fn set_variable(&mut self, name: &str, values: Vec<Vec<f64>>) -> Result<()> {
        if name == WEIGHT_VAR {
            return self.set_weights(values);
        }
        let k = self
            .aux_vars
            .iter()
            .position(|v| v.name == name)
            .ok_or_else(|| RuntimeError::unknown_variable(name, self.name.clone()))?;
        self.check_shape(name, &values)?;
        let n = self.aux_vars.len();
        for (row, new) in self.aux.iter_mut().zip(values) {
            for (slot, value) in row.iter_mut().skip(k).step_by(n).zip(new) {
                *slot = value;
            }
        }
        Ok(())
    }

    /// Names of the auxiliary per-edge variables
    pub fn variable_names(&self) -> Vec<&str> {
        self.aux_vars.iter().map(|v| v.name.as_str()).collect()
    }

    /// Names of the projection-wide variables
    pub fn shared_names(&self) -> Vec<&str> {
        self.shared.vars().iter().map(|v| v.name.as_str()).collect()
    }

    /// All projection-wide values, in the model's shared layout order
    pub fn shared_values(&self) -> &[f64] {
        self.shared.row(0)
    }

    /// Value of one projection-wide variable
    pub fn shared(&self, name: &str) -> Option<f64> {
        self.shared.index_of(name).map(|k| self.shared.row(0)[k])
    }

    /// Set one projection-wide variable
    pub fn set_shared(&mut self, name: &str, value: f64) -> Result<()> {
        let k = self
            .shared
            .index_of(name)
            .ok_or_else(|| RuntimeError::unknown_variable(name, self.name.clone()))?;
        self.shared.row_mut(0)[k] = value;
        Ok(())
    }

    /// Whether the delays were set explicitly rather than drawn
    pub fn has_explicit_delays(&self) -> bool {
        self.explicit_delays
    }

    /// Per-edge delays in steps, if any
    pub fn delays(&self) -> Option<&[Vec<u32>]> {
        self.delays.as_deref()
    }

    /// Pending events
    pub fn queue(&self) -> &DelayQueue {
        &self.queue
    }

    /// Source-major view of the edges
    pub fn inverse(&self) -> &InverseIndex {
        &self.inverse
    }

    /// Active destinations
    pub fn post_index(&self) -> &[usize] {
        &self.post_index
    }

    /// Sources of each active destination
    pub fn pre_index(&self) -> &[Vec<usize>] {
        &self.pre_index
    }

    /// Total number of edges
    pub fn edge_count(&self) -> usize {
        self.pre_index.iter().map(Vec::len).sum()
    }

    /// Number of edges into active destination `i`
    pub fn nb_synapses(&self, i: usize) -> usize {
        self.pre_index.get(i).map_or(0, Vec::len)
    }

    /// Current transmission mode
    pub fn transmission(&self) -> Transmission {
        if self.delays.is_some() {
            Transmission::Delayed
        } else {
            Transmission::Immediate
        }
    }

    /// Synapse model
    pub fn model(&self) -> &dyn SynapseModel {
        self.model.as_ref()
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source population
    pub fn pre(&self) -> PopulationId {
        self.pre
    }

    /// Destination population
    pub fn post(&self) -> PopulationId {
        self.post
    }
}

#[allow(clippy::too_many_arguments)]
fn update_destination(
    model: &dyn SynapseModel,
    n_aux: usize,
    weights: &mut [f64],
    aux: &mut [f64],
    sources: &[usize],
    pre: &Population,
    post: &Population,
    post_unit: usize,
    ctx: &StepContext,
) {
    let post_view = post.unit_view(post_unit);
    let mut deltas: SmallVec<[f64; 8]> = smallvec![0.0; n_aux + 1];

    for (j, &source) in sources.iter().enumerate() {
        let vars = &mut aux[j * n_aux..(j + 1) * n_aux];
        deltas.iter_mut().for_each(|d| *d = 0.0);
        let view = EdgeView {
            weight: weights[j],
            vars: &*vars,
            pre: pre.unit_view(source),
            post: post_view,
            ctx: *ctx,
        };
        model.deltas(&view, &mut deltas);

        weights[j] += deltas[0];
        for (value, delta) in vars.iter_mut().zip(&deltas[1..]) {
            *value += delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        connectivity::FnPattern,
        plasticity::RuleSynapse,
        neuron::RuleNeuron,
    };

    fn ids() -> (PopulationId, PopulationId) {
        (PopulationId::new(0), PopulationId::new(1))
    }

    fn all_to_all(pre: usize, post: usize) -> Projection {
        let (a, b) = ids();
        let mut proj =
            Projection::new(ProjectionSpec::new(a, b), pre, post, &mut SimRng::default()).unwrap();
        proj.initialize(1.0, &mut SimRng::default()).unwrap();
        proj
    }

    #[test]
    fn test_default_projection() {
        let proj = all_to_all(2, 3);
        assert_eq!(proj.edge_count(), 6);
        assert_eq!(proj.weights(), &[vec![1.0, 1.0], vec![1.0, 1.0], vec![1.0, 1.0]]);
        assert_eq!(proj.transmission(), Transmission::Immediate);
        assert_eq!(proj.name(), "0->1");
        assert_eq!(proj.nb_synapses(1), 2);
        assert_eq!(proj.nb_synapses(9), 0);
    }

    #[test]
    fn test_immediate_events() {
        let mut proj = all_to_all(2, 3);
        proj.set_synapse_weight(2, 1, 0.5).unwrap();
        let mut input = vec![0.0; 3];
        assert_eq!(proj.generate_events(&[1], &mut input, 4), 3);
        assert_eq!(input, vec![1.0, 1.0, 0.5]);
        assert!(proj.queue().is_empty());
    }

    #[test]
    fn test_delayed_events() {
        let (a, b) = ids();
        let spec = ProjectionSpec::new(a, b)
            .with_weight(0.25)
            .with_delay(DelayInit::Steps { steps: 3 });
        let mut proj = Projection::new(spec, 1, 2, &mut SimRng::default()).unwrap();
        proj.initialize(1.0, &mut SimRng::default()).unwrap();
        assert_eq!(proj.transmission(), Transmission::Delayed);

        let mut input = vec![0.0; 2];
        proj.generate_events(&[0], &mut input, 10);
        assert_eq!(input, vec![0.0, 0.0]);
        assert_eq!(proj.queue().len(), 2);

        assert_eq!(proj.deliver_due(&mut input, 12), 0);
        assert_eq!(proj.deliver_due(&mut input, 13), 2);
        assert_eq!(input, vec![0.25, 0.25]);
    }

    #[test]
    fn test_delay_from_milliseconds() {
        let (a, b) = ids();
        let spec = ProjectionSpec::new(a, b).with_delay(DelayInit::Milliseconds { ms: 1.5 });
        let mut proj = Projection::new(spec, 2, 2, &mut SimRng::default()).unwrap();
        proj.initialize(0.5, &mut SimRng::default()).unwrap();
        assert_eq!(proj.delays().unwrap(), &[vec![3, 3], vec![3, 3]]);

        let bad = ProjectionSpec::new(a, b).with_delay(DelayInit::Milliseconds { ms: -1.0 });
        assert!(Projection::new(bad, 2, 2, &mut SimRng::default()).is_err());
        let bad = ProjectionSpec::new(a, b).with_delay(DelayInit::UniformSteps { min: 4, max: 2 });
        assert!(Projection::new(bad, 2, 2, &mut SimRng::default()).is_err());
    }

    #[test]
    fn test_uniform_delays_in_range() {
        let (a, b) = ids();
        let spec = ProjectionSpec::new(a, b).with_delay(DelayInit::UniformSteps { min: 2, max: 5 });
        let mut proj = Projection::new(spec, 10, 10, &mut SimRng::default()).unwrap();
        proj.initialize(1.0, &mut SimRng::new(4)).unwrap();
        assert!(proj.delays().unwrap().iter().flatten().all(|d| (2..=5).contains(d)));
    }

    #[test]
    fn test_set_delays_and_clear() {
        let mut proj = all_to_all(1, 2);
        assert!(proj.set_delays(vec![vec![1]]).is_err());
        proj.set_delays(vec![vec![0], vec![2]]).unwrap();
        assert_eq!(proj.transmission(), Transmission::Delayed);

        let mut input = vec![0.0; 2];
        proj.generate_events(&[0], &mut input, 0);
        proj.deliver_due(&mut input, 0);
        assert_eq!(input, vec![1.0, 0.0]);

        proj.clear_delays();
        assert_eq!(proj.transmission(), Transmission::Immediate);
        assert!(proj.queue().is_empty());
    }

    #[test]
    fn test_explicit_delays_survive_initialize() {
        let (a, b) = ids();
        let spec = ProjectionSpec::new(a, b).with_delay(DelayInit::Steps { steps: 1 });
        let mut proj = Projection::new(spec, 1, 2, &mut SimRng::default()).unwrap();
        proj.set_delays(vec![vec![4], vec![0]]).unwrap();
        assert!(proj.has_explicit_delays());

        proj.initialize(1.0, &mut SimRng::default()).unwrap();
        assert_eq!(proj.delays().unwrap(), &[vec![4], vec![0]]);

        // a new adjacency falls back to the configured delays
        let conn = Connectivity::new(1, 2, vec![0, 1], vec![vec![0], vec![0]]).unwrap();
        proj.set_connectivity(conn, 1.0, &mut SimRng::default()).unwrap();
        assert!(!proj.has_explicit_delays());
        assert_eq!(proj.delays().unwrap(), &[vec![1], vec![1]]);
    }

    #[test]
    fn test_explicit_delays_on_immediate_projection() {
        let mut proj = all_to_all(1, 2);
        proj.set_delays(vec![vec![2], vec![3]]).unwrap();
        proj.initialize(1.0, &mut SimRng::default()).unwrap();
        assert_eq!(proj.transmission(), Transmission::Delayed);
        assert_eq!(proj.delays().unwrap(), &[vec![2], vec![3]]);

        let conn = Connectivity::new(1, 2, vec![1], vec![vec![0]]).unwrap();
        proj.set_connectivity(conn, 1.0, &mut SimRng::default()).unwrap();
        assert_eq!(proj.transmission(), Transmission::Immediate);
        assert!(proj.delays().is_none());
    }

    #[test]
    fn test_set_connectivity_rebuilds_inverse() {
        let mut proj = all_to_all(3, 3);
        let conn = Connectivity::new(3, 3, vec![2], vec![vec![0, 1]]).unwrap();
        proj.set_connectivity(conn, 1.0, &mut SimRng::default()).unwrap();

        assert_eq!(proj.post_index(), &[2]);
        assert_eq!(proj.inverse().out_degree(0), 1);
        assert!(proj.inverse().lookup(2).is_empty());
        assert_eq!(proj.weights(), &[vec![1.0, 1.0]]);

        let mut input = vec![0.0; 3];
        proj.generate_events(&[0, 2], &mut input, 0);
        assert_eq!(input, vec![0.0, 0.0, 1.0]);

        let wrong = Connectivity::new(4, 3, vec![0], vec![vec![3]]).unwrap();
        assert!(proj.set_connectivity(wrong, 1.0, &mut SimRng::default()).is_err());
    }

    #[test]
    fn test_weight_accessors() {
        let mut proj = all_to_all(2, 2);
        assert!(proj.set_weights(vec![vec![1.0]]).is_err());
        proj.set_weights(vec![vec![0.1, 0.2], vec![0.3, 0.4]]).unwrap();
        assert_eq!(proj.weight(1, 0), Some(0.3));
        assert_eq!(proj.weight(5, 0), None);
        assert_eq!(proj.synapse_weight(0, 1), Some(0.2));
        assert_eq!(proj.variable("w").unwrap()[1], vec![0.3, 0.4]);
        assert!(proj.set_synapse_weight(0, 7, 1.0).is_err());
        assert!(proj.variable("trace").is_none());
    }

    #[test]
    fn test_aux_variables() {
        let (a, b) = ids();
        let model = RuleSynapse::new(
            "tagged",
            vec![StateVar::new("x", 1.0), StateVar::new("y", 2.0)],
        );
        let spec = ProjectionSpec::new(a, b).with_model(model);
        let mut proj = Projection::new(spec, 2, 1, &mut SimRng::default()).unwrap();
        proj.initialize(1.0, &mut SimRng::default()).unwrap();

        assert_eq!(proj.variable_names(), vec!["x", "y"]);
        assert_eq!(proj.variable("y").unwrap(), vec![vec![2.0, 2.0]]);
        proj.set_variable("x", vec![vec![5.0, 6.0]]).unwrap();
        assert_eq!(proj.variable("x").unwrap(), vec![vec![5.0, 6.0]]);
        assert_eq!(proj.variable("y").unwrap(), vec![vec![2.0, 2.0]]);
        assert!(proj.set_variable("z", vec![vec![0.0, 0.0]]).is_err());

        let clash = RuleSynapse::new("clash", vec![StateVar::new("w", 0.0)]);
        let spec = ProjectionSpec::new(a, b).with_model(clash);
        assert!(Projection::new(spec, 2, 1, &mut SimRng::default()).is_err());
    }

    #[test]
    fn test_plasticity_sees_snapshot_per_edge() {
        let (a, b) = ids();
        // w += x, x += 1, both from the pre-update value of x
        let model = RuleSynapse::new("accumulate", vec![StateVar::new("x", 1.0)])
            .on_deltas(|edge, d| {
                d[0] = edge.vars[0];
                d[1] = 1.0;
            });
        let spec = ProjectionSpec::new(a, b).with_model(model).with_weight(0.0);
        let mut proj = Projection::new(spec, 2, 2, &mut SimRng::default()).unwrap();
        proj.initialize(1.0, &mut SimRng::default()).unwrap();

        let neuron = || RuleNeuron::new("n", vec![StateVar::new("v", 0.0)]);
        let pre = Population::new("pre", 2, neuron()).unwrap();
        let post = Population::new("post", 2, neuron()).unwrap();
        let ctx = StepContext::new(0, 1.0);

        proj.update_plasticity(&pre, &post, &ctx);
        proj.update_plasticity(&pre, &post, &ctx);
        assert_eq!(proj.weights(), &[vec![3.0, 3.0], vec![3.0, 3.0]]);
        assert_eq!(proj.variable("x").unwrap(), vec![vec![3.0, 3.0], vec![3.0, 3.0]]);
    }

    #[test]
    fn test_plasticity_reads_unit_state() {
        let (a, b) = ids();
        let model = RuleSynapse::new("hebb", Vec::new()).on_deltas(|edge, d| {
            d[0] = edge.pre.state[0] * edge.post.state[0];
        });
        let spec = ProjectionSpec::new(a, b)
            .with_model(model)
            .with_weight(0.0)
            .with_pattern(FnPattern::new("diag", |pre, post, _: &mut SimRng| pre == post));
        let mut proj = Projection::new(spec, 3, 3, &mut SimRng::default()).unwrap();
        proj.initialize(1.0, &mut SimRng::default()).unwrap();

        let neuron = || RuleNeuron::new("n", vec![StateVar::new("v", 0.0)]);
        let mut pre = Population::new("pre", 3, neuron()).unwrap();
        let mut post = Population::new("post", 3, neuron()).unwrap();
        pre.set_variable("v", &[1.0, 2.0, 3.0]).unwrap();
        post.set_variable("v", &[4.0, 5.0, 6.0]).unwrap();

        proj.update_plasticity(&pre, &post, &StepContext::new(0, 1.0));
        assert_eq!(proj.weights(), &[vec![4.0], vec![10.0], vec![18.0]]);
    }

    #[test]
    fn test_shared_variables() {
        let (a, b) = ids();
        let model = RuleSynapse::new("scaled", Vec::new())
            .with_shared(vec![StateVar::new("eta", 0.5)])
            .on_deltas(|edge, d| d[0] = edge.ctx.shared[0]);
        let spec = ProjectionSpec::new(a, b).with_model(model).with_weight(0.0);
        let mut proj = Projection::new(spec, 1, 2, &mut SimRng::default()).unwrap();
        proj.initialize(1.0, &mut SimRng::default()).unwrap();

        assert_eq!(proj.shared_names(), vec!["eta"]);
        assert_eq!(proj.shared("eta"), Some(0.5));
        assert!(proj.variable("eta").is_none());

        let neuron = || RuleNeuron::new("n", vec![StateVar::new("v", 0.0)]);
        let pre = Population::new("pre", 1, neuron()).unwrap();
        let post = Population::new("post", 2, neuron()).unwrap();
        proj.update_plasticity(&pre, &post, &StepContext::new(0, 1.0));
        proj.set_shared("eta", 2.0).unwrap();
        proj.update_plasticity(&pre, &post, &StepContext::new(1, 1.0));
        assert_eq!(proj.weights(), &[vec![2.5], vec![2.5]]);
        assert_eq!(proj.shared_values(), &[2.0]);
        assert!(proj.set_shared("lr", 1.0).is_err());

        proj.initialize(1.0, &mut SimRng::default()).unwrap();
        assert_eq!(proj.shared("eta"), Some(0.5));

        let clash = RuleSynapse::new("clash", vec![StateVar::new("x", 0.0)])
            .with_shared(vec![StateVar::new("x", 1.0)]);
        let spec = ProjectionSpec::new(a, b).with_model(clash);
        assert!(Projection::new(spec, 1, 1, &mut SimRng::default()).is_err());
        let weight = RuleSynapse::new("w", Vec::new()).with_shared(vec![StateVar::new("w", 1.0)]);
        let spec = ProjectionSpec::new(a, b).with_model(weight);
        assert!(Projection::new(spec, 1, 1, &mut SimRng::default()).is_err());
    }

    #[test]
    fn test_static_projection_skips_plasticity() {
        let mut proj = all_to_all(2, 2);
        let neuron = || RuleNeuron::new("n", vec![StateVar::new("v", 0.0)]);
        let pre = Population::new("pre", 2, neuron()).unwrap();
        proj.update_plasticity(&pre, &pre, &StepContext::new(0, 1.0));
        assert_eq!(proj.weights(), &[vec![1.0, 1.0], vec![1.0, 1.0]]);
    }
}
