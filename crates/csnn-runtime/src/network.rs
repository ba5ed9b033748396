//! Network: owns populations and projections and drives the step loop

use crate::{
    connectivity::Connectivity,
    error::*,
    population::Population,
    projection::{Projection, ProjectionSpec},
    rng::{SimRng, DEFAULT_SEED},
    state::{validate_layout, StateMatrix, StateVar, StepContext},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Handle to a population registered in a [`Network`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PopulationId(usize);

impl PopulationId {
    /// Wrap a registration index
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Registration index
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Handle to a projection registered in a [`Network`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProjectionId(usize);

impl ProjectionId {
    /// Wrap a registration index
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Registration index
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Network configuration parameters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NetworkConfig {
    /// Seed of the shared random stream
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { seed: DEFAULT_SEED }
    }
}

/// Lifecycle of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Structure changed since the last `initialize`
    Uninitialized,
    /// Initialized, no step taken yet
    Ready,
    /// At least one step taken
    Running,
}

/// Spiking network and its simulation clock.
///
/// Every step runs four phases, each over all components in registration
/// order:
///
/// 1. projections turn the previous step's spikes into events
/// 2. projections deliver queued events that are due
/// 3. populations update
/// 4. projections apply plasticity
///
/// Network-wide variables declared with [`declare_global`](Network::declare_global)
/// reach every rule through [`StepContext::globals`].
#[derive(Debug)]
pub struct Network {
    config: NetworkConfig,
    rng: SimRng,
    globals: StateMatrix,
    populations: Vec<Population>,
    projections: Vec<Projection>,
    time: i64,
    dt: f64,
    state: SchedulerState,
}

impl Network {
    /// Create an empty network
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            rng: SimRng::new(config.seed),
            globals: StateMatrix::new(Vec::new(), 1),
            config,
            populations: Vec::new(),
            projections: Vec::new(),
            time: 0,
            dt: 1.0,
            state: SchedulerState::Uninitialized,
        }
    }

    /// Register a population
    pub fn add_population(&mut self, population: Population) -> Result<PopulationId> {
        if self.population_by_name(population.name()).is_some() {
            return Err(RuntimeError::invalid_config(format!(
                "Population '{}' already exists",
                population.name()
            )));
        }
        let id = PopulationId(self.populations.len());
        self.populations.push(population);
        self.state = SchedulerState::Uninitialized;
        Ok(id)
    }

    /// Register a projection, building its connectivity from the shared
    /// random stream
    pub fn connect(&mut self, mut spec: ProjectionSpec) -> Result<ProjectionId> {
        let pre_size = self.population(spec.pre)?.size();
        let post_size = self.population(spec.post)?.size();
        if spec.name.is_none() {
            spec.name = Some(format!(
                "{}->{}",
                self.populations[spec.pre.0].name(),
                self.populations[spec.post.0].name()
            ));
        }

        let projection = Projection::new(spec, pre_size, post_size, &mut self.rng)?;
        log::debug!(
            "Connected '{}': {} edges",
            projection.name(),
            projection.edge_count()
        );

        let id = ProjectionId(self.projections.len());
        self.projections.push(projection);
        self.state = SchedulerState::Uninitialized;
        Ok(id)
    }

    /// Declare a network-wide variable. Returns its position in
    /// [`StepContext::globals`].
    pub fn declare_global(&mut self, var: StateVar) -> Result<usize> {
        let mut vars = self.globals.vars().to_vec();
        vars.push(var);
        validate_layout(&vars, "network")?;

        let index = vars.len() - 1;
        self.globals = StateMatrix::new(vars, 1);
        self.state = SchedulerState::Uninitialized;
        Ok(index)
    }

    /// Names of the network-wide variables in declaration order
    pub fn global_names(&self) -> Vec<&str> {
        self.globals.vars().iter().map(|v| v.name.as_str()).collect()
    }

    /// All network-wide values in declaration order
    pub fn global_values(&self) -> &[f64] {
        self.globals.row(0)
    }

    /// Value of one network-wide variable
    pub fn global(&self, name: &str) -> Option<f64> {
        self.globals.index_of(name).map(|k| self.globals.row(0)[k])
    }

    /// Set one network-wide variable; rules see it from the next step on
    pub fn set_global(&mut self, name: &str, value: f64) -> Result<()> {
        let k = self
            .globals
            .index_of(name)
            .ok_or_else(|| RuntimeError::unknown_variable(name, "network"))?;
        self.globals.row_mut(0)[k] = value;
        Ok(())
    }

    /// Replace a projection's adjacency. In an initialized network the
    /// per-edge values are re-drawn immediately.
    pub fn set_connectivity(&mut self, id: ProjectionId, connectivity: Connectivity) -> Result<()> {
        let dt = self.dt;
        let initialized = self.state != SchedulerState::Uninitialized;
        let projection = self
            .projections
            .get_mut(id.0)
            .ok_or(RuntimeError::UnknownProjection { index: id.0 })?;
        projection.replace_connectivity(connectivity)?;
        if initialized {
            projection.initialize(dt, &mut self.rng)?;
        }
        Ok(())
    }

    /// Reset the clock to 0 and every component to its initial values
    pub fn initialize(&mut self, dt: f64) -> Result<()> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(RuntimeError::invalid_parameter("dt", dt.to_string(), "> 0.0"));
        }

        self.dt = dt;
        self.time = 0;
        self.globals.initialize(&mut self.rng);
        for population in &mut self.populations {
            population.initialize(dt, &mut self.rng)?;
        }
        for projection in &mut self.projections {
            projection.initialize(dt, &mut self.rng)?;
        }
        self.state = SchedulerState::Ready;

        log::info!(
            "Initialized network: {} populations, {} projections, {} edges, dt={}ms",
            self.populations.len(),
            self.projections.len(),
            self.edge_count(),
            dt
        );
        Ok(())
    }

    /// Advance the network by one step
    pub fn step(&mut self) -> Result<()> {
        if self.state == SchedulerState::Uninitialized {
            return Err(RuntimeError::NotInitialized);
        }
        let t = self.time;

        for projection in &mut self.projections {
            let (spiked, input) =
                spikes_and_input(&mut self.populations, projection.pre().0, projection.post().0);
            projection.generate_events(spiked, input, t);
        }

        for projection in &mut self.projections {
            let input = self.populations[projection.post().0].input_mut();
            projection.deliver_due(input, t);
        }

        let ctx = StepContext::new(t, self.dt).with_globals(self.globals.row(0));
        for population in &mut self.populations {
            population.update(&ctx);
        }

        for projection in &mut self.projections {
            let pre = &self.populations[projection.pre().0];
            let post = &self.populations[projection.post().0];
            projection.update_plasticity(pre, post, &ctx);
        }

        self.time += 1;
        self.state = SchedulerState::Running;
        Ok(())
    }

    /// Run `steps` steps
    pub fn run(&mut self, steps: u64) -> Result<()> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    /// Current step
    pub fn time(&self) -> i64 {
        self.time
    }

    /// Move the clock. Pending delayed events keep their delivery steps.
    pub fn set_time(&mut self, t: i64) {
        self.time = t;
    }

    /// Step size in milliseconds
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Lifecycle state
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Configuration
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Population by id
    pub fn population(&self, id: PopulationId) -> Result<&Population> {
        self.populations
            .get(id.0)
            .ok_or(RuntimeError::UnknownPopulation { index: id.0 })
    }

    /// Mutable population by id
    pub fn population_mut(&mut self, id: PopulationId) -> Result<&mut Population> {
        self.populations
            .get_mut(id.0)
            .ok_or(RuntimeError::UnknownPopulation { index: id.0 })
    }

    /// Look a population up by name
    pub fn population_by_name(&self, name: &str) -> Option<PopulationId> {
        self.populations
            .iter()
            .position(|p| p.name() == name)
            .map(PopulationId)
    }

    /// Projection by id
    pub fn projection(&self, id: ProjectionId) -> Result<&Projection> {
        self.projections
            .get(id.0)
            .ok_or(RuntimeError::UnknownProjection { index: id.0 })
    }

    /// Mutable projection by id
    pub fn projection_mut(&mut self, id: ProjectionId) -> Result<&mut Projection> {
        self.projections
            .get_mut(id.0)
            .ok_or(RuntimeError::UnknownProjection { index: id.0 })
    }

    /// Look a projection up by name
    pub fn projection_by_name(&self, name: &str) -> Option<ProjectionId> {
        self.projections
            .iter()
            .position(|p| p.name() == name)
            .map(ProjectionId)
    }

    /// All populations in registration order
    pub fn populations(&self) -> &[Population] {
        &self.populations
    }

    /// All projections in registration order
    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    /// Total number of units
    pub fn unit_count(&self) -> usize {
        self.populations.iter().map(Population::size).sum()
    }

    /// Total number of edges
    pub fn edge_count(&self) -> usize {
        self.projections.iter().map(Projection::edge_count).sum()
    }

    /// The shared random stream
    pub fn rng_mut(&mut self) -> &mut SimRng {
        &mut self.rng
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

/// Spikes of `pre` next to the input accumulator of `post`
fn spikes_and_input(
    populations: &mut [Population],
    pre: usize,
    post: usize,
) -> (&[usize], &mut [f64]) {
    if pre == post {
        return populations[pre].spikes_and_input_mut();
    }
    if pre < post {
        let (head, tail) = populations.split_at_mut(post);
        (head[pre].spiked(), tail[0].input_mut())
    } else {
        let (head, tail) = populations.split_at_mut(pre);
        (tail[0].spiked(), head[post].input_mut())
    }
}
