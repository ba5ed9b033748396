//! Simulation driver: stimuli, recording and timing around the step loop

use crate::{
    error::*,
    network::{Network, PopulationId, ProjectionId, SchedulerState},
};
use std::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A state variable to sample after every step
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Probe {
    /// Population to sample
    pub population: PopulationId,
    /// Variable name
    pub variable: String,
}

/// Simulation parameters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationParams {
    /// Step size (ms)
    pub dt: f64,
    /// Number of steps to run
    pub steps: u64,
    /// Record individual spikes
    pub record_spikes: bool,
    /// Variables sampled after every step (expensive)
    pub record_variables: Vec<Probe>,
    /// Maximum spikes to record (prevents memory issues)
    pub max_recorded_spikes: Option<usize>,
    /// Enable performance sampling
    pub perf_enabled: bool,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            dt: 0.1,                              // 0.1ms timestep
            steps: 10_000,                        // 1 second
            record_spikes: true,
            record_variables: Vec::new(),
            max_recorded_spikes: Some(1_000_000), // 1M spike limit
            perf_enabled: false,
        }
    }
}

impl SimulationParams {
    /// Create new simulation parameters with validation
    pub fn new(dt: f64, steps: u64) -> Result<Self> {
        let params = Self {
            dt,
            steps,
            ..Default::default()
        };
        params.validate()?;
        Ok(params)
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(RuntimeError::invalid_parameter("dt", self.dt.to_string(), "> 0.0"));
        }
        if self.steps == 0 {
            return Err(RuntimeError::invalid_parameter(
                "steps",
                self.steps.to_string(),
                "> 0",
            ));
        }
        Ok(())
    }

    /// Enable or disable spike recording
    pub fn with_spike_recording(mut self, enabled: bool) -> Self {
        self.record_spikes = enabled;
        self
    }

    /// Sample `variable` of `population` after every step
    pub fn with_probe(mut self, population: PopulationId, variable: impl Into<String>) -> Self {
        self.record_variables.push(Probe {
            population,
            variable: variable.into(),
        });
        self
    }

    /// Set maximum spike recording limit
    pub fn with_spike_limit(mut self, limit: usize) -> Self {
        self.max_recorded_spikes = Some(limit);
        self
    }

    /// Enable or disable performance sampling
    pub fn with_perf(mut self, enabled: bool) -> Self {
        self.perf_enabled = enabled;
        self
    }

    /// Simulated duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        self.steps as f64 * self.dt
    }
}

/// Which units of a population a stimulus drives
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Target {
    /// Population
    pub population: PopulationId,
    /// Unit indices; `None` drives every unit
    pub units: Option<Vec<usize>>,
}

impl Target {
    /// Every unit of `population`
    pub fn all(population: PopulationId) -> Self {
        Self {
            population,
            units: None,
        }
    }

    /// Selected units of `population`
    pub fn units(population: PopulationId, units: Vec<usize>) -> Self {
        Self {
            population,
            units: Some(units),
        }
    }

    fn resolve(&self, size: usize) -> Vec<usize> {
        match &self.units {
            Some(units) => units.clone(),
            None => (0..size).collect(),
        }
    }
}

/// External input added to unit input accumulators before a step
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Stimulus {
    /// Constant input over a window of steps
    Constant {
        /// Driven units
        target: Target,
        /// Input per step
        amplitude: f64,
        /// First step
        start: i64,
        /// Number of steps
        duration: i64,
    },
    /// Independent Bernoulli draws per unit and step
    Poisson {
        /// Driven units
        target: Target,
        /// Mean rate (Hz)
        rate: f64,
        /// Input per event
        amplitude: f64,
        /// First step
        start: i64,
        /// Number of steps
        duration: i64,
    },
    /// Input at listed steps
    SpikeTrain {
        /// Driven units
        target: Target,
        /// Input per event
        amplitude: f64,
        /// Steps at which input is applied
        steps: Vec<i64>,
    },
}

impl Stimulus {
    fn target(&self) -> &Target {
        match self {
            Self::Constant { target, .. }
            | Self::Poisson { target, .. }
            | Self::SpikeTrain { target, .. } => target,
        }
    }

    fn window(&self) -> Option<(i64, i64)> {
        match *self {
            Self::Constant {
                start, duration, ..
            }
            | Self::Poisson {
                start, duration, ..
            } => Some((start, duration)),
            Self::SpikeTrain { .. } => None,
        }
    }

    fn active_at(start: i64, duration: i64, t: i64) -> bool {
        // elapsed beyond i64::MAX is past any window
        t >= start && t.checked_sub(start).map_or(false, |elapsed| elapsed < duration)
    }
}

/// One recorded spike
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpikeRecord {
    /// Step of the spike
    pub step: i64,
    /// Population
    pub population: PopulationId,
    /// Unit index within the population
    pub unit: usize,
}

/// Samples of one probe, one row per step
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Trace {
    /// What was sampled
    pub probe: Probe,
    /// `samples[k][i]`: unit `i` after the `k`-th step
    pub samples: Vec<Vec<f64>>,
}

/// Per-population totals
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PopulationSummary {
    /// Population name
    pub name: String,
    /// Number of units
    pub size: usize,
    /// Spikes over the whole run, recorded or not
    pub spike_count: usize,
}

/// Weights of one projection at the end of a run
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProjectionWeights {
    /// Projection
    pub projection: ProjectionId,
    /// Projection name
    pub name: String,
    /// Weights shaped like the projection's `pre_index`
    pub weights: Vec<Vec<f64>>,
}

/// Performance metrics collected during simulation steps.
/// Present when `SimulationParams::with_perf(true)` is used.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PerfReport {
    /// Average step time in nanoseconds
    pub avg_step_ns: u64,
    /// Max step time in nanoseconds
    pub max_step_ns: u64,
    /// Steps sampled
    pub steps: usize,
}

impl PerfReport {
    fn from_samples(samples: &[u64]) -> Option<Self> {
        let max = *samples.iter().max()?;
        let sum: u128 = samples.iter().map(|v| *v as u128).sum();
        Some(Self {
            avg_step_ns: (sum / samples.len() as u128) as u64,
            max_step_ns: max,
            steps: samples.len(),
        })
    }
}

/// Simulation results
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationResult {
    /// Recorded spikes in step order
    pub spikes: Vec<SpikeRecord>,
    /// Variable traces (if probed)
    pub traces: Vec<Trace>,
    /// Per-population totals, in registration order
    pub populations: Vec<PopulationSummary>,
    /// Final synaptic weights
    pub final_weights: Vec<ProjectionWeights>,
    /// Step size (ms)
    pub dt: f64,
    /// Number of steps executed
    pub steps_executed: u64,
    /// Total spike count
    pub total_spikes: usize,
    /// Optional performance report
    pub perf: Option<PerfReport>,
}

impl SimulationResult {
    fn new(dt: f64) -> Self {
        Self {
            spikes: Vec::new(),
            traces: Vec::new(),
            populations: Vec::new(),
            final_weights: Vec::new(),
            dt,
            steps_executed: 0,
            total_spikes: 0,
            perf: None,
        }
    }

    /// Simulated duration in seconds
    pub fn duration_s(&self) -> f64 {
        self.steps_executed as f64 * self.dt / 1000.0
    }

    /// Recorded spikes of one population
    pub fn spikes_for(&self, population: PopulationId) -> Vec<&SpikeRecord> {
        self.spikes
            .iter()
            .filter(|spike| spike.population == population)
            .collect()
    }

    /// Firing rate of one unit from recorded spikes (Hz)
    pub fn firing_rate(&self, population: PopulationId, unit: usize) -> f64 {
        let count = self
            .spikes
            .iter()
            .filter(|spike| spike.population == population && spike.unit == unit)
            .count();
        rate(count, 1, self.duration_s())
    }

    /// Mean firing rate over all units of a population (Hz)
    pub fn mean_firing_rate(&self, population: PopulationId) -> f64 {
        self.populations
            .get(population.index())
            .map_or(0.0, |p| rate(p.spike_count, p.size, self.duration_s()))
    }

    /// Trace of a probe, if it was recorded
    pub fn trace(&self, population: PopulationId, variable: &str) -> Option<&Trace> {
        self.traces
            .iter()
            .find(|t| t.probe.population == population && t.probe.variable == variable)
    }

    /// Export spikes to simple format (step, population index, unit)
    pub fn export_spikes(&self) -> Vec<(i64, usize, usize)> {
        self.spikes
            .iter()
            .map(|spike| (spike.step, spike.population.index(), spike.unit))
            .collect()
    }
}

fn rate(count: usize, units: usize, duration_s: f64) -> f64 {
    if units == 0 || duration_s <= 0.0 {
        return 0.0;
    }
    count as f64 / units as f64 / duration_s
}

/// Runs a network under stimuli and records what happens
#[derive(Debug)]
pub struct Simulation {
    network: Network,
    params: SimulationParams,
    stimuli: Vec<Stimulus>,
    perf_samples: Vec<u64>,
}

impl Simulation {
    /// Create a simulation. Probes must name existing variables.
    pub fn new(network: Network, params: SimulationParams) -> Result<Self> {
        params.validate()?;
        for probe in &params.record_variables {
            let population = network.population(probe.population)?;
            if population.var_index(&probe.variable).is_none() {
                return Err(RuntimeError::unknown_variable(
                    probe.variable.clone(),
                    population.name(),
                ));
            }
        }

        Ok(Self {
            network,
            params,
            stimuli: Vec::new(),
            perf_samples: Vec::new(),
        })
    }

    /// Add an input stimulus. Targeted units must exist.
    pub fn add_stimulus(&mut self, stimulus: Stimulus) -> Result<()> {
        let target = stimulus.target();
        let population = self.network.population(target.population)?;
        if let Some(&bad) = target
            .units
            .iter()
            .flatten()
            .find(|&&u| u >= population.size())
        {
            return Err(RuntimeError::invalid_config(format!(
                "stimulus targets unit {} of '{}' (size {})",
                bad,
                population.name(),
                population.size()
            )));
        }
        if let Some((_, duration)) = stimulus.window() {
            if duration < 0 {
                return Err(RuntimeError::invalid_parameter(
                    "duration",
                    duration.to_string(),
                    ">= 0",
                ));
            }
        }
        if let Stimulus::Poisson { rate, .. } = stimulus {
            if !(rate.is_finite() && rate >= 0.0) {
                return Err(RuntimeError::invalid_parameter("rate", rate.to_string(), ">= 0.0"));
            }
        }
        self.stimuli.push(stimulus);
        Ok(())
    }

    /// Run the configured number of steps.
    ///
    /// The network is initialized first unless it is already initialized
    /// with the same `dt`, so state set by hand after `initialize` survives.
    pub fn run(&mut self) -> Result<SimulationResult> {
        log::info!(
            "Starting simulation: {}ms with {}ms timestep",
            self.params.duration_ms(),
            self.params.dt
        );

        if self.network.state() == SchedulerState::Uninitialized
            || self.network.dt() != self.params.dt
        {
            self.network.initialize(self.params.dt)?;
        }

        let mut results = SimulationResult::new(self.params.dt);
        results.traces = self
            .params
            .record_variables
            .iter()
            .map(|probe| Trace {
                probe: probe.clone(),
                samples: Vec::new(),
            })
            .collect();
        let mut spike_counts = vec![0usize; self.network.populations().len()];
        let mut limit_reached = false;
        self.perf_samples.clear();

        let num_steps = self.params.steps;
        for step in 0..num_steps {
            let step_start = Instant::now();
            let t = self.network.time();

            self.apply_stimuli(t)?;
            self.network.step()?;

            for (index, population) in self.network.populations().iter().enumerate() {
                let spiked = population.spiked();
                spike_counts[index] += spiked.len();
                if !self.params.record_spikes || limit_reached {
                    continue;
                }
                for &unit in spiked {
                    if let Some(max_spikes) = self.params.max_recorded_spikes {
                        if results.spikes.len() >= max_spikes {
                            log::warn!("Spike recording limit reached: {}", max_spikes);
                            limit_reached = true;
                            break;
                        }
                    }
                    results.spikes.push(SpikeRecord {
                        step: t,
                        population: PopulationId::new(index),
                        unit,
                    });
                }
            }

            for trace in &mut results.traces {
                let population = self.network.population(trace.probe.population)?;
                if let Some(values) = population.variable(&trace.probe.variable) {
                    trace.samples.push(values);
                }
            }

            // Capture step timing
            if self.params.perf_enabled {
                self.perf_samples.push(step_start.elapsed().as_nanos() as u64);
            }

            // Progress logging
            if step % (num_steps / 10).max(1) == 0 {
                let progress = (step as f64 / num_steps as f64) * 100.0;
                log::debug!("Simulation progress: {:.1}%", progress);
            }
        }

        results.populations = self
            .network
            .populations()
            .iter()
            .zip(&spike_counts)
            .map(|(p, &spike_count)| PopulationSummary {
                name: p.name().to_string(),
                size: p.size(),
                spike_count,
            })
            .collect();
        results.final_weights = self
            .network
            .projections()
            .iter()
            .enumerate()
            .map(|(index, p)| ProjectionWeights {
                projection: ProjectionId::new(index),
                name: p.name().to_string(),
                weights: p.weights().to_vec(),
            })
            .collect();
        results.steps_executed = num_steps;
        results.total_spikes = spike_counts.iter().sum();

        log::info!(
            "Simulation completed: {} spikes in {} steps",
            results.total_spikes,
            results.steps_executed
        );

        if self.params.perf_enabled {
            results.perf = PerfReport::from_samples(&self.perf_samples);
        }

        Ok(results)
    }

    /// Apply input stimuli at step `t`
    fn apply_stimuli(&mut self, t: i64) -> Result<()> {
        let dt = self.params.dt;
        for stimulus in &self.stimuli {
            let target = stimulus.target();
            let size = self.network.population(target.population)?.size();
            match stimulus {
                Stimulus::Constant {
                    amplitude,
                    start,
                    duration,
                    ..
                } => {
                    if Stimulus::active_at(*start, *duration, t) {
                        let population = self.network.population_mut(target.population)?;
                        for unit in target.resolve(size) {
                            population.add_input(unit, *amplitude)?;
                        }
                    }
                }
                Stimulus::Poisson {
                    rate,
                    amplitude,
                    start,
                    duration,
                    ..
                } => {
                    if Stimulus::active_at(*start, *duration, t) {
                        let p = rate * dt / 1000.0;
                        for unit in target.resolve(size) {
                            if self.network.rng_mut().bernoulli(p) {
                                self.network
                                    .population_mut(target.population)?
                                    .add_input(unit, *amplitude)?;
                            }
                        }
                    }
                }
                Stimulus::SpikeTrain {
                    amplitude, steps, ..
                } => {
                    let hits = steps.iter().filter(|&&s| s == t).count();
                    if hits > 0 {
                        let population = self.network.population_mut(target.population)?;
                        for unit in target.resolve(size) {
                            population.add_input(unit, *amplitude * hits as f64)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Get reference to network
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Get mutable reference to network
    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    /// Hand the network back
    pub fn into_network(self) -> Network {
        self.network
    }

    /// Get simulation parameters
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }
}

/// Run a fixed-step simulation of `network` without stimuli
pub fn run_fixed_step(network: Network, dt: f64, steps: u64) -> Result<SimulationResult> {
    let params = SimulationParams::new(dt, steps)?.with_spike_limit(1_000_000);
    Simulation::new(network, params)?.run()
}
