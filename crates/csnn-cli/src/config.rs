//! Experiment files: TOML description of a network, its stimuli and what to
//! record

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CliError, CliResult};
use csnn_runtime::{
    AllToAll, ConnectivityPattern, DelayInit, DifferenceOfGaussians, FixedProbability, FnPattern,
    Gaussian, Initializer, LifModel, LifParams, Network, NetworkConfig, Population, PopulationId,
    ProjectionSpec, SimRng, Simulation, SimulationParams, StdpModel, StdpParams, Stimulus, Target,
    DEFAULT_SEED,
};

/// Whole experiment file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Run parameters
    pub simulation: SimulationSection,
    /// Populations in registration order
    #[serde(default, rename = "population")]
    pub populations: Vec<PopulationConfig>,
    /// Projections in registration order
    #[serde(default, rename = "projection")]
    pub projections: Vec<ProjectionConfig>,
    /// External input
    #[serde(default, rename = "stimulus")]
    pub stimuli: Vec<StimulusConfig>,
}

/// `[simulation]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationSection {
    /// Step size (ms)
    pub dt: f64,
    /// Number of steps
    pub steps: u64,
    /// Seed of the shared random stream
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Probes as `"population.variable"`
    #[serde(default)]
    pub record: Vec<String>,
    /// Record individual spikes
    #[serde(default = "default_true")]
    pub record_spikes: bool,
    /// Cap on recorded spikes
    #[serde(default)]
    pub max_recorded_spikes: Option<usize>,
    /// Time each step
    #[serde(default)]
    pub perf: bool,
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_true() -> bool {
    true
}

/// Neuron model of a population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NeuronKind {
    /// Leaky integrate-and-fire
    #[default]
    Lif,
}

/// `[[population]]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PopulationConfig {
    /// Unique name
    pub name: String,
    /// Number of units
    pub size: usize,
    /// Neuron model
    #[serde(default)]
    pub model: NeuronKind,
    /// LIF parameters
    #[serde(default)]
    pub lif: LifParams,
    /// Firing-rate window (ms)
    #[serde(default)]
    pub rate_window_ms: Option<f64>,
}

/// Connectivity pattern of a projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternConfig {
    /// Every pair
    #[default]
    AllToAll,
    /// Unit `i` to unit `i`
    OneToOne,
    /// Independent draws with probability `p`
    FixedProbability {
        /// Connection probability
        p: f64,
    },
    /// Gaussian over index distance
    Gaussian {
        /// Kernel width
        sigma: f64,
    },
    /// Difference of two Gaussians
    DifferenceOfGaussians {
        /// Positive kernel width
        sigma1: f64,
        /// Subtracted kernel width
        sigma2: f64,
    },
}

impl PatternConfig {
    fn build(&self) -> CliResult<Box<dyn ConnectivityPattern>> {
        let pattern: Box<dyn ConnectivityPattern> = match *self {
            Self::AllToAll => Box::new(AllToAll),
            Self::OneToOne => Box::new(FnPattern::new("one_to_one", |pre, post, _: &mut SimRng| {
                pre == post
            })),
            Self::FixedProbability { p } => Box::new(FixedProbability::new(p)?),
            Self::Gaussian { sigma } => Box::new(Gaussian::new(sigma)?),
            Self::DifferenceOfGaussians { sigma1, sigma2 } => {
                Box::new(DifferenceOfGaussians::new(sigma1, sigma2)?)
            }
        };
        Ok(pattern)
    }
}

/// A number or an initializer table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeightConfig {
    /// Same weight everywhere
    Value(f64),
    /// Drawn per edge
    Init(Initializer),
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self::Value(1.0)
    }
}

impl From<WeightConfig> for Initializer {
    fn from(weight: WeightConfig) -> Self {
        match weight {
            WeightConfig::Value(value) => Initializer::constant(value),
            WeightConfig::Init(init) => init,
        }
    }
}

/// Synapse model of a projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlasticityKind {
    /// Fixed weights
    #[default]
    Static,
    /// Trace-based STDP
    Stdp,
}

/// `[[projection]]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectionConfig {
    /// Name; defaults to `pre->post`
    #[serde(default)]
    pub name: Option<String>,
    /// Source population
    pub pre: String,
    /// Destination population
    pub post: String,
    /// Connectivity
    #[serde(default)]
    pub pattern: PatternConfig,
    /// Initial weights
    #[serde(default)]
    pub weight: WeightConfig,
    /// Uniform delay in milliseconds
    #[serde(default)]
    pub delay_ms: Option<f64>,
    /// Uniform delay in steps
    #[serde(default)]
    pub delay_steps: Option<u32>,
    /// Synapse model
    #[serde(default)]
    pub plasticity: PlasticityKind,
    /// STDP parameters
    #[serde(default)]
    pub stdp: StdpParams,
}

impl ProjectionConfig {
    fn delay(&self) -> CliResult<DelayInit> {
        match (self.delay_ms, self.delay_steps) {
            (Some(_), Some(_)) => Err(CliError::config(format!(
                "projection {}->{}: set delay_ms or delay_steps, not both",
                self.pre, self.post
            ))),
            (Some(ms), None) => Ok(DelayInit::Milliseconds { ms }),
            (None, Some(steps)) => Ok(DelayInit::Steps { steps }),
            (None, None) => Ok(DelayInit::None),
        }
    }
}

/// `[[stimulus]]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum StimulusConfig {
    /// Constant input over a window
    Constant {
        /// Target population
        population: String,
        /// Target units (all when omitted)
        #[serde(default)]
        units: Option<Vec<usize>>,
        /// Input per step
        amplitude: f64,
        /// First step
        #[serde(default)]
        start: i64,
        /// Number of steps (to the end when omitted)
        #[serde(default)]
        duration: Option<i64>,
    },
    /// Poisson input
    Poisson {
        /// Target population
        population: String,
        /// Target units (all when omitted)
        #[serde(default)]
        units: Option<Vec<usize>>,
        /// Rate (Hz)
        rate: f64,
        /// Input per event
        amplitude: f64,
        /// First step
        #[serde(default)]
        start: i64,
        /// Number of steps (to the end when omitted)
        #[serde(default)]
        duration: Option<i64>,
    },
    /// Input at listed steps
    SpikeTrain {
        /// Target population
        population: String,
        /// Target units (all when omitted)
        #[serde(default)]
        units: Option<Vec<usize>>,
        /// Input per event
        amplitude: f64,
        /// Steps
        steps: Vec<i64>,
    },
}

/// A network ready to run plus the ids the report needs
#[derive(Debug)]
pub struct Experiment {
    /// Simulation with stimuli attached
    pub simulation: Simulation,
    /// Seed used
    pub seed: u64,
}

impl ExperimentConfig {
    /// Load an experiment file
    pub fn load_from_file(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read experiment file {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Parse an experiment from TOML text
    pub fn from_toml(content: &str) -> CliResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Build every population and projection, without stimuli
    pub fn build_network(&self) -> CliResult<Network> {
        let mut network = Network::new(NetworkConfig {
            seed: self.simulation.seed,
        });

        for pop in &self.populations {
            let model = match pop.model {
                NeuronKind::Lif => LifModel::new(pop.lif.clone())?,
            };
            let mut population = Population::new(pop.name.clone(), pop.size, model)?;
            if let Some(window) = pop.rate_window_ms {
                population = population.with_rate_window_ms(window)?;
            }
            network.add_population(population)?;
        }

        for proj in &self.projections {
            let pre = lookup(&network, &proj.pre)?;
            let post = lookup(&network, &proj.post)?;
            let mut spec = ProjectionSpec::new(pre, post)
                .with_boxed_pattern(proj.pattern.build()?)
                .with_weight(proj.weight)
                .with_delay(proj.delay()?);
            if let Some(name) = &proj.name {
                spec = spec.with_name(name.clone());
            }
            if proj.plasticity == PlasticityKind::Stdp {
                spec = spec.with_model(StdpModel::new(proj.stdp.clone())?);
            }
            network.connect(spec)?;
        }

        Ok(network)
    }

    /// Simulation parameters, with probes resolved against `network`
    pub fn simulation_params(&self, network: &Network) -> CliResult<SimulationParams> {
        let sim = &self.simulation;
        let mut params = SimulationParams::new(sim.dt, sim.steps)?
            .with_spike_recording(sim.record_spikes)
            .with_perf(sim.perf);
        params.max_recorded_spikes = sim.max_recorded_spikes;

        for probe in &sim.record {
            let (population, variable) = probe.split_once('.').ok_or_else(|| {
                CliError::config(format!(
                    "record entry '{}' must look like population.variable",
                    probe
                ))
            })?;
            params = params.with_probe(lookup(network, population)?, variable);
        }
        Ok(params)
    }

    /// Build the network, attach stimuli and return a runnable experiment
    pub fn build(&self) -> CliResult<Experiment> {
        let network = self.build_network()?;
        let params = self.simulation_params(&network)?;
        let steps = i64::try_from(self.simulation.steps).map_err(|_| {
            CliError::config(format!("steps = {} is too large", self.simulation.steps))
        })?;

        let stimuli = self
            .stimuli
            .iter()
            .map(|stim| stim.resolve(&network, steps))
            .collect::<CliResult<Vec<_>>>()?;

        let mut simulation = Simulation::new(network, params)?;
        for stimulus in stimuli {
            simulation.add_stimulus(stimulus)?;
        }

        Ok(Experiment {
            simulation,
            seed: self.simulation.seed,
        })
    }
}

impl StimulusConfig {
    fn resolve(&self, network: &Network, steps: i64) -> CliResult<Stimulus> {
        let window = |start: i64, duration: Option<i64>| -> CliResult<i64> {
            match duration {
                Some(d) if d < 0 => Err(CliError::config(format!(
                    "stimulus duration must be >= 0, got {}",
                    d
                ))),
                Some(d) => Ok(d),
                // runs to the end of the simulation
                None => Ok(steps.saturating_sub(start).max(0)),
            }
        };
        let target = |population: &str, units: &Option<Vec<usize>>| -> CliResult<Target> {
            Ok(Target {
                population: lookup(network, population)?,
                units: units.clone(),
            })
        };
        Ok(match self {
            Self::Constant {
                population,
                units,
                amplitude,
                start,
                duration,
            } => Stimulus::Constant {
                target: target(population, units)?,
                amplitude: *amplitude,
                start: *start,
                duration: window(*start, *duration)?,
            },
            Self::Poisson {
                population,
                units,
                rate,
                amplitude,
                start,
                duration,
            } => Stimulus::Poisson {
                target: target(population, units)?,
                rate: *rate,
                amplitude: *amplitude,
                start: *start,
                duration: window(*start, *duration)?,
            },
            Self::SpikeTrain {
                population,
                units,
                amplitude,
                steps,
            } => Stimulus::SpikeTrain {
                target: target(population, units)?,
                amplitude: *amplitude,
                steps: steps.clone(),
            },
        })
    }
}

fn lookup(network: &Network, name: &str) -> CliResult<PopulationId> {
    network
        .population_by_name(name)
        .ok_or_else(|| CliError::config(format!("Unknown population '{}'", name)))
}
