//! Discrete-time spiking neural network engine
//!
//! A [`Network`] owns populations of units and the projections between them.
//! Every step it propagates the previous step's spikes through each
//! projection (immediately or through a per-projection delay queue), updates
//! every population, and applies plasticity. All randomness comes from one
//! explicitly seeded stream, so a run is reproducible from its seed.
//!
//! ```
//! use csnn_runtime::{LifModel, LifParams, Network, Population, ProjectionSpec};
//!
//! let mut network = Network::default();
//! let lif = || LifModel::new(LifParams::default()).unwrap();
//! let input = network.add_population(Population::new("in", 2, lif()).unwrap()).unwrap();
//! let output = network.add_population(Population::new("out", 3, lif()).unwrap()).unwrap();
//! network.connect(ProjectionSpec::new(input, output).with_weight(5.0)).unwrap();
//!
//! network.initialize(1.0).unwrap();
//! network.run(100).unwrap();
//! assert_eq!(network.time(), 100);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod connectivity;
pub mod delay;
pub mod error;
pub mod inverse;
pub mod network;
pub mod neuron;
pub mod plasticity;
pub mod population;
pub mod projection;
pub mod rng;
pub mod simulation;
pub mod state;

// Re-export essential types
pub use connectivity::{
    build_connectivity, AllToAll, Connectivity, ConnectivityPattern, DifferenceOfGaussians,
    FixedProbability, FnPattern, Gaussian,
};
pub use delay::{DelayQueue, PendingEvent};
pub use error::{Result, RuntimeError};
pub use inverse::{EdgeRef, InverseIndex};
pub use network::{Network, NetworkConfig, PopulationId, ProjectionId, SchedulerState};
pub use neuron::{LifModel, LifParams, NeuronModel, RuleNeuron};
pub use plasticity::{EdgeView, RuleSynapse, StaticSynapse, StdpModel, StdpParams, SynapseModel};
pub use population::{Population, RateWindow, NEVER_SPIKED};
pub use projection::{DelayInit, Projection, ProjectionSpec, Transmission};
pub use rng::{SimRng, DEFAULT_SEED};
pub use simulation::{
    run_fixed_step, PerfReport, PopulationSummary, Probe, ProjectionWeights, Simulation,
    SimulationParams, SimulationResult, SpikeRecord, Stimulus, Target, Trace,
};
pub use state::{Initializer, StateVar, StepContext, UnitView};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_integration() {
        // Test that all components can be imported and basic objects created
        let params = LifParams::default();
        assert!(params.tau_m > 0.0);

        let stdp_params = StdpParams::default();
        assert!(stdp_params.a_plus > 0.0);

        let sim_params = SimulationParams::default();
        assert!(sim_params.dt > 0.0);

        assert_eq!(NetworkConfig::default().seed, DEFAULT_SEED);
    }
}
