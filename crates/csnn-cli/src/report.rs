//! JSON summary of a finished run

use serde::{Deserialize, Serialize};

use csnn_runtime::{Network, PerfReport, PopulationId, SimulationResult};

/// Top-level report written by `csnn run`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Steps executed
    pub steps: u64,
    /// Step size (ms)
    pub dt: f64,
    /// Seed of the shared random stream
    pub seed: u64,
    /// Spikes over all populations
    pub total_spikes: usize,
    /// Per-population totals
    pub populations: Vec<PopulationReport>,
    /// Per-projection weight statistics
    pub projections: Vec<ProjectionReport>,
    /// `[step, population, unit]` triples, when spikes were requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spikes: Option<Vec<(i64, usize, usize)>>,
    /// Probed variables
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub traces: Vec<TraceReport>,
    /// Step timings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perf: Option<PerfReport>,
}

/// Totals of one population
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationReport {
    /// Name
    pub name: String,
    /// Units
    pub size: usize,
    /// Spikes over the run
    pub spike_count: usize,
    /// Mean rate per unit (Hz)
    pub mean_rate_hz: f64,
}

/// Weight statistics of one projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionReport {
    /// Name
    pub name: String,
    /// Edge count
    pub edges: usize,
    /// Mean weight (0 without edges)
    pub mean_weight: f64,
    /// Smallest weight
    pub min_weight: Option<f64>,
    /// Largest weight
    pub max_weight: Option<f64>,
}

/// Samples of one probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceReport {
    /// Population name
    pub population: String,
    /// Variable name
    pub variable: String,
    /// One row per step
    pub samples: Vec<Vec<f64>>,
}

impl RunReport {
    /// Summarize `result` using names from `network`
    pub fn new(network: &Network, result: &SimulationResult, seed: u64, with_spikes: bool) -> Self {
        let populations = result
            .populations
            .iter()
            .enumerate()
            .map(|(index, p)| PopulationReport {
                name: p.name.clone(),
                size: p.size,
                spike_count: p.spike_count,
                mean_rate_hz: result.mean_firing_rate(PopulationId::new(index)),
            })
            .collect();

        let projections = result
            .final_weights
            .iter()
            .map(|w| ProjectionReport::from_weights(&w.name, &w.weights))
            .collect();

        let traces = result
            .traces
            .iter()
            .map(|trace| TraceReport {
                population: network
                    .population(trace.probe.population)
                    .map(|p| p.name().to_string())
                    .unwrap_or_default(),
                variable: trace.probe.variable.clone(),
                samples: trace.samples.clone(),
            })
            .collect();

        Self {
            steps: result.steps_executed,
            dt: result.dt,
            seed,
            total_spikes: result.total_spikes,
            populations,
            projections,
            spikes: with_spikes.then(|| result.export_spikes()),
            traces,
            perf: result.perf.clone(),
        }
    }
}

impl ProjectionReport {
    fn from_weights(name: &str, weights: &[Vec<f64>]) -> Self {
        let all = weights.iter().flatten().copied();
        let edges = weights.iter().map(Vec::len).sum::<usize>();
        let sum: f64 = all.clone().sum();
        Self {
            name: name.to_string(),
            edges,
            mean_weight: if edges == 0 { 0.0 } else { sum / edges as f64 },
            min_weight: all.clone().reduce(f64::min),
            max_weight: all.reduce(f64::max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csnn_runtime::PopulationSummary;

    #[test]
    fn test_weight_stats() {
        let report = ProjectionReport::from_weights("a->b", &[vec![1.0, 3.0], vec![], vec![2.0]]);
        assert_eq!(report.edges, 3);
        assert_eq!(report.mean_weight, 2.0);
        assert_eq!(report.min_weight, Some(1.0));
        assert_eq!(report.max_weight, Some(3.0));

        let empty = ProjectionReport::from_weights("x", &[]);
        assert_eq!(empty.edges, 0);
        assert_eq!(empty.mean_weight, 0.0);
        assert_eq!(empty.min_weight, None);
    }

    #[test]
    fn test_population_rates_match_result() {
        let result = SimulationResult {
            spikes: Vec::new(),
            traces: Vec::new(),
            populations: vec![PopulationSummary {
                name: "exc".into(),
                size: 4,
                spike_count: 10,
            }],
            final_weights: Vec::new(),
            dt: 0.5,
            steps_executed: 1000,
            total_spikes: 10,
            perf: None,
        };
        let report = RunReport::new(&Network::default(), &result, 7, false);

        // 10 spikes over 4 units in 0.5 s
        assert_eq!(report.populations[0].mean_rate_hz, 5.0);
        assert_eq!(
            report.populations[0].mean_rate_hz,
            result.mean_firing_rate(PopulationId::new(0))
        );
        assert!(report.spikes.is_none());
        assert_eq!(report.seed, 7);
    }
}
