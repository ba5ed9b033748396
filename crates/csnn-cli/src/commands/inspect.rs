//! `csnn inspect`: build a network and describe it

use clap::Args;
use std::path::PathBuf;
use tracing::info;

use crate::config::ExperimentConfig;
use crate::error::CliResult;
use csnn_runtime::{Network, Projection, Transmission};

/// Describe an experiment's network
#[derive(Args, Debug)]
pub struct InspectCommand {
    /// Experiment file (TOML)
    pub experiment: PathBuf,

    /// Show per-unit degree and delay details
    #[arg(short, long)]
    pub detailed: bool,
}

impl InspectCommand {
    pub fn execute(self) -> CliResult<()> {
        info!("Inspecting {}", self.experiment.display());
        let config = ExperimentConfig::load_from_file(&self.experiment)?;
        let mut network = config.build_network()?;
        network.initialize(config.simulation.dt)?;

        print!("{}", describe(&network, self.detailed));
        Ok(())
    }
}

/// Human-readable summary of an initialized network
pub fn describe(network: &Network, detailed: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Network: {} populations, {} units, {} projections, {} edges (seed {}, dt {} ms)\n",
        network.populations().len(),
        network.unit_count(),
        network.projections().len(),
        network.edge_count(),
        network.config().seed,
        network.dt()
    ));

    out.push_str("\nPopulations:\n");
    for pop in network.populations() {
        out.push_str(&format!(
            "  {:<16} size {:>6}  model {:<8} vars [{}]\n",
            pop.name(),
            pop.size(),
            pop.model().name(),
            pop.variable_names().join(", ")
        ));
    }

    out.push_str("\nProjections:\n");
    for proj in network.projections() {
        describe_projection(&mut out, network, proj, detailed);
    }
    out
}

fn describe_projection(out: &mut String, network: &Network, proj: &Projection, detailed: bool) {
    let pre_size = network.population(proj.pre()).map(|p| p.size()).unwrap_or(0);
    let degrees: Vec<usize> = (0..pre_size).map(|s| proj.inverse().out_degree(s)).collect();
    let max_out = degrees.iter().copied().max().unwrap_or(0);
    let mean_out = if pre_size == 0 {
        0.0
    } else {
        proj.edge_count() as f64 / pre_size as f64
    };
    let transmission = match proj.transmission() {
        Transmission::Immediate => "immediate",
        Transmission::Delayed => "delayed",
    };

    out.push_str(&format!(
        "  {:<16} edges {:>8}  destinations {:>6}  out-degree mean {:.2} max {}  {}  synapse {}\n",
        proj.name(),
        proj.edge_count(),
        proj.post_index().len(),
        mean_out,
        max_out,
        transmission,
        proj.model().name()
    ));

    if !detailed {
        return;
    }
    for (i, &dest) in proj.post_index().iter().enumerate() {
        out.push_str(&format!(
            "    dest {:>5}: {} inputs\n",
            dest,
            proj.nb_synapses(i)
        ));
    }
    if let Some(delays) = proj.delays() {
        let all = delays.iter().flatten().copied();
        if let (Some(min), Some(max)) = (all.clone().min(), all.max()) {
            out.push_str(&format!("    delays: {}..={} steps\n", min, max));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_lists_everything() {
        let config = ExperimentConfig::from_toml(
            r#"
            [simulation]
            dt = 1.0
            steps = 10

            [[population]]
            name = "in"
            size = 2

            [[population]]
            name = "out"
            size = 3

            [[projection]]
            name = "feed"
            pre = "in"
            post = "out"
            delay_steps = 2
        "#,
        )
        .unwrap();
        let mut network = config.build_network().unwrap();
        network.initialize(1.0).unwrap();

        let text = describe(&network, true);
        assert!(text.contains("2 populations"));
        assert!(text.contains("6 edges"));
        assert!(text.contains("feed"));
        assert!(text.contains("delayed"));
        assert!(text.contains("delays: 2..=2 steps"));
        assert_eq!(text.matches("2 inputs").count(), 3);
    }
}
