//! `csnn run`

use clap::Args;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::ExperimentConfig;
use crate::error::{CliError, CliResult};
use crate::report::RunReport;

/// Run an experiment
#[derive(Args, Debug)]
pub struct RunCommand {
    /// Experiment file (TOML)
    pub experiment: PathBuf,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Override the number of steps
    #[arg(long)]
    pub steps: Option<u64>,

    /// Override the random seed
    #[arg(long, env = "CSNN_SEED")]
    pub seed: Option<u64>,

    /// Include every recorded spike in the report
    #[arg(long)]
    pub spikes: bool,

    /// Time each step
    #[arg(long)]
    pub perf: bool,
}

impl RunCommand {
    pub fn execute(self) -> CliResult<()> {
        let mut config = ExperimentConfig::load_from_file(&self.experiment)?;
        if let Some(steps) = self.steps {
            config.simulation.steps = steps;
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = seed;
        }
        if self.spikes && !config.simulation.record_spikes {
            return Err(CliError::invalid_args(
                "--spikes needs record_spikes = true in the experiment",
            ));
        }

        if self.perf {
            config.simulation.perf = true;
        }

        let mut experiment = config.build()?;
        debug!(
            "{} populations, {} projections, {} stimuli",
            config.populations.len(),
            config.projections.len(),
            config.stimuli.len()
        );

        info!(
            "Running {} for {} steps (dt = {} ms, seed = {})",
            self.experiment.display(),
            config.simulation.steps,
            config.simulation.dt,
            experiment.seed
        );

        let result = experiment.simulation.run()?;
        let report = RunReport::new(
            experiment.simulation.network(),
            &result,
            experiment.seed,
            self.spikes,
        );
        info!(
            "Finished: {} spikes over {} steps",
            report.total_spikes, report.steps
        );

        let json = serde_json::to_string_pretty(&report)?;
        match &self.output {
            Some(path) => {
                std::fs::write(path, json)?;
                info!("Report written to {}", path.display());
            }
            None => println!("{}", json),
        }
        Ok(())
    }
}
