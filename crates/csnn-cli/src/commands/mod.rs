//! CLI command implementations for csnn

use clap::{Parser, Subcommand};
use crate::error::CliResult;

pub mod inspect;
pub mod run;

/// csnn - discrete-time spiking network simulator
#[derive(Parser, Debug)]
#[command(
    name = "csnn",
    version,
    about = "Discrete-time spiking neural network simulator",
    long_about = "Build a network of spiking populations and projections from a TOML \
                  experiment file, run it for a fixed number of steps and report spikes, \
                  rates and weights as JSON."
)]
pub struct CsnnCli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an experiment and write a JSON report
    #[command(alias = "sim")]
    Run(run::RunCommand),

    /// Build an experiment's network and describe it without running
    Inspect(inspect::InspectCommand),
}

impl CsnnCli {
    /// Execute the CLI command
    pub fn execute(self) -> CliResult<()> {
        match self.command {
            Commands::Run(cmd) => cmd.execute(),
            Commands::Inspect(cmd) => cmd.execute(),
        }
    }
}
