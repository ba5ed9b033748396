//! csnn CLI crate
//!
//! Loads a TOML experiment (populations, projections, stimuli and probes),
//! builds the corresponding [`csnn_runtime::Network`] and either runs it and
//! writes a JSON [`report::RunReport`] (`csnn run`) or describes the built
//! network (`csnn inspect`).
//!
//! The binary (src/main.rs) wires up logging and argument parsing and calls
//! [`CsnnCli::execute`]. The library surface exists so tests and other tools
//! can load experiments without spawning a process.

pub mod commands;
pub mod config;
pub mod error;
pub mod report;

pub use commands::CsnnCli;
pub use config::ExperimentConfig;
