#![deny(clippy::disallowed_methods)]
//! Binary entrypoint for the quarry CLI.
//!
//! Seeds the engine with the command-line targets, runs the evaluation to
//! quiescence (or timeout/interrupt), and renders monitor events as
//! human-readable lines or JSON.

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing::error;

mod events;
mod run;

#[derive(Parser, Debug)]
#[command(name = "quarry", about = "Recursive CTF evaluation engine", version)]
/// Command-line interface for the `quarry` binary.
pub struct Cli {
    /// Targets to evaluate: file paths or literal values
    #[arg(required = true, value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Optional path to the config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Flag pattern to search for (byte regex)
    #[arg(long, value_name = "REGEX")]
    pub flag_format: Option<String>,

    /// Results directory; must not already exist
    #[arg(long, value_name = "DIR")]
    pub outdir: Option<PathBuf>,

    /// Worker thread count
    #[arg(long)]
    pub threads: Option<usize>,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Maximum recursion depth
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Disable recursion on produced data and artifacts
    #[arg(long)]
    pub no_recurse: bool,

    /// Emit events as JSON lines on stdout
    #[arg(long)]
    pub json: bool,

    /// Logging controls
    #[command(flatten)]
    pub log: logging::LogArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log.spec());

    match run::run(cli) {
        Ok(code) => code,
        Err(err) => {
            error!(%err, "run failed");
            eprintln!("quarry: {}", err);
            ExitCode::from(2)
        }
    }
}
