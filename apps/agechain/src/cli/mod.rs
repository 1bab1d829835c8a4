//! # agechain CLI Module
//!
//! ## Available Commands
//!
//! - `run` - Run one or more chain configurations in parallel
//! - `validate` - Check a chain configuration without solving
//! - `metrics` - Extract a per-cycle metric from a saved snapshot
//! - `parse` - Parse protocol step strings and print their structure

mod commands;

use crate::error::AppError;
use agechain_core::primitives::DISCHARGE_CAPACITY;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// agechain - battery aging chain runner
///
/// Runs repeated cycling experiments where every solve continues from the
/// previous one, and extracts per-cycle degradation metrics.
#[derive(Parser, Debug)]
#[command(name = "agechain")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Banner only for human-facing commands; `metrics` and `parse` output
    /// is meant to be piped.
    #[must_use]
    pub fn shows_banner(&self) -> bool {
        !self.quiet
            && !self.json
            && matches!(self.command, Commands::Run { .. } | Commands::Validate { .. })
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run chain configurations, one blocking task per file
    Run {
        /// Chain configuration files (TOML)
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "agechain-out")]
        output: PathBuf,

        /// Skip writing binary snapshots
        #[arg(long)]
        no_snapshot: bool,
    },

    /// Validate a chain configuration without solving
    Validate {
        /// Chain configuration file (TOML)
        config: PathBuf,
    },

    /// Extract a per-cycle metric from a snapshot
    Metrics {
        /// Snapshot file written by `run`
        snapshot: PathBuf,

        /// Role to reduce
        #[arg(short, long)]
        role: String,

        /// Series to reduce
        #[arg(short, long, default_value = DISCHARGE_CAPACITY)]
        series: String,

        /// Step index within each cycle (whole cycle when absent)
        #[arg(long)]
        step: Option<usize>,

        /// Cycle numbering (metric-role, all-roles)
        #[arg(short, long, default_value = "metric-role")]
        numbering: String,

        /// Per-cycle reduction (delta, last, mean, internal-resistance)
        #[arg(long, default_value = "delta")]
        reduction: String,

        /// Expected cycles per solve (the role's cycle count when absent)
        #[arg(short, long)]
        cycles: Option<usize>,

        /// Write CSV here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse protocol step strings
    Parse {
        /// Step strings, e.g. "Discharge at 1C until 3V"
        #[arg(required = true)]
        steps: Vec<String>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), AppError> {
    let json = cli.json;

    match cli.command {
        Commands::Run {
            configs,
            output,
            no_snapshot,
        } => cmd_run(&configs, &output, !no_snapshot, json).await,
        Commands::Validate { config } => cmd_validate(&config, json),
        Commands::Metrics {
            snapshot,
            role,
            series,
            step,
            numbering,
            reduction,
            cycles,
            output,
        } => cmd_metrics(
            &snapshot,
            MetricsArgs {
                role,
                series,
                step,
                numbering,
                reduction,
                cycles,
            },
            output.as_deref(),
            json,
        ),
        Commands::Parse { steps } => cmd_parse(&steps, json),
    }
}
