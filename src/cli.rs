//! CLI argument parsing for Evidentia

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log line format on stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text lines (default)
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "evidentia")]
#[command(version)]
#[command(about = "Reproducible cohort evidence runs with power, fairness and provenance", long_about = None)]
pub struct Cli {
    /// Settings file (defaults to ./evidentia.toml when present)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Override the settings root directory
    #[arg(long, value_name = "DIR", global = true)]
    pub root: Option<PathBuf>,

    /// Enable TRACE-level logging on stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log format
    #[arg(long = "log-format", value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a plan, replaying the cached run when the inputs match
    Run {
        /// Plan file (YAML or JSON)
        #[arg(long, value_name = "FILE")]
        plan: PathBuf,

        /// Caller token; the same token on the same inputs returns the same run
        #[arg(long = "idempotency-key", value_name = "KEY")]
        idempotency_key: Option<String>,
    },

    /// Draft a plan from the default template
    Draft {
        /// Question recorded in the plan
        #[arg(short, long)]
        question: Option<String>,

        /// JSON or YAML object whose top-level sections replace the template's
        #[arg(long, value_name = "FILE")]
        defaults: Option<PathBuf>,
    },

    /// Write the synthetic demo dataset and its data dictionary
    Synth {
        #[arg(long, default_value = "600")]
        rows: usize,

        #[arg(long, default_value = "0")]
        seed: u64,

        /// Output directory (defaults to the configured data directory)
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Re-render the evidence card of an existing run
    Render {
        #[arg(long = "run-id", value_name = "ID")]
        run_id: String,

        /// Plan file shown on the card
        #[arg(long, value_name = "FILE")]
        plan: PathBuf,
    },
}
