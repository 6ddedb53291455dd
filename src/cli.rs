//! CLI definitions for hangwatch.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// hangwatch CLI.
#[derive(Parser)]
#[command(name = "hangwatch")]
#[command(about = "Main-loop hang detection watchdog")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run a supervised loop with injected stalls and report hangs (default)
    Run {
        /// Stop after this many seconds (0 runs until Ctrl-C)
        #[arg(long)]
        duration: Option<u64>,

        /// Stall every n-th injected job (0 disables stalls)
        #[arg(long)]
        hang_every: Option<u32>,

        /// Length of an injected stall in milliseconds
        #[arg(long)]
        hang_ms: Option<u64>,

        /// Expected frame rate of the supervised loop
        #[arg(long)]
        fps: Option<f64>,

        /// Print the final metrics snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the hang threshold for a frame rate and slack ratio
    Threshold {
        /// Expected frame rate
        #[arg(long, default_value_t = 60.0)]
        fps: f64,

        /// Slack ratio
        #[arg(long, default_value_t = 1.5)]
        slack: f64,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Validate a configuration file
    Validate {
        /// File to validate (defaults to --config)
        path: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Show,
}
