// CLI argument parsing and definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "devspace")]
#[command(about = "Inspect workspace provisioning requests before running them")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a provisioning configuration file (defaults to ~/.devspace/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Check that a provisioning request and the configuration are valid
    Validate {
        /// Provisioning request file (YAML or JSON)
        request: PathBuf,
    },
    /// Show what a provisioning request would do, without contacting any server
    Plan {
        /// Provisioning request file (YAML or JSON)
        request: PathBuf,

        /// Projects root used to expand command paths when the workspace does not report one
        #[arg(long)]
        projects_root: Option<String>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
}
