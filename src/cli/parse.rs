//! CLI parse: clap types for hub-audit. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// hub-audit CLI - generate and fetch hub audit reports
#[derive(Parser)]
#[command(name = "hub-audit")]
#[command(about = "Trigger, poll and fetch audit reports from the report job API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (config/ is read from here)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Session token for the job API
    #[arg(long, env = "HUB_AUDIT_SESSION", hide_env_values = true)]
    pub session: Option<String>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate (if needed) and fetch the primary and dependent reports for a hub
    Report {
        /// Hub identifier
        #[arg(long)]
        hub: String,
        /// Last known primary job id for the hub
        #[arg(long)]
        primary_job: Option<String>,
        /// Last known dependent job id, used alongside --primary-job
        #[arg(long, requires = "primary_job")]
        dependent_job: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
        /// Print every state change while polling
        #[arg(long)]
        watch: bool,
    },
    /// Show the primary report status for a hub (single request)
    Status {
        /// Hub identifier
        #[arg(long)]
        hub: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show remaining report credits and whether generation is allowed
    Quota {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the effective configuration
    Config {
        /// Output format (toml or json)
        #[arg(long, default_value = "toml")]
        format: String,
    },
}
