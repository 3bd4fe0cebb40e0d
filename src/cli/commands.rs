//! CLI commands and argument parsing

use crate::types::ConflictPolicy;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Extract accounting and CRM data into CSV files on cloud storage
#[derive(Parser, Debug)]
#[command(name = "gaon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (JSON or YAML)
    #[arg(
        short,
        long,
        global = true,
        env = "GAON_CONFIG",
        default_value = "config.json"
    )]
    pub config: PathBuf,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract a source and upload its batches
    Integrate {
        /// Source name from the configuration
        #[arg(short, long)]
        source: String,

        /// Window start (RFC 3339); defaults to the source start time
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Window end (RFC 3339); defaults to the source end time
        #[arg(long)]
        end: Option<DateTime<Utc>>,

        /// Validate and print the planned remote paths without connecting
        #[arg(long)]
        dry_run: bool,

        /// What to do when the first batch of an object already exists remotely
        #[arg(long, default_value = "replace")]
        policy: PolicyArg,

        /// Skip reading uploads back
        #[arg(long)]
        no_verify: bool,
    },

    /// Test the connection to a source and to storage
    Check {
        /// Source name from the configuration
        #[arg(short, long)]
        source: String,
    },

    /// List configured sources
    Sources,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}

/// Conflict policy as a CLI value
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PolicyArg {
    /// Fail if the object exists
    Fail,
    /// Overwrite the object
    Replace,
    /// Append rows to the object
    Append,
}

impl From<PolicyArg> for ConflictPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Fail => ConflictPolicy::Fail,
            PolicyArg::Replace => ConflictPolicy::Replace,
            PolicyArg::Append => ConflictPolicy::Append,
        }
    }
}
