//! CLI module
//!
//! Command-line interface for running extractions.
//!
//! # Commands
//!
//! - `integrate` - Extract a source and upload its batches
//! - `check` - Test the source connection and storage access
//! - `sources` - List configured sources

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat, PolicyArg};
pub use runner::Runner;
