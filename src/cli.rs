//! Command-line interface definitions for mediadupe.
//!
//! This module defines all CLI arguments, subcommands, and options using the clap derive API.
//! Global options (verbosity, config location, storage paths) apply to every
//! subcommand.
//!
//! # Example
//!
//! ```bash
//! # Run the background sweeper until Ctrl+C
//! mediadupe --base-dir /srv/media run
//!
//! # One foreground pass, machine-readable report
//! mediadupe --base-dir /srv/media sweep --json
//!
//! # Inspect what a file would be fingerprinted as
//! mediadupe hash ~/Pictures/cat.jpg
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Background deduplication of downloaded media.
///
/// mediadupe fingerprints downloaded files (perceptual hash for still images,
/// BLAKE3 for everything else), merges near-duplicates into the largest copy
/// and prunes records nothing refers to.
#[derive(Debug, Parser)]
#[command(name = "mediadupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Configuration file (default: platform config dir)
    #[arg(long, value_name = "PATH", global = true, env = "MEDIADUPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory stored object paths are relative to
    #[arg(long, value_name = "DIR", global = true)]
    pub base_dir: Option<PathBuf>,

    /// SQLite record store (default: <base-dir>/mediadupe.db)
    #[arg(long, value_name = "PATH", global = true)]
    pub database: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for mediadupe.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the sweeper until interrupted, then finish with one final pass
    Run(RunArgs),
    /// Run a single pass in the foreground
    Sweep(SweepArgs),
    /// Delete file records with no sources left
    Prune,
    /// Show record store counts
    Stats(StatsArgs),
    /// Print the effective configuration as TOML
    Config,
    /// Print the fingerprint of local files
    Hash(HashArgs),
}

/// Arguments for the run subcommand.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Seconds to wait between passes (overrides config)
    #[arg(long, value_name = "SECS")]
    pub interval: Option<f64>,

    /// Use plain text status output without animation
    #[arg(long)]
    pub accessible: bool,
}

/// Arguments for the sweep subcommand.
#[derive(Debug, Args)]
pub struct SweepArgs {
    /// Print the pass report as JSON
    #[arg(long)]
    pub json: bool,

    /// Use a plain progress bar without colours
    #[arg(long)]
    pub accessible: bool,
}

/// Arguments for the stats subcommand.
#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Print the counts as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the hash subcommand.
#[derive(Debug, Args)]
pub struct HashArgs {
    /// Files to fingerprint
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,
}
