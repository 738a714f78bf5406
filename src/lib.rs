//! mediadupe - background deduplication of downloaded media
//!
//! Downloaded files are fingerprinted (a perceptual difference hash for still
//! images, BLAKE3 for everything else), matched against earlier files through
//! partition-bucketed lookup, and near-duplicates are folded into the largest
//! copy. Every source link keeps resolving to a surviving file.

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod progress;
pub mod signal;
pub mod storage;
pub mod store;
pub mod sweep;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::cli::{Cli, Commands, HashArgs, SweepArgs};
use crate::config::Config;
use crate::error::ExitCode;
use crate::fingerprint::FingerprintEngine;
use crate::progress::{Progress, StatusSpinner};
use crate::storage::LocalStorage;
use crate::store::{RecordStore, StoreLock};
use crate::sweep::Sweeper;

/// How often `run` refreshes its status line.
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run the application with parsed arguments.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    let quiet = cli.quiet;

    let mut config =
        Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(base_dir) = cli.base_dir {
        config.base_dir = base_dir;
    }
    if let Some(database) = cli.database {
        config.database = Some(database);
    }

    match cli.command {
        Commands::Run(args) => {
            if let Some(interval) = args.interval {
                config.idle_interval_secs = interval;
                config.validate()?;
            }
            run_worker(&config, quiet, args.accessible)
        }
        Commands::Sweep(args) => sweep_foreground(&config, quiet, &args),
        Commands::Prune => prune_orphans(&config, quiet),
        Commands::Stats(args) => print_stats(&config, args.json),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(ExitCode::Success)
        }
        Commands::Hash(args) => hash_files(&config, &args),
    }
}

fn open_store(config: &Config) -> Result<(RecordStore, StoreLock)> {
    let db = config.database_path();
    let store = RecordStore::open(&db)
        .with_context(|| format!("Failed to open record store {}", db.display()))?;
    let lock = StoreLock::for_database(&db)?;
    log::debug!("Record store: {}", db.display());
    Ok((store, lock))
}

fn open_sweeper(config: &Config) -> Result<Sweeper> {
    let (store, lock) = open_store(config)?;
    Ok(Sweeper::new(store, lock, LocalStorage::new(&config.base_dir))
        .with_options(config.sweep_options()))
}

/// Run the background worker until Ctrl+C, then wait for its final pass.
fn run_worker(config: &Config, quiet: bool, accessible: bool) -> Result<ExitCode> {
    let stop = signal::install_handler()?;
    let handle = open_sweeper(config)?.with_stop_signal(stop.clone()).spawn()?;
    log::info!(
        "Watching {} (Ctrl+C to finish)",
        config.base_dir.display()
    );

    let spinner = StatusSpinner::new(quiet, accessible);
    while !handle.is_finished() {
        spinner.update(&handle.status());
        thread::sleep(STATUS_POLL_INTERVAL);
    }

    let status = handle.status();
    spinner.finish(&status);
    handle.join().context("Sweep worker failed")?;

    if let Some(report) = status.last_report {
        log::info!("Final pass: {}", report);
    }
    Ok(if stop.is_raised() {
        ExitCode::Interrupted
    } else {
        ExitCode::Success
    })
}

fn sweep_foreground(config: &Config, quiet: bool, args: &SweepArgs) -> Result<ExitCode> {
    let json = args.json;
    let progress = Arc::new(Progress::with_accessible(quiet || json, args.accessible));
    let mut sweeper = open_sweeper(config)?.with_progress(progress);
    let report = sweeper.sweep_once(false)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        println!(
            "Pass started {}: {}",
            report.started_at.format("%Y-%m-%d %H:%M:%S"),
            report
        );
    }

    Ok(if report.files_pending == 0 && report.orphans_pruned == 0 {
        ExitCode::NothingToDo
    } else {
        ExitCode::Success
    })
}

fn prune_orphans(config: &Config, quiet: bool) -> Result<ExitCode> {
    let (mut store, lock) = open_store(config)?;
    let pruned = sweep::prune(&mut store, &lock)?;
    if !quiet {
        println!("Pruned {pruned} orphaned file record(s)");
    }
    Ok(if pruned == 0 {
        ExitCode::NothingToDo
    } else {
        ExitCode::Success
    })
}

fn print_stats(config: &Config, json: bool) -> Result<ExitCode> {
    let (store, _lock) = open_store(config)?;
    let stats = store.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Files:         {}", stats.files);
        println!("Downloaded:    {}", stats.downloaded);
        println!("Fingerprinted: {}", stats.fingerprinted);
        println!("Pending:       {}", stats.pending);
        println!("Orphans:       {}", stats.orphans);
    }
    Ok(ExitCode::Success)
}

fn hash_files(config: &Config, args: &HashArgs) -> Result<ExitCode> {
    let engine = FingerprintEngine::new(config.hash_size, config.chunk_size);
    let mut failed = 0usize;

    for path in &args.paths {
        match engine.best_fingerprint(path) {
            Ok(fingerprint) => println!("{}  {}", fingerprint, path.display()),
            Err(e) => {
                log::error!("{}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} file(s) could not be fingerprinted", failed, args.paths.len());
    }
    Ok(ExitCode::Success)
}
