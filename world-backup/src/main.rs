//! World Backup - Main entry point
//!
//! Runs a single backup job, or one of its steps, against a configuration file.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use world_backup::archive;
use world_backup::executor::{retention, routing};
use world_backup::notify::LogNotifier;
use world_backup::{utils, BackupManager, Config};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Archive, upload and prune once
    Run,
    /// Prune both backup locations without taking a new backup
    Consolidate,
    /// Show where a backup taken now would be stored
    Route,
    /// Print a default configuration file
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::InitConfig = args.command {
        print!("{}", Config::default_toml()?);
        return Ok(());
    }

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::from_env()?
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!("world-backup v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Run => {
            let manager = BackupManager::with_defaults();
            let report = manager.run(&config).await;

            match &report.archive {
                Some(path) => tracing::info!("Backup written to {}", path.display()),
                None => tracing::warn!("No backup archive was written"),
            }
            if !report.consolidated() {
                tracing::warn!("Old backups were kept because the upload did not succeed");
            }
        }
        Command::Consolidate => {
            let notifier = LogNotifier;
            let primary = retention::consolidate(
                &config.backup.location,
                &config.backup.prefix,
                config.backup.max_count,
                &notifier,
            );
            let persistent = retention::consolidate(
                &config.persistent.location,
                &config.backup.prefix,
                config.persistent.max_count,
                &notifier,
            );
            tracing::info!(
                "Primary: {} of {} removed, persistent: {} of {} removed",
                primary.deleted,
                primary.candidates,
                persistent.deleted,
                persistent.candidates
            );
        }
        Command::Route => {
            let now = archive::archive_timestamp();
            let location = if routing::should_route_to_persistent(&config, now) {
                &config.persistent.location
            } else {
                &config.backup.location
            };
            println!("{}", location.display());
        }
        Command::InitConfig => unreachable!("handled before configuration is loaded"),
    }

    Ok(())
}
