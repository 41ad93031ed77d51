use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tracing::{error, info};

mod cleanup;

use periodic_backup::logging::init_logging;
use periodic_backup::BackupScheduler;
use periodic_backup_core::schedule::describe_schedule;
use periodic_backup_core::Config;
use periodic_backup_engine::{BackupSelector, PeriodicBackup, StoreOutcome};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Defaults to `daemon`
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backup now, then apply retention
    Backup,
    /// List every backup found in the enabled locations
    List {
        /// Show archive names
        #[arg(short, long)]
        detailed: bool,
    },
    /// Restore a backup by id (backup_YYYYMMDD_HHMMSS) or hash
    Restore { selector: String },
    /// Delete a backup from every enabled location
    Delete { selector: String },
    /// Apply the retention policy
    Cleanup {
        /// Only show what would be deleted
        #[arg(long)]
        dry_run: bool,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the configuration and check that locations are reachable
    CheckConfig,
    /// Run backups on the configured cron schedule
    Daemon,
}

async fn handle_command(command: Commands, config: Config) -> Result<()> {
    let service = PeriodicBackup::from_config(config)
        .await
        .context("Failed to set up backup locations")?;

    match command {
        Commands::Backup => perform_backup(&service).await,
        Commands::List { detailed } => list_backups(&service, detailed).await,
        Commands::Restore { selector } => perform_restore(&service, &selector).await,
        Commands::Delete { selector } => perform_delete(&service, &selector).await,
        Commands::Cleanup { dry_run, force } => {
            cleanup::perform_cleanup(&service, dry_run, force).await
        }
        Commands::CheckConfig => check_config(&service).await,
        Commands::Daemon => run_daemon(service).await,
    }
}

async fn perform_backup(service: &PeriodicBackup) -> Result<()> {
    let report = service.backup_now().await?;

    println!("{} {}", "Backup".bright_blue().bold(), report.backup.id().bright_green());
    for location in &report.locations {
        match &location.outcome {
            Ok(StoreOutcome::Stored { files }) => {
                println!(
                    "   {} {} ({} files)",
                    "✓".bright_green(),
                    location.location,
                    files.len()
                )
            }
            Ok(StoreOutcome::Skipped { reason }) => {
                println!("   {} {} - {}", "-".bright_yellow(), location.location, reason)
            }
            Err(e) => println!("   {} {} - {}", "✗".bright_red(), location.location, e),
        }
    }

    if !report.is_success() {
        anyhow::bail!("Backup {} was not stored in any location", report.backup.id());
    }
    Ok(())
}

async fn list_backups(service: &PeriodicBackup, detailed: bool) -> Result<()> {
    let backups = service.available_backups().await;
    if backups.is_empty() {
        println!("No backups found");
        return Ok(());
    }

    println!(
        "{:<24} {:<22} {:>8}  {}",
        "ID".bold(),
        "HASH".bold(),
        "ARCHIVES".bold(),
        "CREATED".bold()
    );
    for backup in &backups {
        println!(
            "{:<24} {:<22} {:>8}  {}",
            backup.id().bright_green(),
            backup.selection_hash(),
            backup.archive_file_names().len(),
            backup.timestamp().format("%Y-%m-%d %H:%M:%S UTC")
        );
        if detailed {
            for name in backup.archive_file_names() {
                println!("      {}", name.dimmed());
            }
        }
    }
    println!();
    println!("{} backup(s)", backups.len());
    Ok(())
}

async fn perform_restore(service: &PeriodicBackup, selector: &str) -> Result<()> {
    let selector: BackupSelector = selector.parse()?;
    let handle = service.restore(&selector).await?;
    println!("Restoring {}...", handle.backup_id().bright_green());

    let report = handle.wait().await?;
    for name in &report.missing {
        println!("   {} {} not found in any location", "✗".bright_red(), name);
    }
    for failure in &report.failures {
        println!("   {} {} - {}", "!".bright_yellow(), failure.item, failure.error);
    }

    if report.is_complete() {
        println!("{} Restored {} archive(s)", "✓".bright_green(), report.restored.len());
        Ok(())
    } else {
        anyhow::bail!(
            "Restored {} archive(s), {} missing",
            report.restored.len(),
            report.missing.len()
        )
    }
}

async fn perform_delete(service: &PeriodicBackup, selector: &str) -> Result<()> {
    let selector: BackupSelector = selector.parse()?;
    let reports = service.delete_backup(&selector).await?;

    let mut failures = 0;
    for (location, report) in &reports {
        println!("   {} - {} file(s) deleted", location, report.deleted.len());
        for failure in &report.failures {
            println!("      {} {} - {}", "✗".bright_red(), failure.item, failure.error);
        }
        failures += report.failures.len();
    }

    if failures > 0 {
        anyhow::bail!("{} file(s) could not be deleted", failures);
    }
    Ok(())
}

async fn check_config(service: &PeriodicBackup) -> Result<()> {
    let config = service.config();
    println!("{}", "Configuration is valid".bright_green());
    println!("   Schedule: {} ({})", config.cron, describe_schedule(&config.cron));
    println!("   Retention: {}", service.retention_policy().summarize());
    println!();

    let mut unreachable = 0;
    for status in service.check_locations().await {
        let state = match (&status.reachable, status.enabled) {
            (_, false) => "disabled".dimmed(),
            (Ok(true), true) => "reachable".bright_green(),
            (Ok(false), true) => {
                unreachable += 1;
                "does not exist".bright_red()
            }
            (Err(_), true) => {
                unreachable += 1;
                "error".bright_red()
            }
        };
        match &status.reachable {
            Err(e) if status.enabled => println!("   {} - {} ({})", status.location, state, e),
            _ => println!("   {} - {}", status.location, state),
        }
    }

    if unreachable > 0 {
        anyhow::bail!("{} enabled location(s) are not reachable", unreachable);
    }
    Ok(())
}

async fn run_daemon(service: PeriodicBackup) -> Result<()> {
    let scheduler = BackupScheduler::new(service)?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

    // Handle Ctrl+C
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
        }
    });

    info!("Daemon started at {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    scheduler.run(shutdown_rx).await?;
    info!("Shutting down gracefully");
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let config = Config::load(Some(config_path.clone()))
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    // Keep the guard alive for the duration of the program
    let _log_guard = init_logging(config.logging.directory.clone(), &config.logging.level)?;
    info!("Configuration loaded from {}", config_path.display());

    let command = cli.command.unwrap_or(Commands::Daemon);
    if let Err(e) = handle_command(command, config).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
