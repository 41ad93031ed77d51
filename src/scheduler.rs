//! Cron-driven backup trigger
//!
//! Sleeps until the next fire time of the configured cron expression, runs a
//! backup through the service (which also applies retention) and repeats
//! until shutdown is signalled.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{error, info, warn};

use periodic_backup_core::schedule::{
    describe_schedule, next_run, parse_cron_expression, should_run_backup,
};
use periodic_backup_engine::{BackupReport, PeriodicBackup};

pub struct BackupScheduler {
    service: PeriodicBackup,
    schedule: Schedule,
    last_run: Option<DateTime<Utc>>,
}

impl BackupScheduler {
    pub fn new(service: PeriodicBackup) -> Result<Self> {
        let schedule = parse_cron_expression(&service.config().cron)
            .context("Backup schedule is not usable")?;
        Ok(Self {
            service,
            schedule,
            last_run: None,
        })
    }

    pub fn describe(&self) -> String {
        describe_schedule(&self.service.config().cron)
    }

    pub fn next_run(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        next_run(&self.schedule, after)
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }

    /// Whether a backup is due at `now`. Without a previous run only fire
    /// times after `started` count, so starting the daemon never triggers a
    /// catch-up run.
    pub fn is_due(&self, now: DateTime<Utc>, started: DateTime<Utc>) -> bool {
        should_run_backup(&self.schedule, now, Some(self.last_run.unwrap_or(started)))
    }

    /// Run one scheduled backup. Failures are logged; the loop keeps going.
    pub async fn trigger(&mut self, now: DateTime<Utc>) -> Option<BackupReport> {
        self.last_run = Some(now);
        match self.service.backup_at(now).await {
            Ok(report) => {
                if report.is_success() {
                    info!("Scheduled backup {} completed", report.backup.id());
                } else {
                    warn!("Scheduled backup {} was not stored anywhere", report.backup.id());
                }
                Some(report)
            }
            Err(e) => {
                error!("Scheduled backup failed: {}", e);
                None
            }
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let started = Utc::now();
        info!("Backup schedule: {}", self.describe());

        loop {
            let now = Utc::now();
            let Some(next) = self.next_run(now) else {
                warn!("Backup schedule has no future runs, stopping");
                return Ok(());
            };
            info!("Next backup at {}", next.format("%Y-%m-%d %H:%M:%S UTC"));
            let wait = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = sleep(wait) => {
                    let now = Utc::now();
                    if self.is_due(now, started) {
                        self.trigger(next).await;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Scheduler stopping");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use periodic_backup_core::{Config, FileManagerConfig, LoggingConfig};
    use periodic_backup_engine::TarZstdArchiver;
    use std::path::Path;
    use std::sync::Arc;

    fn service(root: &Path, cron: &str) -> PeriodicBackup {
        let config = Config {
            temp_directory: root.join("tmp"),
            cron: cron.to_string(),
            cycle_quantity: 0,
            cycle_days: 0,
            file_manager: FileManagerConfig {
                sources: vec![root.join("data")],
                restore_targets: None,
                compression_level: 3,
            },
            locations: Vec::new(),
            logging: LoggingConfig::default(),
        };
        let archiver = Arc::new(TarZstdArchiver::from_config(&config.file_manager));
        PeriodicBackup::new(Arc::new(config), Vec::new(), archiver)
    }

    #[test]
    fn test_rejects_invalid_cron() {
        let root = tempfile::tempdir().unwrap();
        assert!(BackupScheduler::new(service(root.path(), "every day")).is_err());
    }

    #[test]
    fn test_due_only_after_start() {
        let root = tempfile::tempdir().unwrap();
        let scheduler = BackupScheduler::new(service(root.path(), "0 0 2 * * *")).unwrap();
        let started = Utc.with_ymd_and_hms(2026, 10, 18, 1, 30, 0).unwrap();

        assert!(!scheduler.is_due(started, started));
        assert!(!scheduler.is_due(Utc.with_ymd_and_hms(2026, 10, 18, 1, 59, 59).unwrap(), started));
        assert!(scheduler.is_due(Utc.with_ymd_and_hms(2026, 10, 18, 2, 0, 0).unwrap(), started));
        assert_eq!(
            scheduler.next_run(started),
            Some(Utc.with_ymd_and_hms(2026, 10, 18, 2, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_trigger_records_last_run() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("data")).unwrap();
        let mut scheduler = BackupScheduler::new(service(root.path(), "0 0 2 * * *")).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 2, 0, 0).unwrap();

        // No locations configured, so the run completes but is not stored.
        let report = scheduler.trigger(now).await.unwrap();
        assert!(!report.is_success());
        assert_eq!(scheduler.last_run(), Some(now));
        assert!(!scheduler.is_due(now, now));
    }
}
