//! Service facade
//!
//! `PeriodicBackup` owns one configuration snapshot together with the
//! locations and archiver built from it. Everything the binary exposes goes
//! through here.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info, warn};

use periodic_backup_core::{Config, Result};

use crate::archiver::{Archiver, TarZstdArchiver};
use crate::backup_object::BackupObject;
use crate::catalog::{BackupCatalog, BackupSelector};
use crate::executor::{BackupExecutor, BackupReport};
use crate::location::{DeleteReport, ItemFailure, Location};
use crate::restore::{RestoreExecutor, RestoreHandle};
use crate::retention::{RetentionManager, RetentionPolicy, RetentionReport};

/// Reachability of one configured location.
#[derive(Debug)]
pub struct LocationStatus {
    pub location: String,
    pub enabled: bool,
    pub reachable: std::result::Result<bool, String>,
}

#[derive(Debug, Clone)]
pub struct PeriodicBackup {
    config: Arc<Config>,
    locations: Vec<Location>,
    archiver: Arc<dyn Archiver>,
    retention: RetentionManager,
    message: Arc<Mutex<Option<String>>>,
}

impl PeriodicBackup {
    /// Build every configured location and the default archiver.
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let mut locations = Vec::with_capacity(config.locations.len());
        for location in &config.locations {
            locations.push(Location::connect(location).await?);
        }
        let archiver = Arc::new(TarZstdArchiver::from_config(&config.file_manager));

        Ok(Self::new(Arc::new(config), locations, archiver))
    }

    pub fn new(
        config: Arc<Config>,
        locations: Vec<Location>,
        archiver: Arc<dyn Archiver>,
    ) -> Self {
        let retention = RetentionManager::new(RetentionPolicy::from_config(&config));
        Self {
            config,
            locations,
            archiver,
            retention,
            message: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        self.retention.policy()
    }

    /// Last status message shown to operators.
    pub fn message(&self) -> Option<String> {
        self.message.lock().clone()
    }

    fn set_message(&self, message: impl Into<String>) {
        *self.message.lock() = Some(message.into());
    }

    pub async fn backup_now(&self) -> Result<BackupReport> {
        self.backup_at(Utc::now()).await
    }

    /// Run one backup and, if it was stored anywhere, a retention pass.
    pub async fn backup_at(&self, timestamp: DateTime<Utc>) -> Result<BackupReport> {
        self.set_message("Creating backup...");
        let mut executor = BackupExecutor::new(
            self.config.temp_directory.clone(),
            self.archiver.clone(),
            self.locations.clone(),
        );

        let report = match executor.run_at(timestamp).await {
            Ok(report) => report,
            Err(e) => {
                self.set_message(format!("Backup failed: {}", e));
                return Err(e);
            }
        };

        if report.is_success() {
            let retention = self.retention.apply(&self.locations, timestamp).await;
            if retention.failure_count() > 0 {
                warn!("Retention pass finished with {} failure(s)", retention.failure_count());
            }
            self.set_message(format!(
                "Backup {} finished, stored in {} location(s)",
                report.backup.id(),
                report.stored_count()
            ));
        } else {
            error!("Backup {} was not stored anywhere", report.backup.id());
            self.set_message(format!(
                "Backup {} failed: no location stored it",
                report.backup.id()
            ));
        }

        Ok(report)
    }

    pub async fn catalog(&self) -> BackupCatalog {
        BackupCatalog::collect(&self.locations).await
    }

    /// Every distinct backup across all enabled locations, oldest first.
    pub async fn available_backups(&self) -> Vec<BackupObject> {
        self.catalog().await.into_backups()
    }

    pub async fn find(&self, selector: &BackupSelector) -> Result<BackupObject> {
        self.catalog().await.find(selector).cloned()
    }

    /// Start restoring the selected backup. An unknown selector fails here,
    /// before anything is spawned.
    pub async fn restore(&self, selector: &BackupSelector) -> Result<RestoreHandle> {
        let backup = match self.find(selector).await {
            Ok(backup) => backup,
            Err(e) => {
                self.set_message(format!("Restore failed: {}", e));
                return Err(e);
            }
        };

        info!("Starting restore of backup {}", backup.id());
        self.set_message(format!("Restoring backup {}...", backup.id()));
        let executor = RestoreExecutor::new(
            backup,
            self.config.temp_directory.clone(),
            self.locations.clone(),
            self.archiver.clone(),
        );
        Ok(executor.spawn())
    }

    /// Delete the selected backup from every enabled location.
    pub async fn delete_backup(
        &self,
        selector: &BackupSelector,
    ) -> Result<Vec<(String, DeleteReport)>> {
        let backup = self.find(selector).await?;
        let mut reports = Vec::new();

        for location in self.locations.iter().filter(|l| l.is_enabled()) {
            let report = match location.delete_backup_files(&backup).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(
                        "Deleting {} from {} failed: {}",
                        backup.id(),
                        location.display_name(),
                        e
                    );
                    DeleteReport {
                        deleted: Vec::new(),
                        failures: vec![ItemFailure::new(location.display_name(), e)],
                    }
                }
            };
            reports.push((location.display_name(), report));
        }

        let failures: usize = reports.iter().map(|(_, r)| r.failures.len()).sum();
        if failures == 0 {
            self.set_message(format!("Backup {} deleted", backup.id()));
        } else {
            self.set_message(format!(
                "Backup {} deleted with {} failure(s)",
                backup.id(),
                failures
            ));
        }
        Ok(reports)
    }

    pub async fn apply_retention(&self, now: DateTime<Utc>) -> RetentionReport {
        self.retention.apply(&self.locations, now).await
    }

    /// What a retention pass at `now` would delete, per location.
    pub async fn retention_plan(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, Vec<BackupObject>)>> {
        let mut plan = Vec::new();
        for location in self.locations.iter().filter(|l| l.is_enabled()) {
            let backups = location.list_available_backups().await?;
            let doomed = self
                .retention
                .calculate_deletions(&backups, now)
                .into_iter()
                .cloned()
                .collect();
            plan.push((location.display_name(), doomed));
        }
        Ok(plan)
    }

    pub async fn check_locations(&self) -> Vec<LocationStatus> {
        let mut statuses = Vec::with_capacity(self.locations.len());
        for location in &self.locations {
            let reachable = location.is_reachable().await.map_err(|e| e.to_string());
            statuses.push(LocationStatus {
                location: location.display_name(),
                enabled: location.is_enabled(),
                reachable,
            });
        }
        statuses
    }
}
