//! One backup run
//!
//! `Idle -> Archiving -> Manifesting -> Distributing -> Done | Failed`.
//! Archiving and manifest construction are fatal. Distribution tries every
//! enabled location independently; the run only fails there if no location
//! ended up holding the backup.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, error, info, warn};

use periodic_backup_core::{PeriodicBackupError, Result};

use crate::archiver::Archiver;
use crate::backup_object::{file_name_base, is_manifest, BackupObject, MANIFEST_EXTENSION};
use crate::location::{Location, StoreOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Archiving,
    Manifesting,
    Distributing,
    Done,
    Failed,
}

/// Outcome of pushing a run to one location.
#[derive(Debug)]
pub struct LocationResult {
    pub location: String,
    pub outcome: std::result::Result<StoreOutcome, String>,
}

impl LocationResult {
    pub fn is_stored(&self) -> bool {
        matches!(self.outcome, Ok(StoreOutcome::Stored { .. }))
    }
}

#[derive(Debug)]
pub struct BackupReport {
    pub backup: BackupObject,
    pub state: RunState,
    pub locations: Vec<LocationResult>,
}

impl BackupReport {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Done
    }

    pub fn stored_count(&self) -> usize {
        self.locations.iter().filter(|l| l.is_stored()).count()
    }
}

pub struct BackupExecutor {
    temp_directory: PathBuf,
    archiver: Arc<dyn Archiver>,
    locations: Vec<Location>,
    state: RunState,
}

impl BackupExecutor {
    pub fn new(
        temp_directory: PathBuf,
        archiver: Arc<dyn Archiver>,
        locations: Vec<Location>,
    ) -> Self {
        Self {
            temp_directory,
            archiver,
            locations,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        debug!("Backup run {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub async fn run(&mut self) -> Result<BackupReport> {
        self.run_at(Utc::now()).await
    }

    /// Run a backup stamped with `timestamp`. At most one run per second is
    /// distinguishable; a second run in the same second overwrites the first.
    pub async fn run_at(&mut self, timestamp: DateTime<Utc>) -> Result<BackupReport> {
        let base = file_name_base(&timestamp);
        let scratch = self.temp_directory.join(&base);
        info!("Starting backup {}", base);

        fs::create_dir_all(&scratch).await.map_err(|e| {
            self.transition(RunState::Failed);
            PeriodicBackupError::Io(e)
        })?;

        let prepared = self.prepare(timestamp, &base, &scratch).await;
        let (backup, archives, manifest) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Backup {} failed: {}", base, e);
                self.transition(RunState::Failed);
                remove_scratch(&scratch).await;
                return Err(e);
            }
        };

        self.transition(RunState::Distributing);
        let locations = self.distribute(&archives, &manifest).await;
        remove_scratch(&scratch).await;

        let stored = locations.iter().filter(|l| l.is_stored()).count();
        if stored == 0 {
            error!("Backup {} was not stored in any location", base);
            self.transition(RunState::Failed);
        } else {
            info!("Backup {} stored in {} location(s)", base, stored);
            self.transition(RunState::Done);
        }

        Ok(BackupReport {
            backup,
            state: self.state,
            locations,
        })
    }

    async fn prepare(
        &mut self,
        timestamp: DateTime<Utc>,
        base: &str,
        scratch: &Path,
    ) -> Result<(BackupObject, Vec<PathBuf>, PathBuf)> {
        self.transition(RunState::Archiving);
        let archives = self.archiver.archive(base, scratch).await?;
        if archives.is_empty() {
            return Err(PeriodicBackupError::Archive(
                "Archiver produced no archives".to_string(),
            ));
        }

        self.transition(RunState::Manifesting);
        let mut names = Vec::with_capacity(archives.len());
        for archive in &archives {
            let name = archive
                .file_name()
                .and_then(|n| n.to_str())
                .filter(|n| n.starts_with(base) && !is_manifest(n))
                .ok_or_else(|| {
                    PeriodicBackupError::Manifest(format!(
                        "Archive {} is not named after {} or uses the reserved {} extension",
                        archive.display(),
                        base,
                        MANIFEST_EXTENSION
                    ))
                })?;
            names.push(name.to_string());
        }

        let backup = BackupObject::new(timestamp, names, self.archiver.id());
        let manifest = backup.write_manifest(scratch).await?;
        Ok((backup, archives, manifest))
    }

    async fn distribute(&self, archives: &[PathBuf], manifest: &Path) -> Vec<LocationResult> {
        let mut results = Vec::new();
        for location in &self.locations {
            if !location.is_enabled() {
                debug!("Location {} is disabled", location.display_name());
                continue;
            }

            let outcome = location.store(archives, manifest).await.map_err(|e| {
                warn!("Storing in {} failed: {}", location.display_name(), e);
                e.to_string()
            });
            results.push(LocationResult {
                location: location.display_name(),
                outcome,
            });
        }
        results
    }
}

async fn remove_scratch(scratch: &Path) {
    if let Err(e) = fs::remove_dir_all(scratch).await {
        warn!("Could not remove scratch directory {}: {}", scratch.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocalDirectory;
    use async_trait::async_trait;
    use chrono::TimeZone;

    #[derive(Debug)]
    struct FixedArchiver {
        count: usize,
        extension: &'static str,
    }

    impl FixedArchiver {
        fn new(count: usize) -> Self {
            Self {
                count,
                extension: ".bin",
            }
        }
    }

    #[async_trait]
    impl Archiver for FixedArchiver {
        fn id(&self) -> &str {
            "fixed"
        }

        async fn archive(&self, base: &str, scratch: &Path) -> Result<Vec<PathBuf>> {
            let mut archives = Vec::new();
            for index in 0..self.count {
                let path = scratch.join(format!("{}_{:02}{}", base, index, self.extension));
                fs::write(&path, b"data").await?;
                archives.push(path);
            }
            Ok(archives)
        }

        async fn extract(&self, _archives: &[PathBuf]) -> Result<()> {
            Ok(())
        }
    }

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 2, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_run_stores_in_enabled_locations() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("target");
        std::fs::create_dir_all(&target).unwrap();

        let locations = vec![Location::LocalDirectory(LocalDirectory::new(target.clone(), true))];
        let mut executor = BackupExecutor::new(
            root.path().join("tmp"),
            Arc::new(FixedArchiver::new(2)),
            locations,
        );

        let report = executor.run_at(timestamp()).await.unwrap();

        assert!(report.is_success());
        assert_eq!(executor.state(), RunState::Done);
        assert_eq!(report.backup.archive_file_names().len(), 2);
        assert_eq!(report.backup.file_manager_id(), "fixed");
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 3);
        assert!(!root.path().join("tmp").join(report.backup.id()).exists());
    }

    #[tokio::test]
    async fn test_no_reachable_location_fails_run() {
        let root = tempfile::tempdir().unwrap();
        let locations = vec![Location::LocalDirectory(LocalDirectory::new(
            root.path().join("missing"),
            true,
        ))];
        let mut executor = BackupExecutor::new(
            root.path().join("tmp"),
            Arc::new(FixedArchiver::new(1)),
            locations,
        );

        let report = executor.run_at(timestamp()).await.unwrap();
        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.stored_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_archive_set_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let mut executor = BackupExecutor::new(
            root.path().join("tmp"),
            Arc::new(FixedArchiver::new(0)),
            Vec::new(),
        );

        assert!(matches!(
            executor.run_at(timestamp()).await,
            Err(PeriodicBackupError::Archive(_))
        ));
        assert_eq!(executor.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn test_reserved_extension_archive_fails_before_distribution() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("target");
        std::fs::create_dir_all(&target).unwrap();

        let locations = vec![Location::LocalDirectory(LocalDirectory::new(target.clone(), true))];
        let mut executor = BackupExecutor::new(
            root.path().join("tmp"),
            Arc::new(FixedArchiver {
                count: 1,
                extension: MANIFEST_EXTENSION,
            }),
            locations,
        );

        assert!(matches!(
            executor.run_at(timestamp()).await,
            Err(PeriodicBackupError::Manifest(_))
        ));
        assert_eq!(executor.state(), RunState::Failed);
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 0);
    }
}
