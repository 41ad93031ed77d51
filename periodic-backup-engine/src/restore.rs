//! Restoring one backup
//!
//! Every enabled location is asked for the archives of the selected backup.
//! Each location retrieves into its own staging directory; the first copy of
//! each archive wins. Missing archives are reported, and whatever was found
//! is extracted in manifest order.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use periodic_backup_core::{PeriodicBackupError, Result};

use crate::archiver::Archiver;
use crate::backup_object::BackupObject;
use crate::location::{ItemFailure, Location};

#[derive(Debug, Default)]
pub struct RestoreReport {
    pub backup_id: String,
    /// Archive names that were found and extracted
    pub restored: Vec<String>,
    /// Archive names listed in the manifest but found nowhere
    pub missing: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

pub struct RestoreExecutor {
    backup: BackupObject,
    temp_directory: PathBuf,
    locations: Vec<Location>,
    archiver: Arc<dyn Archiver>,
}

impl RestoreExecutor {
    pub fn new(
        backup: BackupObject,
        temp_directory: PathBuf,
        locations: Vec<Location>,
        archiver: Arc<dyn Archiver>,
    ) -> Self {
        Self {
            backup,
            temp_directory,
            locations,
            archiver,
        }
    }

    fn staging_root(&self) -> PathBuf {
        self.temp_directory
            .join(format!("restore_{}", self.backup.file_name_base()))
    }

    pub async fn run(self) -> Result<RestoreReport> {
        let staging = self.staging_root();
        let result = self.restore_into(&staging).await;
        if let Err(e) = fs::remove_dir_all(&staging).await {
            warn!("Could not remove restore staging {}: {}", staging.display(), e);
        }
        result
    }

    async fn restore_into(&self, staging: &std::path::Path) -> Result<RestoreReport> {
        let backup_id = self.backup.id();
        info!("Restoring backup {}", backup_id);

        let mut report = RestoreReport {
            backup_id: backup_id.clone(),
            ..Default::default()
        };
        let mut found: BTreeMap<String, PathBuf> = BTreeMap::new();

        for (index, location) in self.locations.iter().enumerate() {
            if !location.is_enabled() {
                continue;
            }
            let dest = staging.join(index.to_string());
            match location.retrieve(&self.backup, &dest).await {
                Ok(retrieved) => {
                    report.failures.extend(retrieved.failures);
                    for path in retrieved.files {
                        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                            continue;
                        };
                        found.entry(name.to_string()).or_insert(path.clone());
                    }
                }
                Err(e) => {
                    warn!(
                        "Retrieving {} from {} failed: {}",
                        backup_id,
                        location.display_name(),
                        e
                    );
                    report.failures.push(ItemFailure::new(location.display_name(), e));
                }
            }
        }

        if found.is_empty() {
            error!("No archives of backup {} could be retrieved", backup_id);
            return Err(PeriodicBackupError::NotFound(format!(
                "No archives of backup {} found in any location",
                backup_id
            )));
        }

        let mut archives = Vec::new();
        for name in self.backup.archive_file_names() {
            match found.get(name) {
                Some(path) => {
                    archives.push(path.clone());
                    report.restored.push(name.clone());
                }
                None => {
                    warn!("Archive {} of backup {} was not found", name, backup_id);
                    report.missing.push(name.clone());
                }
            }
        }

        self.archiver.extract(&archives).await?;
        info!(
            "Restored {} of {} archive(s) of backup {}",
            report.restored.len(),
            self.backup.archive_file_names().len(),
            backup_id
        );
        Ok(report)
    }

    /// Run the restore on the runtime; the caller keeps a handle to observe it.
    pub fn spawn(self) -> RestoreHandle {
        let backup_id = self.backup.id();
        let handle = tokio::spawn(self.run());
        RestoreHandle { backup_id, handle }
    }
}

/// A restore running in the background.
#[derive(Debug)]
pub struct RestoreHandle {
    backup_id: String,
    handle: JoinHandle<Result<RestoreReport>>,
}

impl RestoreHandle {
    pub fn backup_id(&self) -> &str {
        &self.backup_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> Result<RestoreReport> {
        self.handle.await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocalDirectory;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use std::path::Path;

    #[derive(Debug, Default)]
    struct RecordingArchiver {
        extracted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Archiver for RecordingArchiver {
        fn id(&self) -> &str {
            "recording"
        }

        async fn archive(&self, _base: &str, _scratch: &Path) -> Result<Vec<PathBuf>> {
            Ok(Vec::new())
        }

        async fn extract(&self, archives: &[PathBuf]) -> Result<()> {
            let mut extracted = self.extracted.lock();
            for archive in archives {
                extracted.push(std::fs::read_to_string(archive)?);
            }
            Ok(())
        }
    }

    fn backup() -> BackupObject {
        let ts = Utc.with_ymd_and_hms(2026, 5, 6, 7, 8, 9).unwrap();
        let base = crate::backup_object::file_name_base(&ts);
        BackupObject::new(
            ts,
            vec![format!("{}_00.bin", base), format!("{}_01.bin", base)],
            "recording",
        )
    }

    #[tokio::test]
    async fn test_first_location_wins_and_gaps_are_filled() {
        let root = tempfile::tempdir().unwrap();
        let first = root.path().join("first");
        let second = root.path().join("second");
        std::fs::create_dir_all(&first).unwrap();
        std::fs::create_dir_all(&second).unwrap();

        let backup = backup();
        let names = backup.archive_file_names();
        std::fs::write(first.join(&names[0]), "first-00").unwrap();
        std::fs::write(second.join(&names[0]), "second-00").unwrap();
        std::fs::write(second.join(&names[1]), "second-01").unwrap();

        let archiver = Arc::new(RecordingArchiver::default());
        let executor = RestoreExecutor::new(
            backup,
            root.path().join("tmp"),
            vec![
                Location::LocalDirectory(LocalDirectory::new(first, true)),
                Location::LocalDirectory(LocalDirectory::new(second, true)),
            ],
            archiver.clone(),
        );

        let report = executor.spawn().wait().await.unwrap();

        assert!(report.is_complete());
        assert_eq!(*archiver.extracted.lock(), vec!["first-00", "second-01"]);
        assert!(!root.path().join("tmp").join("restore_backup_20260506_070809").exists());
    }

    #[tokio::test]
    async fn test_partial_restore_reports_missing() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("only");
        std::fs::create_dir_all(&dir).unwrap();
        let backup = backup();
        std::fs::write(dir.join(&backup.archive_file_names()[1]), "01").unwrap();

        let archiver = Arc::new(RecordingArchiver::default());
        let report = RestoreExecutor::new(
            backup.clone(),
            root.path().join("tmp"),
            vec![Location::LocalDirectory(LocalDirectory::new(dir, true))],
            archiver.clone(),
        )
        .run()
        .await
        .unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.missing, vec![backup.archive_file_names()[0].clone()]);
        assert_eq!(*archiver.extracted.lock(), vec!["01"]);
    }

    #[tokio::test]
    async fn test_nothing_found_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("empty");
        std::fs::create_dir_all(&dir).unwrap();

        let result = RestoreExecutor::new(
            backup(),
            root.path().join("tmp"),
            vec![Location::LocalDirectory(LocalDirectory::new(dir, true))],
            Arc::new(RecordingArchiver::default()),
        )
        .run()
        .await;

        assert!(matches!(result, Err(PeriodicBackupError::NotFound(_))));
    }
}
