use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use periodic_backup_core::{LocationConfig, PeriodicBackupError, Result};

use super::{
    local_file_name, sort_by_timestamp, DeleteReport, ItemFailure, RetrieveReport, StoreOutcome,
};
use crate::backup_object::{is_manifest, BackupObject};

/// Backups kept in a directory on a locally mounted filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDirectory {
    path: PathBuf,
    enabled: bool,
}

impl LocalDirectory {
    pub fn new(path: PathBuf, enabled: bool) -> Self {
        Self { path, enabled }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn config(&self) -> LocationConfig {
        LocationConfig::LocalDirectory {
            path: self.path.clone(),
            enabled: self.enabled,
        }
    }

    async fn file_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn list_available_backups(&self) -> Result<Vec<BackupObject>> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        if !self.path.is_dir() {
            warn!("Backup directory {} does not exist", self.path.display());
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for name in self.file_names().await?.into_iter().filter(|n| is_manifest(n)) {
            match BackupObject::read_manifest(&self.path.join(&name)).await {
                Ok(backup) => backups.push(backup),
                Err(e) => warn!("Skipping manifest {} in {}: {}", name, self.path.display(), e),
            }
        }

        sort_by_timestamp(&mut backups);
        Ok(backups)
    }

    pub async fn store(&self, archives: &[PathBuf], manifest: &Path) -> Result<StoreOutcome> {
        if !self.enabled || !self.path.is_dir() {
            let reason = format!(
                "skipping location {} since it is disabled or it does not exist",
                self.path.display()
            );
            warn!("{}", reason);
            return Ok(StoreOutcome::Skipped { reason });
        }

        let mut files = Vec::with_capacity(archives.len() + 1);
        // Manifest last: its presence marks the backup as complete.
        for source in archives.iter().map(PathBuf::as_path).chain(std::iter::once(manifest)) {
            let name = source
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    PeriodicBackupError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("{} has no file name", source.display()),
                    ))
                })?;
            let destination = self.path.join(name);
            fs::copy(source, &destination).await?;
            info!("{} copied to {}", name, destination.display());
            files.push(name.to_string());
        }

        Ok(StoreOutcome::Stored { files })
    }

    pub async fn retrieve(&self, backup: &BackupObject, dest_dir: &Path) -> Result<RetrieveReport> {
        let mut report = RetrieveReport::default();
        if !self.enabled {
            return Ok(report);
        }

        fs::create_dir_all(dest_dir).await?;
        for name in self.file_names().await? {
            if !backup.owns_archive(&name) {
                continue;
            }
            let Some(local_name) = local_file_name(&name) else {
                continue;
            };
            let destination = dest_dir.join(local_name);
            match fs::copy(self.path.join(&name), &destination).await {
                Ok(_) => report.files.push(destination),
                Err(e) => {
                    warn!("Failed to retrieve {} from {}: {}", name, self.path.display(), e);
                    report.failures.push(ItemFailure::new(name, e));
                }
            }
        }

        Ok(report)
    }

    pub async fn delete_backup_files(&self, backup: &BackupObject) -> Result<DeleteReport> {
        let mut report = DeleteReport::default();
        if !self.enabled {
            return Ok(report);
        }

        for name in self.file_names().await? {
            if !backup.owns_file(&name) {
                continue;
            }
            match fs::remove_file(self.path.join(&name)).await {
                Ok(()) => {
                    info!("Deleted {} from {}", name, self.path.display());
                    report.deleted.push(name);
                }
                Err(e) => {
                    warn!("Failed to delete {} from {}: {}", name, self.path.display(), e);
                    report.failures.push(ItemFailure::new(name, e));
                }
            }
        }

        Ok(report)
    }
}
