use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use periodic_backup_core::{LocationConfig, ObjectStoreClient, PeriodicBackupError, Result};

use super::{
    local_file_name, sort_by_timestamp, DeleteReport, ItemFailure, RetrieveReport, StoreOutcome,
};
use crate::backup_object::{is_manifest, BackupObject};

/// Backups kept as objects in a single bucket.
///
/// Manifests pass through `tmp_dir` on their way to and from the bucket.
#[derive(Debug, Clone)]
pub struct ObjectStoreLocation {
    bucket: String,
    tmp_dir: PathBuf,
    enabled: bool,
    region: Option<String>,
    endpoint: Option<String>,
    client: Arc<dyn ObjectStoreClient>,
}

impl ObjectStoreLocation {
    pub fn new(
        bucket: String,
        tmp_dir: PathBuf,
        enabled: bool,
        client: Arc<dyn ObjectStoreClient>,
    ) -> Self {
        Self {
            bucket,
            tmp_dir,
            enabled,
            region: None,
            endpoint: None,
            client,
        }
    }

    pub fn with_endpoint(mut self, region: Option<String>, endpoint: Option<String>) -> Self {
        self.region = region;
        self.endpoint = endpoint;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn config(&self) -> LocationConfig {
        LocationConfig::ObjectStore {
            bucket: self.bucket.clone(),
            tmp_dir: self.tmp_dir.clone(),
            enabled: self.enabled,
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
        }
    }

    pub async fn bucket_exists(&self) -> Result<bool> {
        self.client.bucket_exists(&self.bucket).await
    }

    async fn ensure_tmp_dir(&self) -> Result<()> {
        if !self.tmp_dir.is_dir() {
            fs::create_dir_all(&self.tmp_dir).await.map_err(|e| {
                warn!("Unable to make temp directory: {}", self.tmp_dir.display());
                PeriodicBackupError::Io(e)
            })?;
        }
        Ok(())
    }

    async fn fetch_manifest(&self, key: &str) -> Result<BackupObject> {
        let name = local_file_name(key).ok_or_else(|| {
            PeriodicBackupError::Manifest(format!("Unusable manifest key {}", key))
        })?;
        let staged = self.tmp_dir.join(name);
        self.client.get_to_file(&self.bucket, key, &staged).await?;

        let parsed = BackupObject::read_manifest(&staged).await;
        if let Err(e) = fs::remove_file(&staged).await {
            debug!("Could not remove staged manifest {}: {}", staged.display(), e);
        }
        parsed
    }

    pub async fn list_available_backups(&self) -> Result<Vec<BackupObject>> {
        if !self.enabled {
            return Ok(Vec::new());
        }

        let keys = self.client.list_keys(&self.bucket).await?;
        self.ensure_tmp_dir().await?;

        let mut backups = Vec::new();
        for key in keys.iter().filter(|k| is_manifest(k)) {
            match self.fetch_manifest(key).await {
                Ok(backup) => backups.push(backup),
                Err(e) => warn!("Skipping manifest {} in bucket {}: {}", key, self.bucket, e),
            }
        }

        sort_by_timestamp(&mut backups);
        Ok(backups)
    }

    pub async fn store(&self, archives: &[PathBuf], manifest: &Path) -> Result<StoreOutcome> {
        if !self.enabled || !self.bucket_exists().await? {
            let reason = format!(
                "skipping location {} since it is disabled or it does not exist",
                self.bucket
            );
            warn!("{}", reason);
            return Ok(StoreOutcome::Skipped { reason });
        }

        let mut files = Vec::with_capacity(archives.len() + 1);
        for archive in archives {
            let name = file_name_of(archive)?;
            info!("{} copying to s3 bucket {}", name, self.bucket);
            self.client.put_file(&self.bucket, name, archive).await?;
            info!("{} copied to s3 bucket {}", name, self.bucket);
            files.push(name.to_string());
        }

        // Manifest last: its presence marks the backup as complete.
        self.ensure_tmp_dir().await?;
        let name = file_name_of(manifest)?;
        let staged = self.tmp_dir.join(name);
        fs::copy(manifest, &staged).await?;
        self.client.put_file(&self.bucket, name, &staged).await?;
        info!("{} copied to s3 bucket {}", name, self.bucket);
        files.push(name.to_string());

        Ok(StoreOutcome::Stored { files })
    }

    pub async fn retrieve(&self, backup: &BackupObject, dest_dir: &Path) -> Result<RetrieveReport> {
        let mut report = RetrieveReport::default();
        if !self.enabled {
            return Ok(report);
        }

        let keys = self.client.list_keys(&self.bucket).await?;
        fs::create_dir_all(dest_dir).await?;

        for key in keys.into_iter().filter(|k| backup.owns_archive(k)) {
            let Some(name) = local_file_name(&key) else {
                continue;
            };
            let destination = dest_dir.join(name);
            match self.client.get_to_file(&self.bucket, &key, &destination).await {
                Ok(size) => {
                    debug!("Retrieved {} ({} bytes) from bucket {}", key, size, self.bucket);
                    report.files.push(destination);
                }
                Err(e) => {
                    warn!("Failed to retrieve {} from bucket {}: {}", key, self.bucket, e);
                    report.failures.push(ItemFailure::new(key, e));
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

        info!("Deleting backup {} from bucket {}", backup.id(), self.bucket);
        let keys = self.client.list_keys(&self.bucket).await?;
        for key in keys.into_iter().filter(|k| backup.owns_file(k)) {
            match self.client.delete(&self.bucket, &key).await {
                Ok(()) => {
                    info!("Deleted {} from bucket {}", key, self.bucket);
                    report.deleted.push(key);
                }
                Err(e) => {
                    warn!("Failed to delete {} from bucket {}: {}", key, self.bucket, e);
                    report.failures.push(ItemFailure::new(key, e));
                }
            }
        }

        Ok(report)
    }
}

fn file_name_of(path: &Path) -> Result<&str> {
    path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
        PeriodicBackupError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use periodic_backup_core::MemoryObjectStore;

    fn backup_at(second: u32) -> BackupObject {
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, second).unwrap();
        let base = crate::backup_object::file_name_base(&ts);
        BackupObject::new(
            ts,
            vec![format!("{}_00.tar.zst", base), format!("{}_01.tar.zst", base)],
            "tar-zstd",
        )
    }

    async fn seed(store: &MemoryObjectStore, backup: &BackupObject) {
        for name in backup.archive_file_names() {
            store.put("backups", name, Bytes::from(name.clone())).await.unwrap();
        }
        let manifest = backup.to_manifest_json().unwrap();
        store
            .put("backups", &backup.manifest_file_name(), Bytes::from(manifest))
            .await
            .unwrap();
    }

    fn location(store: Arc<MemoryObjectStore>, tmp: &Path, enabled: bool) -> ObjectStoreLocation {
        ObjectStoreLocation::new("backups".to_string(), tmp.join("staging"), enabled, store)
    }

    #[tokio::test]
    async fn test_disabled_store_does_no_io() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::with_bucket("backups"));
        let location = location(store.clone(), tmp.path(), false);

        let outcome = location.store(&[], &tmp.path().join("x.pbobj")).await.unwrap();

        assert!(matches!(outcome, StoreOutcome::Skipped { .. }));
        assert_eq!(store.call_count(), 0);
        assert!(location.list_available_backups().await.unwrap().is_empty());
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_bucket_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let location = location(store.clone(), tmp.path(), true);

        let outcome = location.store(&[], &tmp.path().join("x.pbobj")).await.unwrap();
        assert!(matches!(outcome, StoreOutcome::Skipped { .. }));
        assert_eq!(store.call_count(), 1);
    }

    #[tokio::test]
    async fn test_listing_skips_unreadable_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::with_bucket("backups"));
        seed(&store, &backup_at(20)).await;
        seed(&store, &backup_at(5)).await;
        store.fail_key(&backup_at(20).manifest_file_name());

        let location = location(store, tmp.path(), true);
        let backups = location.list_available_backups().await.unwrap();
        assert_eq!(backups, vec![backup_at(5)]);
    }

    #[tokio::test]
    async fn test_retrieve_tolerates_failed_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::with_bucket("backups"));
        let backup = backup_at(5);
        seed(&store, &backup).await;
        seed(&store, &backup_at(6)).await;
        store.fail_key(&backup.archive_file_names()[1]);

        let dest = tmp.path().join("restore");
        let location = location(store, tmp.path(), true);
        let report = location.retrieve(&backup, &dest).await.unwrap();

        assert_eq!(report.files, vec![dest.join(&backup.archive_file_names()[0])]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].item, backup.archive_file_names()[1]);
    }

    #[tokio::test]
    async fn test_delete_matches_base_only() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::with_bucket("backups"));
        seed(&store, &backup_at(5)).await;
        seed(&store, &backup_at(6)).await;

        let location = location(store.clone(), tmp.path(), true);
        let report = location.delete_backup_files(&backup_at(5)).await.unwrap();

        assert_eq!(report.deleted.len(), 3);
        assert!(store.keys("backups").iter().all(|k| backup_at(6).owns_file(k)));
    }
}
