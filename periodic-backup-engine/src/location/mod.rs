//! Backup locations
//!
//! A location is somewhere backups are stored and later found again. The set
//! of backends is closed: a local directory or an object store bucket. Every
//! operation on a disabled location is a no-op.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use periodic_backup_core::{LocationConfig, ObjectStoreClient, Result};

use crate::backup_object::BackupObject;

pub mod local;
pub mod object_store;

pub use local::LocalDirectory;
pub use object_store::ObjectStoreLocation;

/// One item that could not be transferred or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub item: String,
    pub error: String,
}

impl ItemFailure {
    pub fn new(item: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            item: item.into(),
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Every archive and then the manifest were written
    Stored { files: Vec<String> },
    /// Location disabled or unreachable; nothing was written
    Skipped { reason: String },
}

#[derive(Debug, Default)]
pub struct RetrieveReport {
    pub files: Vec<PathBuf>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Default)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone)]
pub enum Location {
    LocalDirectory(LocalDirectory),
    ObjectStore(ObjectStoreLocation),
}

impl Location {
    /// Build a location from its configuration, creating backend clients as needed.
    pub async fn connect(config: &LocationConfig) -> Result<Self> {
        match config {
            LocationConfig::LocalDirectory { path, enabled } => Ok(Location::LocalDirectory(
                LocalDirectory::new(path.clone(), *enabled),
            )),
            LocationConfig::ObjectStore {
                bucket,
                tmp_dir,
                enabled,
                region,
                endpoint,
            } => {
                let client = connect_object_store(region.as_deref(), endpoint.as_deref()).await?;
                Ok(Location::ObjectStore(
                    ObjectStoreLocation::new(bucket.clone(), tmp_dir.clone(), *enabled, client)
                        .with_endpoint(region.clone(), endpoint.clone()),
                ))
            }
        }
    }

    pub fn config(&self) -> LocationConfig {
        match self {
            Location::LocalDirectory(location) => location.config(),
            Location::ObjectStore(location) => location.config(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Location::LocalDirectory(location) => location.is_enabled(),
            Location::ObjectStore(location) => location.is_enabled(),
        }
    }

    pub fn display_name(&self) -> String {
        self.config().display_name()
    }

    /// Manifests found in this location, oldest first.
    pub async fn list_available_backups(&self) -> Result<Vec<BackupObject>> {
        match self {
            Location::LocalDirectory(location) => location.list_available_backups().await,
            Location::ObjectStore(location) => location.list_available_backups().await,
        }
    }

    /// Copy every archive, then the manifest, into this location.
    pub async fn store(&self, archives: &[PathBuf], manifest: &Path) -> Result<StoreOutcome> {
        match self {
            Location::LocalDirectory(location) => location.store(archives, manifest).await,
            Location::ObjectStore(location) => location.store(archives, manifest).await,
        }
    }

    /// Copy the archives of `backup` into `dest_dir`. Missing or failing files
    /// are reported, not fatal.
    pub async fn retrieve(&self, backup: &BackupObject, dest_dir: &Path) -> Result<RetrieveReport> {
        match self {
            Location::LocalDirectory(location) => location.retrieve(backup, dest_dir).await,
            Location::ObjectStore(location) => location.retrieve(backup, dest_dir).await,
        }
    }

    /// Delete the archives and manifest of `backup`.
    pub async fn delete_backup_files(&self, backup: &BackupObject) -> Result<DeleteReport> {
        match self {
            Location::LocalDirectory(location) => location.delete_backup_files(backup).await,
            Location::ObjectStore(location) => location.delete_backup_files(backup).await,
        }
    }

    /// Whether the backing directory or bucket is reachable.
    pub async fn is_reachable(&self) -> Result<bool> {
        match self {
            Location::LocalDirectory(location) => Ok(location.path().is_dir()),
            Location::ObjectStore(location) => location.bucket_exists().await,
        }
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.config() == other.config()
    }
}

#[cfg(feature = "aws-storage")]
async fn connect_object_store(
    region: Option<&str>,
    endpoint: Option<&str>,
) -> Result<Arc<dyn ObjectStoreClient>> {
    let client = periodic_backup_core::S3ObjectStore::new(region, endpoint).await?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "aws-storage"))]
async fn connect_object_store(
    _region: Option<&str>,
    _endpoint: Option<&str>,
) -> Result<Arc<dyn ObjectStoreClient>> {
    Err(periodic_backup_core::PeriodicBackupError::Config(
        "Object store locations require the aws-storage feature".to_string(),
    ))
}

/// Sort manifests by their encoded timestamp, oldest first.
pub(crate) fn sort_by_timestamp(backups: &mut [BackupObject]) {
    backups.sort_by_key(|backup| backup.timestamp());
}

/// Last path segment of a stored name, rejecting names that would escape
/// the destination directory.
pub(crate) fn local_file_name(name: &str) -> Option<&str> {
    let file_name = name.rsplit('/').next()?;
    match file_name {
        "" | "." | ".." => None,
        _ => Some(file_name),
    }
}
