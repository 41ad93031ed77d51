//! Backup manifest entity
//!
//! A `BackupObject` describes one backup run. Its timestamp is encoded in a
//! fixed-width filename base (`backup_YYYYmmdd_HHMMSS`) shared by the manifest
//! and every archive of the run; locations use that base as the join key when
//! retrieving or deleting files.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use tokio::fs;

use periodic_backup_core::{PeriodicBackupError, Result};

/// Reserved extension of manifest files. Never used for archives.
pub const MANIFEST_EXTENSION: &str = ".pbobj";

pub const FILE_NAME_PREFIX: &str = "backup_";

/// Timestamp pattern embedded in every file of a run
pub const FILE_TIMESTAMP_PATTERN: &str = "%Y%m%d_%H%M%S";

const FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    FORMAT_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupObject {
    #[serde(default = "default_format_version")]
    format_version: u32,
    timestamp: DateTime<Utc>,
    archive_file_names: Vec<String>,
    file_manager_id: String,
}

/// Filename base for a run started at `timestamp`.
pub fn file_name_base(timestamp: &DateTime<Utc>) -> String {
    format!(
        "{}{}",
        FILE_NAME_PREFIX,
        timestamp.format(FILE_TIMESTAMP_PATTERN)
    )
}

pub fn is_manifest(name: &str) -> bool {
    name.ends_with(MANIFEST_EXTENSION)
}

impl BackupObject {
    /// Timestamps are truncated to whole seconds, the granularity of the filename base.
    pub fn new(
        timestamp: DateTime<Utc>,
        archive_file_names: Vec<String>,
        file_manager_id: impl Into<String>,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            timestamp: timestamp.trunc_subsecs(0),
            archive_file_names,
            file_manager_id: file_manager_id.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn archive_file_names(&self) -> &[String] {
        &self.archive_file_names
    }

    pub fn file_manager_id(&self) -> &str {
        &self.file_manager_id
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(FILE_TIMESTAMP_PATTERN).to_string()
    }

    pub fn file_name_base(&self) -> String {
        file_name_base(&self.timestamp)
    }

    /// Opaque selector for this backup. Unique per run second.
    pub fn id(&self) -> String {
        self.file_name_base()
    }

    pub fn manifest_file_name(&self) -> String {
        format!("{}{}", self.file_name_base(), MANIFEST_EXTENSION)
    }

    /// Whether a stored file name belongs to this run (archive or manifest).
    pub fn owns_file(&self, name: &str) -> bool {
        name.contains(&self.file_name_base())
    }

    /// Whether a stored file name is one of this run's archives.
    pub fn owns_archive(&self, name: &str) -> bool {
        self.owns_file(name) && !is_manifest(name)
    }

    /// Stable integer key derived from the timestamp and archive list.
    ///
    /// Uses SHA-256 rather than `std::hash` so the value is identical across
    /// processes and after a manifest round-trip.
    pub fn selection_hash(&self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.timestamp.timestamp().to_be_bytes());
        for name in &self.archive_file_names {
            hasher.update((name.len() as u64).to_be_bytes());
            hasher.update(name.as_bytes());
        }
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix)
    }

    pub fn to_manifest_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PeriodicBackupError::Manifest(format!("Serialize failed: {}", e)))
    }

    pub fn from_manifest_json(json: &str) -> Result<Self> {
        let mut backup: BackupObject = serde_json::from_str(json)
            .map_err(|e| PeriodicBackupError::Manifest(format!("Parse manifest failed: {}", e)))?;

        if backup.format_version > FORMAT_VERSION {
            return Err(PeriodicBackupError::Manifest(format!(
                "Unsupported manifest version {}",
                backup.format_version
            )));
        }
        if let Some(name) = backup.archive_file_names.iter().find(|n| is_manifest(n)) {
            return Err(PeriodicBackupError::Manifest(format!(
                "Archive name {} uses the reserved manifest extension",
                name
            )));
        }

        backup.timestamp = backup.timestamp.trunc_subsecs(0);
        Ok(backup)
    }

    /// Write the manifest into `dir` and return its path.
    pub async fn write_manifest(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.manifest_file_name());
        fs::write(&path, self.to_manifest_json()?).await?;
        Ok(path)
    }

    pub async fn read_manifest(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).await?;
        Self::from_manifest_json(&json)
    }
}

impl PartialEq for BackupObject {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.archive_file_names == other.archive_file_names
    }
}

impl Eq for BackupObject {}

impl Hash for BackupObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.timestamp.hash(state);
        self.archive_file_names.hash(state);
    }
}
