use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use periodic_backup_core::{PeriodicBackupError, Result};

use crate::backup_object::{BackupObject, FILE_NAME_PREFIX};
use crate::location::Location;

/// How a caller names a backup: the selection hash, or the file-name id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupSelector {
    Hash(u64),
    Id(String),
}

impl FromStr for BackupSelector {
    type Err = PeriodicBackupError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with(FILE_NAME_PREFIX) {
            return Ok(BackupSelector::Id(s.to_string()));
        }
        s.parse::<u64>().map(BackupSelector::Hash).map_err(|_| {
            PeriodicBackupError::Config(format!(
                "'{}' is neither a backup id nor a backup hash",
                s
            ))
        })
    }
}

impl fmt::Display for BackupSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupSelector::Hash(hash) => write!(f, "{}", hash),
            BackupSelector::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Every distinct backup visible across a set of locations, oldest first.
#[derive(Debug, Default, Clone)]
pub struct BackupCatalog {
    backups: Vec<BackupObject>,
}

impl BackupCatalog {
    /// List every enabled location. A location that cannot be listed is
    /// logged and contributes nothing.
    pub async fn collect(locations: &[Location]) -> Self {
        let mut seen = HashSet::new();
        let mut backups = Vec::new();

        for location in locations.iter().filter(|l| l.is_enabled()) {
            match location.list_available_backups().await {
                Ok(listed) => {
                    for backup in listed {
                        if seen.insert(backup.selection_hash()) {
                            backups.push(backup);
                        }
                    }
                }
                Err(e) => warn!("Could not list backups in {}: {}", location.display_name(), e),
            }
        }

        Self::from_backups(backups)
    }

    pub fn from_backups(mut backups: Vec<BackupObject>) -> Self {
        backups.sort_by_key(|backup| backup.timestamp());
        Self { backups }
    }

    pub fn backups(&self) -> &[BackupObject] {
        &self.backups
    }

    pub fn into_backups(self) -> Vec<BackupObject> {
        self.backups
    }

    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }

    pub fn find_by_hash(&self, hash: u64) -> Result<&BackupObject> {
        self.backups
            .iter()
            .find(|backup| backup.selection_hash() == hash)
            .ok_or_else(|| PeriodicBackupError::NotFound(format!("No backup with hash {}", hash)))
    }

    pub fn find_by_id(&self, id: &str) -> Result<&BackupObject> {
        self.backups
            .iter()
            .find(|backup| backup.id() == id)
            .ok_or_else(|| PeriodicBackupError::NotFound(format!("No backup with id {}", id)))
    }

    pub fn find(&self, selector: &BackupSelector) -> Result<&BackupObject> {
        match selector {
            BackupSelector::Hash(hash) => self.find_by_hash(*hash),
            BackupSelector::Id(id) => self.find_by_id(id),
        }
    }
}
