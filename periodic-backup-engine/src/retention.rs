use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use periodic_backup_core::Config;

use crate::backup_object::BackupObject;
use crate::location::{ItemFailure, Location};

/// Retention policy configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Keep at most this many backups per location, 0 = unlimited
    pub cycle_quantity: usize,
    /// Delete backups older than this many days, 0 = unlimited
    pub cycle_days: u32,
}

impl RetentionPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cycle_quantity: config.cycle_quantity,
            cycle_days: config.cycle_days,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.cycle_quantity == 0 && self.cycle_days == 0
    }

    pub fn summarize(&self) -> String {
        let mut summary = Vec::new();
        if self.cycle_quantity > 0 {
            summary.push(format!("Keep last {} backups", self.cycle_quantity));
        }
        if self.cycle_days > 0 {
            summary.push(format!("Keep backups from last {} days", self.cycle_days));
        }
        if summary.is_empty() {
            "Keep everything".to_string()
        } else {
            summary.join(" | ")
        }
    }
}

/// What one retention pass did on one location.
#[derive(Debug, Default)]
pub struct LocationRetention {
    pub location: String,
    /// Ids of backups whose files were deleted
    pub deleted: Vec<String>,
    /// Ids of backups where some files could not be deleted
    pub partial: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Default)]
pub struct RetentionReport {
    pub locations: Vec<LocationRetention>,
}

impl RetentionReport {
    pub fn deleted_count(&self) -> usize {
        self.locations.iter().map(|l| l.deleted.len()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.locations.iter().map(|l| l.failures.len()).sum()
    }
}

/// Retention manager for backup lifecycle management
#[derive(Debug, Clone)]
pub struct RetentionManager {
    policy: RetentionPolicy,
}

impl RetentionManager {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Backups to delete: everything but the newest `cycle_quantity`, plus
    /// everything older than `cycle_days` before `now`. Returned oldest first.
    pub fn calculate_deletions<'a>(
        &self,
        backups: &'a [BackupObject],
        now: DateTime<Utc>,
    ) -> Vec<&'a BackupObject> {
        let mut sorted: Vec<&BackupObject> = backups.iter().collect();
        sorted.sort_by_key(|backup| backup.timestamp());

        let over_quantity = if self.policy.cycle_quantity > 0 {
            sorted.len().saturating_sub(self.policy.cycle_quantity)
        } else {
            0
        };
        // A cutoff before the earliest representable instant deletes nothing by age.
        let cutoff = if self.policy.cycle_days > 0 {
            Duration::try_days(i64::from(self.policy.cycle_days))
                .and_then(|age| now.checked_sub_signed(age))
        } else {
            None
        };

        sorted
            .into_iter()
            .enumerate()
            .filter(|(index, backup)| {
                *index < over_quantity || cutoff.is_some_and(|c| backup.timestamp() < c)
            })
            .map(|(_, backup)| backup)
            .collect()
    }

    /// Apply the policy to one location using its own listing.
    pub async fn apply_to_location(
        &self,
        location: &Location,
        now: DateTime<Utc>,
    ) -> LocationRetention {
        let mut result = LocationRetention {
            location: location.display_name(),
            ..Default::default()
        };
        if !location.is_enabled() || self.policy.is_unlimited() {
            return result;
        }

        let backups = match location.list_available_backups().await {
            Ok(backups) => backups,
            Err(e) => {
                warn!("Retention skipped for {}: {}", result.location, e);
                result.failures.push(ItemFailure::new(result.location.clone(), e));
                return result;
            }
        };

        for backup in self.calculate_deletions(&backups, now) {
            match location.delete_backup_files(backup).await {
                Ok(report) if report.failures.is_empty() => result.deleted.push(backup.id()),
                Ok(report) => {
                    warn!(
                        "Backup {} only partially deleted from {}: {} failure(s)",
                        backup.id(),
                        result.location,
                        report.failures.len()
                    );
                    result.failures.extend(report.failures);
                    result.partial.push(backup.id());
                }
                Err(e) => {
                    warn!("Failed to delete {} from {}: {}", backup.id(), result.location, e);
                    result.failures.push(ItemFailure::new(backup.id(), e));
                }
            }
        }

        if !result.deleted.is_empty() {
            info!(
                "Retention removed {} backup(s) from {}",
                result.deleted.len(),
                result.location
            );
        }
        result
    }

    /// Apply the policy to every location independently.
    pub async fn apply(&self, locations: &[Location], now: DateTime<Utc>) -> RetentionReport {
        let mut report = RetentionReport::default();
        for location in locations.iter().filter(|l| l.is_enabled()) {
            report.locations.push(self.apply_to_location(location, now).await);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{LocalDirectory, ObjectStoreLocation};
    use bytes::Bytes;
    use chrono::TimeZone;
    use periodic_backup_core::{MemoryObjectStore, ObjectStoreClient};
    use std::path::Path;
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    fn backup_days_ago(days: i64) -> BackupObject {
        let ts = now() - Duration::days(days);
        let base = crate::backup_object::file_name_base(&ts);
        BackupObject::new(ts, vec![format!("{}_00.tar.zst", base)], "tar-zstd")
    }

    async fn write_backup(dir: &Path, backup: &BackupObject) {
        for name in backup.archive_file_names() {
            tokio::fs::write(dir.join(name), b"x").await.unwrap();
        }
        backup.write_manifest(dir).await.unwrap();
    }

    async fn seed(store: &MemoryObjectStore, bucket: &str, backup: &BackupObject) {
        for name in backup.archive_file_names() {
            store.put(bucket, name, Bytes::from_static(b"x")).await.unwrap();
        }
        let manifest = backup.to_manifest_json().unwrap();
        store
            .put(bucket, &backup.manifest_file_name(), Bytes::from(manifest))
            .await
            .unwrap();
    }

    fn ids(backups: &[&BackupObject]) -> Vec<String> {
        backups.iter().map(|b| b.id()).collect()
    }

    #[test]
    fn test_keep_last_n() {
        let manager = RetentionManager::new(RetentionPolicy {
            cycle_quantity: 2,
            cycle_days: 0,
        });
        let backups = vec![backup_days_ago(3), backup_days_ago(2), backup_days_ago(1)];

        let to_delete = manager.calculate_deletions(&backups, now());
        assert_eq!(ids(&to_delete), vec![backups[0].id()]);
    }

    #[test]
    fn test_keep_days() {
        let manager = RetentionManager::new(RetentionPolicy {
            cycle_quantity: 0,
            cycle_days: 7,
        });
        let backups = vec![
            backup_days_ago(15),
            backup_days_ago(10),
            backup_days_ago(5),
            backup_days_ago(1),
        ];

        let to_delete = manager.calculate_deletions(&backups, now());
        assert_eq!(ids(&to_delete), vec![backups[0].id(), backups[1].id()]);
    }

    #[test]
    fn test_union_of_both_limits() {
        let manager = RetentionManager::new(RetentionPolicy {
            cycle_quantity: 3,
            cycle_days: 7,
        });
        let backups = vec![
            backup_days_ago(20),
            backup_days_ago(9),
            backup_days_ago(6),
            backup_days_ago(4),
            backup_days_ago(2),
            backup_days_ago(1),
        ];

        let to_delete = manager.calculate_deletions(&backups, now());
        assert_eq!(
            ids(&to_delete),
            vec![backups[0].id(), backups[1].id(), backups[2].id()]
        );
    }

    #[test]
    fn test_unlimited_and_unsorted_input() {
        let unlimited = RetentionManager::new(RetentionPolicy::default());
        let backups = vec![backup_days_ago(1), backup_days_ago(400), backup_days_ago(3)];
        assert!(unlimited.calculate_deletions(&backups, now()).is_empty());

        let keep_one = RetentionManager::new(RetentionPolicy {
            cycle_quantity: 1,
            cycle_days: 0,
        });
        let to_delete = keep_one.calculate_deletions(&backups, now());
        assert_eq!(ids(&to_delete), vec![backups[1].id(), backups[2].id()]);
    }

    #[test]
    fn test_fewer_backups_than_quantity() {
        let manager = RetentionManager::new(RetentionPolicy {
            cycle_quantity: 5,
            cycle_days: 0,
        });
        let backups = vec![backup_days_ago(2), backup_days_ago(1)];
        assert!(manager.calculate_deletions(&backups, now()).is_empty());
    }

    #[test]
    fn test_huge_cycle_days_deletes_nothing_by_age() {
        let manager = RetentionManager::new(RetentionPolicy {
            cycle_quantity: 0,
            cycle_days: u32::MAX,
        });
        let backups = vec![backup_days_ago(4000), backup_days_ago(1)];
        assert!(manager.calculate_deletions(&backups, now()).is_empty());

        let keep_one = RetentionManager::new(RetentionPolicy {
            cycle_quantity: 1,
            cycle_days: u32::MAX,
        });
        let to_delete = keep_one.calculate_deletions(&backups, now());
        assert_eq!(ids(&to_delete), vec![backups[0].id()]);
    }

    #[tokio::test]
    async fn test_age_limit_on_local_directory() {
        let dir = tempfile::tempdir().unwrap();
        for days in [20, 9, 3, 1] {
            write_backup(dir.path(), &backup_days_ago(days)).await;
        }
        let location =
            Location::LocalDirectory(LocalDirectory::new(dir.path().to_path_buf(), true));
        let manager = RetentionManager::new(RetentionPolicy {
            cycle_quantity: 0,
            cycle_days: 7,
        });

        let result = manager.apply_to_location(&location, now()).await;
        assert_eq!(result.deleted, vec![backup_days_ago(20).id(), backup_days_ago(9).id()]);
        assert!(result.failures.is_empty());

        let survivors = location.list_available_backups().await.unwrap();
        assert_eq!(survivors.len(), 2);
        assert!(survivors
            .iter()
            .all(|backup| now() - backup.timestamp() <= Duration::days(7)));
    }

    #[tokio::test]
    async fn test_failed_file_marks_partial_deletion() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::with_bucket("backups"));
        let older = backup_days_ago(2);
        seed(&store, "backups", &older).await;
        seed(&store, "backups", &backup_days_ago(1)).await;
        store.fail_key(&older.archive_file_names()[0]);

        let client: Arc<dyn ObjectStoreClient> = store.clone();
        let location = Location::ObjectStore(ObjectStoreLocation::new(
            "backups".to_string(),
            tmp.path().join("staging"),
            true,
            client,
        ));
        let manager = RetentionManager::new(RetentionPolicy {
            cycle_quantity: 1,
            cycle_days: 0,
        });

        let result = manager.apply_to_location(&location, now()).await;
        assert!(result.deleted.is_empty());
        assert_eq!(result.partial, vec![older.id()]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].item, older.archive_file_names()[0]);
    }

    #[test]
    fn test_summary() {
        let policy = RetentionPolicy {
            cycle_quantity: 4,
            cycle_days: 30,
        };
        assert_eq!(
            policy.summarize(),
            "Keep last 4 backups | Keep backups from last 30 days"
        );
        assert_eq!(RetentionPolicy::default().summarize(), "Keep everything");
    }
}
