//! Periodic backup command line and daemon
//!
//! Logging setup and the cron-driven trigger; the backup engine itself lives
//! in `periodic-backup-engine`.

pub mod logging;
pub mod scheduler;

pub use periodic_backup_core::{Config, PeriodicBackupError, Result};
pub use scheduler::BackupScheduler;
