//! Periodic backup engine
//!
//! Archives configured sources, records each run in a manifest, distributes
//! both to every enabled location, prunes old runs and restores selected ones.

pub mod archiver;
pub mod backup_object;
pub mod catalog;
pub mod executor;
pub mod location;
pub mod restore;
pub mod retention;
pub mod service;

pub use archiver::{Archiver, TarZstdArchiver};
pub use backup_object::BackupObject;
pub use catalog::{BackupCatalog, BackupSelector};
pub use executor::{BackupExecutor, BackupReport, LocationResult, RunState};
pub use location::{
    DeleteReport, ItemFailure, LocalDirectory, Location, ObjectStoreLocation, RetrieveReport,
    StoreOutcome,
};
pub use restore::{RestoreExecutor, RestoreHandle, RestoreReport};
pub use retention::{LocationRetention, RetentionManager, RetentionPolicy, RetentionReport};
pub use service::{LocationStatus, PeriodicBackup};
