//! Shared building blocks for the periodic backup engine: the error type,
//! configuration, cron helpers and the object store capability.

pub mod config;
pub mod error;
pub mod schedule;
pub mod storage;

pub use config::{Config, FileManagerConfig, LocationConfig, LoggingConfig};
pub use error::{PeriodicBackupError, Result};
pub use storage::{MemoryObjectStore, ObjectStoreClient};

#[cfg(feature = "aws-storage")]
pub use storage::S3ObjectStore;
