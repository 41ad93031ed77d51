use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::schedule::validate_cron_expression;
use crate::{PeriodicBackupError, Result};

/// Top-level configuration snapshot for a backup service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Scratch space for archives and staged manifests. Must not live inside
    /// any directory that is being backed up.
    pub temp_directory: PathBuf,
    /// Backup schedule, 6-field cron syntax
    #[serde(default = "default_cron")]
    pub cron: String,
    /// Maximum number of backups kept per location, 0 = unlimited
    #[serde(default)]
    pub cycle_quantity: usize,
    /// Maximum age of a backup in days, 0 = unlimited
    #[serde(default)]
    pub cycle_days: u32,
    pub file_manager: FileManagerConfig,
    #[serde(default)]
    pub locations: Vec<LocationConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upper bound for `cycle_days`, roughly a century
pub const MAX_CYCLE_DAYS: u32 = 36_500;

fn default_cron() -> String {
    "0 0 2 * * *".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileManagerConfig {
    /// Directories archived on every run, one archive each
    pub sources: Vec<PathBuf>,
    /// Where each archive is unpacked on restore; defaults to `sources`
    #[serde(default)]
    pub restore_targets: Option<Vec<PathBuf>>,
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

fn default_compression_level() -> i32 {
    3
}

impl FileManagerConfig {
    pub fn targets(&self) -> &[PathBuf] {
        self.restore_targets.as_deref().unwrap_or(&self.sources)
    }
}

/// A configured backup destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LocationConfig {
    LocalDirectory {
        path: PathBuf,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
    ObjectStore {
        bucket: String,
        /// Local staging directory for manifests moving to and from the bucket
        tmp_dir: PathBuf,
        #[serde(default = "default_enabled")]
        enabled: bool,
        #[serde(default)]
        region: Option<String>,
        /// Custom endpoint for S3-compatible services
        #[serde(default)]
        endpoint: Option<String>,
    },
}

fn default_enabled() -> bool {
    true
}

impl LocationConfig {
    pub fn enabled(&self) -> bool {
        match self {
            LocationConfig::LocalDirectory { enabled, .. } => *enabled,
            LocationConfig::ObjectStore { enabled, .. } => *enabled,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            LocationConfig::LocalDirectory { path, .. } => {
                format!("local directory: {}", path.display())
            }
            LocationConfig::ObjectStore { bucket, .. } => format!("S3 bucket: {}", bucket),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for JSON log files; console only when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

impl Config {
    /// Default config file path for this platform
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("org", "periodic-backup", "periodic-backup")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.unwrap_or_else(Self::default_path);
        debug!("Loading configuration from {}", path.display());

        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            PeriodicBackupError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_cron_expression(&self.cron)?;

        if is_blank(&self.temp_directory) {
            return Err(PeriodicBackupError::Config(
                "temp_directory is required".to_string(),
            ));
        }

        if self.file_manager.sources.is_empty() {
            return Err(PeriodicBackupError::Config(
                "At least one backup source is required".to_string(),
            ));
        }

        if let Some(targets) = &self.file_manager.restore_targets {
            if targets.len() != self.file_manager.sources.len() {
                return Err(PeriodicBackupError::Config(format!(
                    "restore_targets has {} entries but there are {} sources",
                    targets.len(),
                    self.file_manager.sources.len()
                )));
            }
        }

        if self.cycle_days > MAX_CYCLE_DAYS {
            return Err(PeriodicBackupError::Config(format!(
                "cycle_days must be at most {}, got {}",
                MAX_CYCLE_DAYS, self.cycle_days
            )));
        }

        if !(1..=22).contains(&self.file_manager.compression_level) {
            return Err(PeriodicBackupError::Config(format!(
                "compression_level must be between 1 and 22, got {}",
                self.file_manager.compression_level
            )));
        }

        for location in &self.locations {
            match location {
                LocationConfig::LocalDirectory { path, .. } if is_blank(path) => {
                    return Err(PeriodicBackupError::Config(
                        "Local directory location requires a path".to_string(),
                    ));
                }
                LocationConfig::ObjectStore { bucket, .. } if bucket.trim().is_empty() => {
                    return Err(PeriodicBackupError::Config(
                        "Object store location requires a bucket".to_string(),
                    ));
                }
                LocationConfig::ObjectStore { tmp_dir, bucket, .. } if is_blank(tmp_dir) => {
                    return Err(PeriodicBackupError::Config(format!(
                        "Object store location {} requires tmp_dir",
                        bucket
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().is_empty()
}
