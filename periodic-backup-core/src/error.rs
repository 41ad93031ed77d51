use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeriodicBackupError {
    /// Network or backend failure while talking to a storage location.
    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A manifest could not be written, read or parsed.
    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl PeriodicBackupError {
    pub fn transfer(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        PeriodicBackupError::Transfer(format!("{}: {}", context, err))
    }
}

impl From<toml::de::Error> for PeriodicBackupError {
    fn from(err: toml::de::Error) -> Self {
        PeriodicBackupError::Config(format!("Failed to parse config: {}", err))
    }
}

impl From<tokio::task::JoinError> for PeriodicBackupError {
    fn from(err: tokio::task::JoinError) -> Self {
        PeriodicBackupError::Archive(format!("Background task failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, PeriodicBackupError>;
