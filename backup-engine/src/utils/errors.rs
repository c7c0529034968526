//! Error types for the backup engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Backup type {0} is not supported")]
    UnsupportedBackupType(String),

    #[error("No checkpoint stored at {0}")]
    CheckpointMissing(String),

    #[error("Add the following collections to the backup configuration: {}", .0.join(", "))]
    MissingCollectionConfig(Vec<String>),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Invalid checkpoint at {key}: {reason}")]
    InvalidCheckpoint { key: String, reason: String },

    #[error("Extended JSON error: {0}")]
    ExtendedJson(String),

    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackupError {
    /// True for the coverage warning, which callers downgrade instead of failing the run.
    pub fn is_coverage_gap(&self) -> bool {
        matches!(self, BackupError::MissingCollectionConfig(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BackupError::ObjectNotFound(_) | BackupError::CheckpointMissing(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
