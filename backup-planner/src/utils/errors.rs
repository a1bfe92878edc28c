//! Custom error types for the backup planner.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration file: {0}")]
    ConfigFormat(#[from] toml::de::Error),

    #[error("Invalid exclude pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for BackupError {
    fn from(e: tokio::task::JoinError) -> Self {
        BackupError::Task(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
