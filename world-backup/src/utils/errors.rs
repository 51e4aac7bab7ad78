//! Custom error types for world backups.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] ::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;
