//! World Backup Library
//!
//! Compressed world backups with optional SFTP shipping, a persistent daily
//! snapshot location and count-based retention.

pub mod archive;
pub mod config;
pub mod executor;
pub mod fs;
pub mod notify;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use crate::config::Config;
pub use executor::job::{JobPhase, JobReport, TransferOutcome};
pub use executor::BackupManager;
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
