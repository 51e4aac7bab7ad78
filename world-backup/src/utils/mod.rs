//! Utility modules for world backups.

pub mod errors;
pub mod logger;

pub use errors::{BackupError, Result};
