//! Configuration management for world backups.
//!
//! Loads configuration from a TOML file with environment variable overrides
//! (`WORLD_BACKUP_<SECTION>__<KEY>`, e.g. `WORLD_BACKUP_TRANSFER__PASSWORD`).
//! The core only ever reads a loaded [`Config`]; it is handed to each run as an
//! immutable snapshot.

use crate::utils::errors::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "WORLD_BACKUP";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub persistent: PersistentConfig,

    #[serde(default)]
    pub compression: CompressionConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// File name prefix for archives; also selects retention candidates
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Primary backup directory
    #[serde(default = "default_location")]
    pub location: PathBuf,

    /// Paths to include in every archive
    #[serde(default = "default_sources")]
    pub sources: Vec<PathBuf>,

    /// File names skipped while collecting sources
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Archives kept in the primary location (negative disables pruning)
    #[serde(default = "default_max_count")]
    pub max_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentConfig {
    /// Route the first archive of each day to the persistent location
    #[serde(default)]
    pub enabled: bool,

    /// Long-term backup directory
    #[serde(default = "default_persistent_location")]
    pub location: PathBuf,

    /// Archives kept in the persistent location (negative disables pruning)
    #[serde(default = "default_persistent_max_count")]
    pub max_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Write `.tar.zst` archives instead of plain directory copies
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Compression level (1-22 for zstd)
    #[serde(default = "default_compression_level")]
    pub level: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Upload each new archive over SFTP
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub server: String,

    #[serde(default = "default_sftp_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Remote directory archives are uploaded into
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_prefix() -> String {
    "backup".to_string()
}

fn default_location() -> PathBuf {
    PathBuf::from("backups")
}

fn default_sources() -> Vec<PathBuf> {
    vec![PathBuf::from("world")]
}

fn default_exclude() -> Vec<String> {
    vec!["session.lock".to_string()]
}

fn default_max_count() -> i64 {
    10
}

fn default_persistent_location() -> PathBuf {
    PathBuf::from("persistent-backups")
}

fn default_persistent_max_count() -> i64 {
    -1
}

fn default_true() -> bool {
    true
}

fn default_compression_level() -> i32 {
    3
}

fn default_sftp_port() -> u16 {
    22
}

fn default_remote_dir() -> String {
    "backups".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            location: default_location(),
            sources: default_sources(),
            exclude: default_exclude(),
            max_count: default_max_count(),
        }
    }
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            location: default_persistent_location(),
            max_count: default_persistent_max_count(),
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_compression_level(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: String::new(),
            port: default_sftp_port(),
            username: String::new(),
            password: String::new(),
            remote_dir: default_remote_dir(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let builder = ::config::Config::builder()
            .add_source(::config::File::from(path).format(::config::FileFormat::Toml));
        Self::build(builder)
    }

    /// Defaults plus environment overrides, for runs without a config file
    pub fn from_env() -> Result<Self> {
        Self::build(::config::Config::builder())
    }

    fn build(
        builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
    ) -> Result<Self> {
        let config: Config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("backup.sources")
                    .with_list_parse_key("backup.exclude"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break archive naming or the collaborators
    pub fn validate(&self) -> Result<()> {
        let prefix = &self.backup.prefix;
        if prefix.is_empty() {
            return Err(BackupError::Config("backup.prefix must not be empty".into()));
        }
        if prefix.contains('/') || prefix.contains('\\') {
            return Err(BackupError::Config(format!(
                "backup.prefix must not contain a path separator: {}",
                prefix
            )));
        }

        // Primary retention would treat such a directory as one more archive.
        let persistent = &self.persistent.location;
        let inside_primary = persistent.parent() == Some(self.backup.location.as_path());
        let prefixed = persistent
            .file_name()
            .map(|name| name.to_string_lossy().starts_with(prefix.as_str()))
            .unwrap_or(false);
        if inside_primary && prefixed {
            return Err(BackupError::Config(format!(
                "persistent.location {} sits in backup.location and starts with the prefix {}",
                persistent.display(),
                prefix
            )));
        }

        if !(1..=22).contains(&self.compression.level) {
            return Err(BackupError::Config(format!(
                "compression.level must be between 1 and 22, got {}",
                self.compression.level
            )));
        }

        if self.transfer.enabled {
            if self.transfer.server.is_empty() {
                return Err(BackupError::Config(
                    "transfer.server is required when transfer is enabled".into(),
                ));
            }
            if self.transfer.username.is_empty() {
                return Err(BackupError::Config(
                    "transfer.username is required when transfer is enabled".into(),
                ));
            }
        }

        Ok(())
    }

    /// Render the default configuration as TOML
    pub fn default_toml() -> Result<String> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }
}
