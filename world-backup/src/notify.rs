//! User-facing notifications.
//!
//! The core never formats chat or UI messages itself; it hands a [`Notice`] to
//! a [`Notifier`]. Each notice carries a stable message key for localized
//! front-ends plus an English rendering.

use std::path::PathBuf;
use tracing::info;

/// A message for the people playing on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    BackupStarted { persistent: bool },
    BackupFinished { archive: PathBuf },
    BackupFailed,
    TransferStarted,
    TransferFinished,
    TransferFailed,
    Consolidated { count: usize },
}

impl Notice {
    /// Stable key for localized message catalogues
    pub fn message_key(&self) -> &'static str {
        match self {
            Notice::BackupStarted { persistent: false } => "backup.general.backup_started",
            Notice::BackupStarted { persistent: true } => "backup.general.persistent_backup_started",
            Notice::BackupFinished { .. } => "backup.general.backup_finished",
            Notice::BackupFailed => "backup.general.backup_failed",
            Notice::TransferStarted => "backup.transfer.started",
            Notice::TransferFinished => "backup.transfer.finished",
            Notice::TransferFailed => "backup.transfer.failed",
            Notice::Consolidated { .. } => "backup.general.backup_consolidation",
        }
    }

    /// English rendering
    pub fn render(&self) -> String {
        match self {
            Notice::BackupStarted { persistent: false } => "Starting backup...".to_string(),
            Notice::BackupStarted { persistent: true } => {
                "Starting persistent backup...".to_string()
            }
            Notice::BackupFinished { archive } => {
                let name = archive
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| archive.display().to_string());
                format!("Backup finished: {}", name)
            }
            Notice::BackupFailed => "Backup failed, see server log".to_string(),
            Notice::TransferStarted => "Uploading backup...".to_string(),
            Notice::TransferFinished => "Backup upload finished".to_string(),
            Notice::TransferFailed => {
                "Backup upload failed, old backups are kept".to_string()
            }
            Notice::Consolidated { count } => format!(
                "Removed {} old backup{}",
                count,
                if *count == 1 { "" } else { "s" }
            ),
        }
    }
}

/// Sink for user-facing notices
pub trait Notifier: Send + Sync {
    fn send(&self, notice: Notice);
}

/// Writes notices to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notice: Notice) {
        info!(key = notice.message_key(), "{}", notice.render());
    }
}
