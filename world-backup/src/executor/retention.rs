//! Retention: prune the oldest archives of a location.
//!
//! Every entry directly under the location whose name starts with the backup
//! prefix is a candidate, files and directories alike. Candidates are ordered
//! by name, which is chronological for archive names, and all but the newest
//! `max_count` are removed.

use crate::notify::{Notice, Notifier};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Outcome of one consolidation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    /// Prefix-matched entries found
    pub candidates: usize,
    pub deleted: usize,
    /// Deletions that were attempted and failed
    pub failed: usize,
}

/// Keep the newest `max_count` archives under `location`.
///
/// A negative `max_count` disables pruning. A missing or unreadable location
/// is left alone. A failed deletion is logged and the rest still proceed.
pub fn consolidate(
    location: &Path,
    prefix: &str,
    max_count: i64,
    notifier: &dyn Notifier,
) -> ConsolidationReport {
    if max_count < 0 {
        debug!("Retention disabled for {}", location.display());
        return ConsolidationReport::default();
    }
    let keep = max_count as usize;

    if !location.exists() {
        debug!("Backup location {} does not exist, nothing to consolidate", location.display());
        return ConsolidationReport::default();
    }

    let mut candidates = match list_candidates(location, prefix) {
        Ok(candidates) => candidates,
        Err(e) => {
            error!("Error during consolidation of {}: {}", location.display(), e);
            return ConsolidationReport::default();
        }
    };

    let mut report = ConsolidationReport {
        candidates: candidates.len(),
        ..ConsolidationReport::default()
    };

    if candidates.len() <= keep {
        return report;
    }

    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    let excess = candidates.len() - keep;

    notifier.send(Notice::Consolidated { count: excess });

    for (_, path) in candidates.into_iter().take(excess) {
        match remove_entry(&path) {
            Ok(()) => {
                info!("Deleted old backup {}", path.display());
                report.deleted += 1;
            }
            Err(e) => {
                warn!("Could not delete old backup {}: {}", path.display(), e);
                report.failed += 1;
            }
        }
    }

    report
}

/// Prefix-matched entries as `(name, path)`
fn list_candidates(location: &Path, prefix: &str) -> std::io::Result<Vec<(String, PathBuf)>> {
    let location = location.canonicalize()?;
    let mut candidates = Vec::new();

    for entry in fs::read_dir(&location)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(prefix) {
            candidates.push((name, entry.path()));
        }
    }

    Ok(candidates)
}

fn remove_entry(path: &Path) -> std::io::Result<()> {
    // Symlinks are removed themselves, never followed.
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
