//! Source collection for archives.
//!
//! Expands the configured source paths into the list of files that go into an
//! archive, each paired with the relative path it is stored under.

use crate::utils::errors::Result;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// Options for collecting sources
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// File names to skip; a matching directory is skipped with its contents
    pub exclude_patterns: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            exclude_patterns: vec!["session.lock".to_string()],
        }
    }
}

impl WalkOptions {
    pub fn with_excludes(exclude_patterns: Vec<String>) -> Self {
        Self { exclude_patterns }
    }
}

/// A file to be archived
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Full path on disk
    pub path: PathBuf,

    /// Path inside the archive, rooted at the source's own name
    pub archive_path: PathBuf,

    /// File size in bytes
    pub size: u64,
}

/// Collect every file under the given sources.
///
/// A source that does not exist is skipped with a warning. A source directory
/// `world` yields entries `world/level.dat`, `world/region/r.0.0.mca` and so on.
pub fn collect_sources(sources: &[PathBuf], options: &WalkOptions) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();

    for source in sources {
        if !source.exists() {
            warn!("Backup source {} does not exist, skipping", source.display());
            continue;
        }

        let root_name = match source.file_name() {
            Some(name) => PathBuf::from(name),
            None => {
                warn!("Backup source {} has no file name, skipping", source.display());
                continue;
            }
        };

        let walker = WalkDir::new(source)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !should_exclude(entry, &options.exclude_patterns));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() && !is_file_symlink(&entry) {
                continue;
            }

            let relative = entry.path().strip_prefix(source).unwrap_or(Path::new(""));
            let archive_path = if relative.as_os_str().is_empty() {
                root_name.clone()
            } else {
                root_name.join(relative)
            };

            files.push(SourceFile {
                path: entry.path().to_path_buf(),
                archive_path,
                size: std::fs::metadata(entry.path())?.len(),
            });
        }
    }

    Ok(files)
}

/// Symlinks to regular files are archived as their target
fn is_file_symlink(entry: &DirEntry) -> bool {
    entry.path_is_symlink()
        && std::fs::metadata(entry.path())
            .map(|m| m.is_file())
            .unwrap_or(false)
}

fn should_exclude(entry: &DirEntry, patterns: &[String]) -> bool {
    let file_name = entry.file_name().to_string_lossy();
    patterns.iter().any(|pattern| file_name == pattern.as_str())
}
