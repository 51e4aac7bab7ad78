//! Default Archive Task: zstd-compressed tar streams or plain directory copies.

use super::{ArchiveRequest, Archiver};
use crate::fs::walker::{collect_sources, SourceFile, WalkOptions};
use crate::transfer::progress::format_bytes;
use crate::utils::errors::{BackupError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Writes archives to the local file system
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveWriter;

impl ArchiveWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Archiver for ArchiveWriter {
    fn create(&self, request: &ArchiveRequest) -> Result<PathBuf> {
        let start_time = Instant::now();

        fs::create_dir_all(&request.destination)?;

        let options = WalkOptions::with_excludes(request.exclude.clone());
        let files = collect_sources(&request.sources, &options)?;
        if files.is_empty() {
            return Err(BackupError::Archive("no source files to back up".into()));
        }
        let total_bytes: u64 = files.iter().map(|f| f.size).sum();

        let target = request.target_path();
        if target.exists() {
            return Err(BackupError::Archive(format!(
                "{} already exists",
                target.display()
            )));
        }

        info!(
            "Writing {} ({} files, {})",
            target.display(),
            files.len(),
            format_bytes(total_bytes)
        );

        let written = if request.compress {
            write_compressed(&target, &files, request.compression_level)
        } else {
            copy_tree(&target, &files)
        };

        if let Err(e) = written {
            discard_partial(&target);
            return Err(e);
        }

        info!(
            "Archive {} complete in {:.1}s",
            target.display(),
            start_time.elapsed().as_secs_f64()
        );

        Ok(target)
    }
}

fn write_compressed(target: &Path, files: &[SourceFile], level: i32) -> Result<()> {
    let file = OpenOptions::new().write(true).create_new(true).open(target)?;
    let encoder = zstd::stream::write::Encoder::new(BufWriter::new(file), level)?;
    let mut builder = tar::Builder::new(encoder);

    for source in files {
        builder.append_path_with_name(&source.path, &source.archive_path)?;
    }

    let encoder = builder.into_inner()?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    let file: File = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    Ok(())
}

fn copy_tree(target: &Path, files: &[SourceFile]) -> Result<()> {
    fs::create_dir(target)?;

    for source in files {
        let dest = target.join(&source.archive_path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&source.path, &dest)?;
    }

    Ok(())
}

/// Remove whatever a failed write left behind
fn discard_partial(target: &Path) {
    let removed = if target.is_dir() {
        fs::remove_dir_all(target)
    } else if target.exists() {
        fs::remove_file(target)
    } else {
        Ok(())
    };

    if let Err(e) = removed {
        warn!("Could not remove partial archive {}: {}", target.display(), e);
    }
}
