//! Archive naming and the Archive Task interface.
//!
//! Archive names are `{prefix}_{YYYY-MM-DD}_{HH-MM-SS}` with a `.tar.zst`
//! extension when compressed. Every field is zero padded, so for a fixed prefix
//! sorting names ascending sorts archives oldest first. Retention relies on
//! this and never looks at file modification times.
//!
//! The part before the last `_` is the cycle identifier: all archives taken on
//! the same day share it.
//!
//! Timestamps are UTC. Local wall-clock time repeats an hour when daylight
//! saving ends, which would let a newer archive sort before an older one.

pub mod writer;

use crate::utils::errors::Result;
use chrono::NaiveDateTime;
use std::path::PathBuf;

pub use writer::ArchiveWriter;

/// Extension of compressed archives
pub const ARCHIVE_EXTENSION: &str = "tar.zst";

/// Separates prefix, date and time in archive names
pub const NAME_DELIMITER: char = '_';

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Current time for archive names and cycle detection
pub fn archive_timestamp() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

/// Name of the archive taken at `timestamp`
pub fn archive_name(prefix: &str, timestamp: NaiveDateTime, compressed: bool) -> String {
    let stem = format!("{}{}{}", prefix, NAME_DELIMITER, timestamp.format(TIMESTAMP_FORMAT));
    if compressed {
        format!("{}.{}", stem, ARCHIVE_EXTENSION)
    } else {
        stem
    }
}

/// Strip the time-of-day part, leaving `{prefix}_{YYYY-MM-DD}`
pub fn cycle_id(archive_name: &str) -> &str {
    match archive_name.rfind(NAME_DELIMITER) {
        Some(idx) => &archive_name[..idx],
        None => archive_name,
    }
}

/// Everything the Archive Task needs for one archive
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    /// Directory the archive is written into
    pub destination: PathBuf,
    pub prefix: String,
    pub sources: Vec<PathBuf>,
    pub exclude: Vec<String>,
    pub compression_level: i32,
    /// `.tar.zst` archive when set, plain directory copy otherwise
    pub compress: bool,
    pub timestamp: NaiveDateTime,
}

impl ArchiveRequest {
    pub fn file_name(&self) -> String {
        archive_name(&self.prefix, self.timestamp, self.compress)
    }

    pub fn target_path(&self) -> PathBuf {
        self.destination.join(self.file_name())
    }
}

/// Produces one archive per call.
///
/// Implementations run on a blocking worker thread; returning `Ok` means the
/// archive at the returned path is complete.
pub trait Archiver: Send + Sync {
    fn create(&self, request: &ArchiveRequest) -> Result<PathBuf>;
}
