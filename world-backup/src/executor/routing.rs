//! Persistent snapshot detection.
//!
//! The first archive of each cycle (calendar day) goes to the persistent
//! location. Whether it is the first is read off the persistent directory
//! itself: if no entry there carries today's cycle identifier, this run is the
//! one. Nothing is stored between runs, so restarts do not matter.

use crate::archive::{archive_name, cycle_id};
use crate::config::Config;
use chrono::NaiveDateTime;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, error, info};

/// Decide whether an archive taken at `now` belongs in the persistent location.
///
/// Always `false` when persistent backups or compression are off. Any file
/// system error also yields `false`, falling back to the primary location.
pub fn should_route_to_persistent(config: &Config, now: NaiveDateTime) -> bool {
    if !config.persistent.enabled || !config.compression.enabled {
        return false;
    }

    let name = archive_name(&config.backup.prefix, now, true);
    let cycle = cycle_id(&name);

    match first_of_cycle(&config.persistent.location, cycle) {
        Ok(first) => first,
        Err(e) => {
            error!(
                "Error during persistent backup detection in {}: {}",
                config.persistent.location.display(),
                e
            );
            false
        }
    }
}

fn first_of_cycle(location: &Path, cycle: &str) -> io::Result<bool> {
    if !location.exists() {
        let target = std::path::absolute(location)?;
        fs::create_dir_all(&target)?;
        info!("Created persistent backup directory {}", target.display());
        return Ok(true);
    }

    let target = location.canonicalize()?;
    for entry in fs::read_dir(&target)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(cycle) {
            debug!(
                "Persistent snapshot {} already taken for this cycle",
                entry.path().display()
            );
            return Ok(false);
        }
    }

    Ok(true)
}
