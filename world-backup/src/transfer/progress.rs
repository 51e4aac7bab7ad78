//! Upload progress reporting.
//!
//! Uploads can take minutes for large worlds; the reporter logs throughput at
//! a fixed interval instead of once per chunk.

use std::time::{Duration, Instant};
use tracing::info;

/// Minimum time between two progress log lines
const LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Byte counter for one upload
pub struct ProgressReporter {
    label: String,
    total_bytes: u64,
    transferred_bytes: u64,
    start_time: Instant,
    last_log: Instant,
}

impl ProgressReporter {
    pub fn new(label: impl Into<String>, total_bytes: u64) -> Self {
        let now = Instant::now();
        Self {
            label: label.into(),
            total_bytes,
            transferred_bytes: 0,
            start_time: now,
            last_log: now,
        }
    }

    /// Record `bytes` more sent, logging if the interval has passed
    pub fn advance(&mut self, bytes: u64) {
        self.transferred_bytes += bytes;

        if self.last_log.elapsed() >= LOG_INTERVAL {
            self.last_log = Instant::now();
            info!(
                "Uploading {}: {} of {} ({:.0}%, {})",
                self.label,
                format_bytes(self.transferred_bytes),
                format_bytes(self.total_bytes),
                self.percent(),
                format_speed(self.average_speed())
            );
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total_bytes > 0 {
            ((self.transferred_bytes as f64 / self.total_bytes as f64) * 100.0).min(100.0)
        } else {
            100.0
        }
    }

    /// Average speed since start in bytes/second
    pub fn average_speed(&self) -> u64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.transferred_bytes as f64 / elapsed) as u64
        } else {
            0
        }
    }

    /// Log the summary line
    pub fn finish(&self) {
        info!(
            "Uploaded {}: {} in {} ({})",
            self.label,
            format_bytes(self.transferred_bytes),
            format_duration(self.start_time.elapsed().as_secs()),
            format_speed(self.average_speed())
        );
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
