//! Per-run bookkeeping for the orchestrator.

use super::retention::ConsolidationReport;
use std::path::PathBuf;
use uuid::Uuid;

/// Where a run currently is
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Idle = 0,
    Archiving = 1,
    Uploading = 2,
    Consolidating = 3,
}

impl JobPhase {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => JobPhase::Archiving,
            2 => JobPhase::Uploading,
            3 => JobPhase::Consolidating,
            _ => JobPhase::Idle,
        }
    }
}

/// What happened to the upload step of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Transfer is switched off in the configuration
    Disabled,
    /// Transfer is on but there was no archive to send
    Skipped,
    Succeeded,
    Failed,
}

impl TransferOutcome {
    /// Old archives may only be pruned once the new one is known to be safe
    pub fn allows_consolidation(self) -> bool {
        matches!(self, TransferOutcome::Disabled | TransferOutcome::Succeeded)
    }
}

/// Result of one backup run
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: Uuid,
    /// The archive was routed to the persistent location
    pub persistent: bool,
    pub archive: Option<PathBuf>,
    pub transfer: TransferOutcome,
    /// `None` when consolidation was skipped
    pub primary_consolidation: Option<ConsolidationReport>,
    pub persistent_consolidation: Option<ConsolidationReport>,
}

impl JobReport {
    pub fn consolidated(&self) -> bool {
        self.primary_consolidation.is_some() || self.persistent_consolidation.is_some()
    }

    /// Archives removed across both locations
    pub fn pruned(&self) -> usize {
        self.primary_consolidation.map(|r| r.deleted).unwrap_or(0)
            + self.persistent_consolidation.map(|r| r.deleted).unwrap_or(0)
    }
}
