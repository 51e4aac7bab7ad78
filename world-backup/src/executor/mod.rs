//! Backup orchestration.
//!
//! A run goes through these steps, each finishing before the next starts:
//! - Routing: primary or persistent location
//! - Archive Task
//! - Transfer Task, when enabled and an archive exists
//! - Consolidation of both locations, unless an enabled transfer did not succeed
//!
//! The Archive and Transfer Tasks run on tokio's blocking pool and the run
//! awaits their handles, so only one step is ever in progress. A task that
//! panics or is cancelled counts as finished without a result.

pub mod job;
pub mod retention;
pub mod routing;

use crate::archive::{archive_timestamp, ArchiveRequest, ArchiveWriter, Archiver};
use crate::config::Config;
use crate::notify::{LogNotifier, Notice, Notifier};
use crate::transfer::{SftpUploader, TransferRequest, Uploader};
use chrono::NaiveDateTime;
use job::{JobPhase, JobReport, TransferOutcome};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Runs backup jobs, one at a time.
///
/// `is_running` is advisory. Nothing here prevents two overlapping runs; callers
/// check it before starting one.
pub struct BackupManager {
    archiver: Arc<dyn Archiver>,
    uploader: Arc<dyn Uploader>,
    notifier: Arc<dyn Notifier>,
    running: AtomicBool,
    phase: AtomicU8,
}

impl BackupManager {
    pub fn new(
        archiver: Arc<dyn Archiver>,
        uploader: Arc<dyn Uploader>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            archiver,
            uploader,
            notifier,
            running: AtomicBool::new(false),
            phase: AtomicU8::new(JobPhase::Idle as u8),
        }
    }

    /// Local archives, SFTP uploads and notices written to the log
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(ArchiveWriter::new()),
            Arc::new(SftpUploader::new()),
            Arc::new(LogNotifier),
        )
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> JobPhase {
        JobPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Start a run in the background
    pub fn start(self: &Arc<Self>, config: Config) -> JoinHandle<JobReport> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run(&config).await })
    }

    /// Run one backup job now (UTC)
    pub async fn run(&self, config: &Config) -> JobReport {
        self.run_at(config, archive_timestamp()).await
    }

    /// Run one backup job as if the clock read `now`
    pub async fn run_at(&self, config: &Config, now: NaiveDateTime) -> JobReport {
        let _running = RunningGuard::enter(self);
        let job_id = Uuid::new_v4();
        info!(job_id = %job_id, "Backup job started");

        self.set_phase(JobPhase::Archiving);
        let persistent = routing::should_route_to_persistent(config, now);
        let destination = if persistent {
            config.persistent.location.clone()
        } else {
            config.backup.location.clone()
        };

        let request = ArchiveRequest {
            destination,
            prefix: config.backup.prefix.clone(),
            sources: config.backup.sources.clone(),
            exclude: config.backup.exclude.clone(),
            compression_level: config.compression.level,
            compress: config.compression.enabled,
            timestamp: now,
        };

        self.notifier.send(Notice::BackupStarted { persistent });
        let archive = self.archive(job_id, request).await;

        let transfer = if !config.transfer.enabled {
            TransferOutcome::Disabled
        } else if let Some(path) = &archive {
            self.set_phase(JobPhase::Uploading);
            self.transfer(job_id, config, path.clone()).await
        } else {
            warn!(job_id = %job_id, "No archive was produced, skipping upload");
            TransferOutcome::Skipped
        };

        let mut report = JobReport {
            job_id,
            persistent,
            archive,
            transfer,
            primary_consolidation: None,
            persistent_consolidation: None,
        };

        if transfer.allows_consolidation() {
            self.set_phase(JobPhase::Consolidating);
            let prefix = &config.backup.prefix;
            report.primary_consolidation = Some(retention::consolidate(
                &config.backup.location,
                prefix,
                config.backup.max_count,
                self.notifier.as_ref(),
            ));
            report.persistent_consolidation = Some(retention::consolidate(
                &config.persistent.location,
                prefix,
                config.persistent.max_count,
                self.notifier.as_ref(),
            ));
        } else {
            warn!(job_id = %job_id, "Upload did not succeed, keeping old backups");
        }

        info!(
            job_id = %job_id,
            persistent = report.persistent,
            transfer = ?report.transfer,
            pruned = report.pruned(),
            "Backup job finished"
        );

        report
    }

    async fn archive(&self, job_id: Uuid, request: ArchiveRequest) -> Option<PathBuf> {
        let archiver = Arc::clone(&self.archiver);
        let outcome = run_to_completion("archive", move || archiver.create(&request)).await;

        match outcome {
            Some(Ok(path)) => {
                info!(job_id = %job_id, archive = %path.display(), "Archive created");
                self.notifier.send(Notice::BackupFinished {
                    archive: path.clone(),
                });
                Some(path)
            }
            Some(Err(e)) => {
                error!(job_id = %job_id, error = %e, "Archive task failed");
                self.notifier.send(Notice::BackupFailed);
                None
            }
            None => {
                self.notifier.send(Notice::BackupFailed);
                None
            }
        }
    }

    async fn transfer(&self, job_id: Uuid, config: &Config, file: PathBuf) -> TransferOutcome {
        let request = TransferRequest {
            file,
            server: config.transfer.server.clone(),
            port: config.transfer.port,
            username: config.transfer.username.clone(),
            password: config.transfer.password.clone(),
            remote_dir: config.transfer.remote_dir.clone(),
        };

        self.notifier.send(Notice::TransferStarted);
        let uploader = Arc::clone(&self.uploader);
        let outcome = run_to_completion("transfer", move || uploader.upload(&request)).await;

        match outcome {
            Some(Ok(())) => {
                self.notifier.send(Notice::TransferFinished);
                TransferOutcome::Succeeded
            }
            Some(Err(e)) => {
                error!(job_id = %job_id, error = %e, "Transfer task failed");
                self.notifier.send(Notice::TransferFailed);
                TransferOutcome::Failed
            }
            None => {
                self.notifier.send(Notice::TransferFailed);
                TransferOutcome::Failed
            }
        }
    }

    fn set_phase(&self, phase: JobPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }
}

/// Sets the running flag for the lifetime of a run
struct RunningGuard<'a> {
    manager: &'a BackupManager,
}

impl<'a> RunningGuard<'a> {
    fn enter(manager: &'a BackupManager) -> Self {
        manager.running.store(true, Ordering::SeqCst);
        Self { manager }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.manager.set_phase(JobPhase::Idle);
        self.manager.running.store(false, Ordering::SeqCst);
    }
}

/// Run `task` on the blocking pool and wait for it.
///
/// `None` if the task panicked or was cancelled before returning.
async fn run_to_completion<T, F>(name: &str, task: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(value) => Some(value),
        Err(e) => {
            error!("The {} task was interrupted: {}", name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::archive_name;
    use crate::notify::testing::RecordingNotifier;
    use crate::utils::errors::{BackupError, Result};
    use chrono::NaiveDate;
    use std::fs;
    use std::path::Path;
    use std::sync::{mpsc, Mutex};
    use tempfile::TempDir;

    #[derive(Clone, Copy)]
    enum ArchiveBehavior {
        Succeed,
        Fail,
        Panic,
    }

    /// Writes an empty file where the archive would go
    struct FakeArchiver {
        behavior: ArchiveBehavior,
        requests: Mutex<Vec<ArchiveRequest>>,
        gate: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl FakeArchiver {
        fn new(behavior: ArchiveBehavior) -> Self {
            Self {
                behavior,
                requests: Mutex::new(Vec::new()),
                gate: Mutex::new(None),
            }
        }

        fn gated(gate: mpsc::Receiver<()>) -> Self {
            Self {
                gate: Mutex::new(Some(gate)),
                ..Self::new(ArchiveBehavior::Succeed)
            }
        }
    }

    impl Archiver for FakeArchiver {
        fn create(&self, request: &ArchiveRequest) -> Result<PathBuf> {
            self.requests.lock().unwrap().push(request.clone());
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.recv();
            }

            match self.behavior {
                ArchiveBehavior::Succeed => {
                    fs::create_dir_all(&request.destination)?;
                    fs::write(request.target_path(), b"archive")?;
                    Ok(request.target_path())
                }
                ArchiveBehavior::Fail => Err(BackupError::Archive("disk full".into())),
                ArchiveBehavior::Panic => panic!("archiver crashed"),
            }
        }
    }

    #[derive(Clone, Copy)]
    enum UploadBehavior {
        Succeed,
        Fail,
        Panic,
    }

    struct FakeUploader {
        behavior: UploadBehavior,
        uploads: Mutex<Vec<PathBuf>>,
    }

    impl FakeUploader {
        fn new(behavior: UploadBehavior) -> Self {
            Self {
                behavior,
                uploads: Mutex::new(Vec::new()),
            }
        }

        fn uploads(&self) -> Vec<PathBuf> {
            self.uploads.lock().unwrap().clone()
        }
    }

    impl Uploader for FakeUploader {
        fn upload(&self, request: &TransferRequest) -> Result<()> {
            self.uploads.lock().unwrap().push(request.file.clone());
            match self.behavior {
                UploadBehavior::Succeed => Ok(()),
                UploadBehavior::Fail => Err(BackupError::Transfer("connection reset".into())),
                UploadBehavior::Panic => panic!("uploader crashed"),
            }
        }
    }

    struct Harness {
        _temp_dir: TempDir,
        config: Config,
        archiver: Arc<FakeArchiver>,
        uploader: Arc<FakeUploader>,
        notifier: Arc<RecordingNotifier>,
        manager: Arc<BackupManager>,
    }

    impl Harness {
        fn new(archiver: FakeArchiver, uploader: FakeUploader) -> Self {
            let temp_dir = TempDir::new().unwrap();
            let mut config = Config::default();
            config.backup.location = temp_dir.path().join("backups");
            config.backup.max_count = 3;
            config.persistent.location = temp_dir.path().join("persistent");
            config.persistent.max_count = 1;
            config.transfer.server = "backup.example.net".to_string();
            config.transfer.username = "mc".to_string();

            let archiver = Arc::new(archiver);
            let uploader = Arc::new(uploader);
            let notifier = Arc::new(RecordingNotifier::default());
            let manager = Arc::new(BackupManager::new(
                archiver.clone(),
                uploader.clone(),
                notifier.clone(),
            ));

            Self {
                _temp_dir: temp_dir,
                config,
                archiver,
                uploader,
                notifier,
                manager,
            }
        }

        /// Four earlier archives in the primary location and two persistent ones
        fn seed_old_archives(&self) {
            fs::create_dir_all(&self.config.backup.location).unwrap();
            for day in 1..=4 {
                fs::write(self.config.backup.location.join(old_name(day)), b"old").unwrap();
            }
            fs::create_dir_all(&self.config.persistent.location).unwrap();
            for day in 1..=2 {
                fs::write(self.config.persistent.location.join(old_name(day)), b"old").unwrap();
            }
        }
    }

    fn old_name(day: u32) -> String {
        archive_name("backup", at(day, 3), true)
    }

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn count(dir: &Path) -> usize {
        fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_run_without_transfer_consolidates_both_locations() {
        let h = Harness::new(
            FakeArchiver::new(ArchiveBehavior::Succeed),
            FakeUploader::new(UploadBehavior::Succeed),
        );
        h.seed_old_archives();

        let report = h.manager.run_at(&h.config, at(10, 12)).await;

        let archive = report.archive.clone().unwrap();
        assert!(archive.exists());
        assert_eq!(report.transfer, TransferOutcome::Disabled);
        assert!(h.uploader.uploads().is_empty());

        // Primary: four old plus the new one, keep three.
        assert_eq!(report.primary_consolidation.unwrap().deleted, 2);
        assert!(!h.config.backup.location.join(old_name(1)).exists());
        assert!(!h.config.backup.location.join(old_name(2)).exists());
        assert!(h.config.backup.location.join(old_name(3)).exists());
        assert_eq!(count(&h.config.backup.location), 3);

        // Persistent: two old, keep one.
        assert_eq!(report.persistent_consolidation.unwrap().deleted, 1);
        assert!(h.config.persistent.location.join(old_name(2)).exists());

        assert!(!h.manager.is_running());
        assert_eq!(h.manager.phase(), JobPhase::Idle);
    }

    #[tokio::test]
    async fn test_failed_transfer_skips_consolidation() {
        let mut h = Harness::new(
            FakeArchiver::new(ArchiveBehavior::Succeed),
            FakeUploader::new(UploadBehavior::Fail),
        );
        h.config.transfer.enabled = true;
        h.seed_old_archives();

        let report = h.manager.run_at(&h.config, at(10, 12)).await;

        let archive = report.archive.clone().unwrap();
        assert!(archive.exists());
        assert_eq!(h.uploader.uploads(), vec![archive]);
        assert_eq!(report.transfer, TransferOutcome::Failed);
        assert!(!report.consolidated());
        assert_eq!(count(&h.config.backup.location), 5);
        assert_eq!(count(&h.config.persistent.location), 2);
        assert!(h.notifier.notices().contains(&Notice::TransferFailed));
        assert!(!h
            .notifier
            .notices()
            .iter()
            .any(|n| matches!(n, Notice::Consolidated { .. })));
        assert!(!h.manager.is_running());
    }

    #[tokio::test]
    async fn test_successful_transfer_then_consolidation() {
        let mut h = Harness::new(
            FakeArchiver::new(ArchiveBehavior::Succeed),
            FakeUploader::new(UploadBehavior::Succeed),
        );
        h.config.transfer.enabled = true;
        h.seed_old_archives();

        let report = h.manager.run_at(&h.config, at(10, 12)).await;

        assert_eq!(report.transfer, TransferOutcome::Succeeded);
        assert_eq!(h.uploader.uploads().len(), 1);
        assert_eq!(report.pruned(), 3);
        assert_eq!(
            h.notifier.notices(),
            vec![
                Notice::BackupStarted { persistent: false },
                Notice::BackupFinished {
                    archive: report.archive.clone().unwrap()
                },
                Notice::TransferStarted,
                Notice::TransferFinished,
                Notice::Consolidated { count: 2 },
                Notice::Consolidated { count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_archive_with_transfer_keeps_everything() {
        let mut h = Harness::new(
            FakeArchiver::new(ArchiveBehavior::Fail),
            FakeUploader::new(UploadBehavior::Succeed),
        );
        h.config.transfer.enabled = true;
        h.seed_old_archives();

        let report = h.manager.run_at(&h.config, at(10, 12)).await;

        assert!(report.archive.is_none());
        assert_eq!(report.transfer, TransferOutcome::Skipped);
        assert!(h.uploader.uploads().is_empty());
        assert!(!report.consolidated());
        assert_eq!(count(&h.config.backup.location), 4);
    }

    #[tokio::test]
    async fn test_failed_archive_without_transfer_still_consolidates() {
        let h = Harness::new(
            FakeArchiver::new(ArchiveBehavior::Fail),
            FakeUploader::new(UploadBehavior::Succeed),
        );
        h.seed_old_archives();

        let report = h.manager.run_at(&h.config, at(10, 12)).await;

        assert!(report.archive.is_none());
        assert!(report.consolidated());
        assert_eq!(count(&h.config.backup.location), 3);
        assert!(h.notifier.notices().contains(&Notice::BackupFailed));
    }

    #[tokio::test]
    async fn test_interrupted_archive_counts_as_finished() {
        let h = Harness::new(
            FakeArchiver::new(ArchiveBehavior::Panic),
            FakeUploader::new(UploadBehavior::Succeed),
        );

        let report = h.manager.run_at(&h.config, at(10, 12)).await;

        assert!(report.archive.is_none());
        assert!(report.consolidated());
        assert!(!h.manager.is_running());
        assert_eq!(h.manager.phase(), JobPhase::Idle);
    }

    #[tokio::test]
    async fn test_interrupted_transfer_counts_as_failed() {
        let mut h = Harness::new(
            FakeArchiver::new(ArchiveBehavior::Succeed),
            FakeUploader::new(UploadBehavior::Panic),
        );
        h.config.transfer.enabled = true;
        h.seed_old_archives();

        let report = h.manager.run_at(&h.config, at(10, 12)).await;

        assert!(report.archive.clone().unwrap().exists());
        assert_eq!(h.uploader.uploads().len(), 1);
        assert_eq!(report.transfer, TransferOutcome::Failed);
        assert!(!report.consolidated());
        for day in 1..=4 {
            assert!(h.config.backup.location.join(old_name(day)).exists());
        }
        assert_eq!(count(&h.config.persistent.location), 2);
        assert!(h.notifier.notices().contains(&Notice::TransferFailed));
        assert!(!h.manager.is_running());
        assert_eq!(h.manager.phase(), JobPhase::Idle);
    }

    #[tokio::test]
    async fn test_first_archive_of_the_day_goes_to_persistent() {
        let mut h = Harness::new(
            FakeArchiver::new(ArchiveBehavior::Succeed),
            FakeUploader::new(UploadBehavior::Succeed),
        );
        h.config.persistent.enabled = true;
        h.config.persistent.max_count = -1;

        let first = h.manager.run_at(&h.config, at(10, 6)).await;
        let second = h.manager.run_at(&h.config, at(10, 12)).await;
        let next_day = h.manager.run_at(&h.config, at(11, 6)).await;

        assert!(first.persistent);
        assert!(first
            .archive
            .unwrap()
            .starts_with(&h.config.persistent.location));
        assert!(!second.persistent);
        assert!(second.archive.unwrap().starts_with(&h.config.backup.location));
        assert!(next_day.persistent);

        let requests = h.archiver.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].destination, h.config.persistent.location);
        assert_eq!(requests[1].destination, h.config.backup.location);
    }

    #[tokio::test]
    async fn test_running_flag_during_run() {
        let (release, gate) = mpsc::channel();
        let h = Harness::new(
            FakeArchiver::gated(gate),
            FakeUploader::new(UploadBehavior::Succeed),
        );
        assert!(!h.manager.is_running());

        let handle = h.manager.start(h.config.clone());

        let mut waited = 0;
        while h.manager.phase() != JobPhase::Archiving && waited < 200 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            waited += 1;
        }
        assert_eq!(h.manager.phase(), JobPhase::Archiving);
        assert!(h.manager.is_running());

        release.send(()).unwrap();
        let report = handle.await.unwrap();

        assert!(report.archive.is_some());
        assert!(!h.manager.is_running());
        assert_eq!(h.manager.phase(), JobPhase::Idle);
    }
}
