//! Sync orchestrator.
//!
//! Every write lands in the local store first; the orchestrator then pushes
//! pending records to the backend and pulls remote changes back, one record
//! at a time so a bad record never blocks the rest of a batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use certvault_core::{Certificate, LocalCertificate};

use super::config::SyncConfig;
use super::merge::{Resolution, resolve};
use crate::remote::{
    CertificateUpload, RemoteCertificate, RemoteError, RemoteService, RemoteSession,
};
use crate::storage::{LocalStore, StoreError};

/// Sync orchestrator errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Invalid remote record: {0}")]
    InvalidRecord(#[from] certvault_core::Error),
}

/// Why a sync pass did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyRunning,
    NoSession,
}

/// Counters for one completed sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub uploaded: usize,
    pub upload_failures: usize,
    pub downloaded: usize,
    /// Remote records skipped because the local copy was newer.
    pub kept_local: usize,
    pub download_failures: usize,
    pub files_downloaded: usize,
    /// Rows currently marked `conflict`.
    pub conflicts: u64,
}

impl SyncReport {
    pub const fn has_failures(&self) -> bool {
        self.upload_failures > 0 || self.download_failures > 0
    }
}

/// Result of a call to [`SyncOrchestrator::sync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped(SkipReason),
}

enum MergeOutcome {
    Applied { file_downloaded: bool },
    KeptLocal,
}

/// Clears the in-flight flag when a pass ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to the periodic sync task.
#[derive(Debug)]
pub struct SyncHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stop the periodic task and wait for it. An in-flight pass finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sync task ended abnormally");
        }
    }
}

/// Coordinates the local store and the remote backend.
pub struct SyncOrchestrator {
    store: LocalStore,
    remote: Arc<dyn RemoteService>,
    config: SyncConfig,
    running: AtomicBool,
    /// Report of the last completed pass.
    reports: watch::Sender<Option<SyncReport>>,
    /// Most recent pass started by [`SyncOrchestrator::trigger_sync`].
    background: Mutex<Option<JoinHandle<Option<SyncOutcome>>>>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("config", &self.config)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteService>, config: SyncConfig) -> Self {
        Self {
            store,
            remote,
            config,
            running: AtomicBool::new(false),
            reports: watch::channel(None).0,
            background: Mutex::new(None),
        }
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_syncing(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Receives the report of every completed pass, whoever started it.
    pub fn subscribe_reports(&self) -> watch::Receiver<Option<SyncReport>> {
        self.reports.subscribe()
    }

    /// Prepare the store and obtain a session, signing in anonymously if needed.
    ///
    /// Returns `None` when no session can be obtained; the store still works.
    pub async fn connect(&self) -> Result<Option<RemoteSession>, SyncError> {
        self.store.init().await?;

        let existing = match self.remote.current_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Could not check backend session, running offline");
                return Ok(None);
            }
        };
        if let Some(session) = existing {
            info!(user_id = %session.user_id, "Using existing session");
            return Ok(Some(session));
        }

        match self.remote.sign_in_anonymously().await {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(error = %e, "Anonymous sign-in failed, running offline");
                Ok(None)
            }
        }
    }

    /// Connect and start the periodic sync task.
    ///
    /// Returns `None` in offline mode, where no task is started.
    pub async fn initialize(self: &Arc<Self>) -> Result<Option<SyncHandle>, SyncError> {
        let Some(session) = self.connect().await? else {
            info!("Running in offline mode");
            return Ok(None);
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = self.spawn_periodic(shutdown_rx);
        info!(
            user_id = %session.user_id,
            interval_secs = self.config.interval.as_secs(),
            "Periodic sync started"
        );
        Ok(Some(SyncHandle { shutdown_tx, task }))
    }

    /// Run one sync pass: upload pending, download remote changes, report conflicts.
    ///
    /// At most one pass runs at a time per orchestrator; a concurrent call
    /// returns [`SkipReason::AlreadyRunning`] without doing anything.
    pub async fn sync(&self) -> Result<SyncOutcome, SyncError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync already in progress");
            return Ok(SyncOutcome::Skipped(SkipReason::AlreadyRunning));
        }
        let _guard = RunningGuard(&self.running);

        if self.remote.current_session().await?.is_none() {
            debug!("No session, sync skipped");
            return Ok(SyncOutcome::Skipped(SkipReason::NoSession));
        }

        let mut report = SyncReport::default();
        self.upload_pending(&mut report).await?;
        self.download_remote(&mut report).await?;

        report.conflicts = self.store.count_conflicted().await?;
        if report.conflicts > 0 {
            warn!(conflicts = report.conflicts, "Certificates marked as conflicted");
        }

        info!(
            uploaded = report.uploaded,
            upload_failures = report.upload_failures,
            downloaded = report.downloaded,
            kept_local = report.kept_local,
            download_failures = report.download_failures,
            "Sync pass complete"
        );
        self.reports.send_replace(Some(report.clone()));
        Ok(SyncOutcome::Completed(report))
    }

    async fn upload_pending(&self, report: &mut SyncReport) -> Result<(), SyncError> {
        let pending = self.store.get_pending_certificates().await?;
        if !pending.is_empty() {
            debug!(count = pending.len(), "Uploading pending certificates");
        }

        for local in pending {
            let id = local.id().to_string();
            match self.upload_one(&local).await {
                Ok(()) => report.uploaded += 1,
                Err(e) => {
                    warn!(id = %id, error = %e, "Upload failed, left pending");
                    report.upload_failures += 1;
                }
            }
        }
        Ok(())
    }

    async fn upload_one(&self, local: &LocalCertificate) -> Result<(), SyncError> {
        let file = self.store.get_certificate_file(local.id()).await?;
        let upload = CertificateUpload::new(local, file.as_deref());
        self.remote.insert_certificate(&upload).await?;
        self.store
            .mark_synced(local.id(), local.local_updated_at)
            .await?;
        Ok(())
    }

    async fn download_remote(&self, report: &mut SyncReport) -> Result<(), SyncError> {
        let cursor = self.store.download_cursor().await?;
        let batch = self.remote.fetch_certificates_since(cursor).await?;
        if batch.is_empty() {
            return Ok(());
        }
        debug!(count = batch.len(), "Merging remote certificates");

        let today = Utc::now().date_naive();
        let mut newest: Option<DateTime<Utc>> = cursor;
        let mut all_applied = true;

        for remote in &batch {
            match self.merge_one(remote, today).await {
                Ok(MergeOutcome::Applied { file_downloaded }) => {
                    report.downloaded += 1;
                    if file_downloaded {
                        report.files_downloaded += 1;
                    }
                }
                Ok(MergeOutcome::KeptLocal) => report.kept_local += 1,
                Err(e) => {
                    warn!(client_id = %remote.client_id, error = %e, "Failed to merge remote certificate");
                    report.download_failures += 1;
                    all_applied = false;
                }
            }
            newest = newest.max(Some(remote.updated_at));
        }

        if all_applied && newest != cursor {
            if let Some(ts) = newest {
                self.store.set_download_cursor(ts).await?;
            }
        }
        Ok(())
    }

    async fn merge_one(
        &self,
        remote: &RemoteCertificate,
        today: NaiveDate,
    ) -> Result<MergeOutcome, SyncError> {
        let local = self.store.sync_metadata(&remote.client_id).await?;
        let local_updated_at = local.map(|m| m.local_updated_at);
        if resolve(local_updated_at, remote.client_updated_at) == Resolution::KeepLocal {
            debug!(client_id = %remote.client_id, "Local copy is newer, keeping it");
            return Ok(MergeOutcome::KeptLocal);
        }

        let certificate = remote.to_certificate(today, self.config.notice_days)?;
        let file = if remote.has_file_data
            && !self.store.has_certificate_file(&remote.client_id).await?
        {
            self.remote.fetch_certificate_file(&remote.id).await?
        } else {
            None
        };

        self.store
            .apply_remote(&certificate, file.as_deref(), remote.client_updated_at)
            .await?;
        Ok(MergeOutcome::Applied {
            file_downloaded: file.is_some(),
        })
    }

    /// Save locally, then trigger a background sync pass.
    ///
    /// The local save is the only part that can fail the call.
    pub async fn upload_certificate(
        self: &Arc<Self>,
        certificate: &Certificate,
        file: Option<&[u8]>,
    ) -> Result<LocalCertificate, SyncError> {
        let saved = self.store.save_certificate(certificate, file).await?;
        self.trigger_sync();
        Ok(saved)
    }

    /// Spawn a sync pass without waiting for it.
    ///
    /// The task can be awaited later with
    /// [`SyncOrchestrator::finish_background_sync`].
    pub fn trigger_sync(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            match this.sync().await {
                Ok(outcome) => {
                    debug!(?outcome, "Background sync finished");
                    Some(outcome)
                }
                Err(e) => {
                    warn!(error = %e, "Background sync failed");
                    None
                }
            }
        });
        *self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// Wait for the most recently triggered background pass.
    ///
    /// Returns `None` when nothing was triggered or the pass failed.
    pub async fn finish_background_sync(&self) -> Option<SyncOutcome> {
        let task = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Background sync task ended abnormally");
                None
            }
        }
    }

    /// Delete locally, then best-effort on the backend.
    pub async fn delete_certificate(&self, id: &str) -> Result<bool, SyncError> {
        let deleted = self.store.delete_certificate(id).await?;

        match self.remote.current_session().await {
            Ok(Some(_)) => {
                if let Err(e) = self.remote.delete_certificate_by_client_id(id).await {
                    warn!(id, error = %e, "Failed to delete certificate from backend");
                }
            }
            Ok(None) => debug!(id, "No session, remote delete skipped"),
            Err(e) => warn!(id, error = %e, "Backend unavailable, remote delete skipped"),
        }
        Ok(deleted)
    }

    pub async fn get_certificates(&self) -> Result<Vec<LocalCertificate>, SyncError> {
        Ok(self.store.get_all_certificates().await?)
    }

    pub async fn get_certificate(&self, id: &str) -> Result<Option<LocalCertificate>, SyncError> {
        Ok(self.store.get_certificate(id).await?)
    }

    pub async fn get_certificate_file(&self, id: &str) -> Result<Option<Vec<u8>>, SyncError> {
        Ok(self.store.get_certificate_file(id).await?)
    }

    fn spawn_periodic(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut failures: u32 = 0;
            let mut first = true;

            loop {
                let delay = if first {
                    std::time::Duration::ZERO
                } else if failures == 0 {
                    this.config.interval
                } else {
                    this.config.retry.delay_for_attempt(failures - 1)
                };
                first = false;

                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {
                        info!("Sync task shutting down");
                        return;
                    }
                }

                match this.sync().await {
                    Ok(SyncOutcome::Completed(report)) if report.has_failures() => {
                        failures = failures.saturating_add(1);
                        debug!(failures, "Partial sync, backing off");
                    }
                    Ok(SyncOutcome::Completed(_)) => failures = 0,
                    Ok(SyncOutcome::Skipped(reason)) => debug!(?reason, "Sync tick skipped"),
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        warn!(error = %e, failures, "Sync pass failed");
                    }
                }
            }
        })
    }
}
