//! In-memory application state.
//!
//! `CertificateState` is what a front-end holds: the current certificate
//! list plus UI selection, published through a `watch` channel. Writes go
//! through the sync orchestrator so the local store stays the source of truth.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use certvault_core::{Category, Certificate, CertificateStatus, FileType, LocalCertificate};

use crate::sync::{SyncError, SyncOrchestrator};

/// Application state errors.
#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Certificate not found: {0}")]
    NotFound(String),

    #[error("Invalid certificate: {0}")]
    Invalid(String),
}

/// Published view of the application state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    pub certificates: Vec<LocalCertificate>,
    /// Selected certificate ids, in selection order.
    pub selected: Vec<String>,
    pub current_viewing: Option<String>,
}

impl StateSnapshot {
    pub fn get(&self, id: &str) -> Option<&LocalCertificate> {
        self.certificates.iter().find(|c| c.id() == id)
    }

    fn retain_known_ids(&mut self) {
        let certificates = &self.certificates;
        self.selected
            .retain(|id| certificates.iter().any(|c| c.id() == id));
        if let Some(id) = &self.current_viewing {
            if !certificates.iter().any(|c| c.id() == id) {
                self.current_viewing = None;
            }
        }
    }
}

/// Input for a new certificate; id and status are filled in.
#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub name: String,
    pub serial_number: String,
    pub category: Category,
    pub issue_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub file_type: FileType,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct CertificateUpdate {
    pub name: Option<String>,
    pub serial_number: Option<String>,
    pub category: Option<Category>,
    pub issue_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub file_type: Option<FileType>,
}

impl CertificateUpdate {
    fn apply(self, cert: &mut Certificate) {
        if let Some(name) = self.name {
            cert.name = name;
        }
        if let Some(serial_number) = self.serial_number {
            cert.serial_number = serial_number;
        }
        if let Some(category) = self.category {
            cert.category = category;
        }
        if let Some(issue_date) = self.issue_date {
            cert.issue_date = issue_date;
        }
        if let Some(expiry_date) = self.expiry_date {
            cert.expiry_date = expiry_date;
        }
        if let Some(file_type) = self.file_type {
            cert.file_type = file_type;
        }
    }
}

/// Counts by derived status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub valid: usize,
    pub expired: usize,
    pub upcoming: usize,
    pub total: usize,
}

/// Shared certificate state backed by the sync orchestrator.
#[derive(Debug)]
pub struct CertificateState {
    orchestrator: Arc<SyncOrchestrator>,
    tx: watch::Sender<StateSnapshot>,
}

impl CertificateState {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        let (tx, _rx) = watch::channel(StateSnapshot::default());
        Self { orchestrator, tx }
    }

    pub const fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    fn notice_days(&self) -> i64 {
        self.orchestrator.config().notice_days
    }

    /// Reload the certificate list from the local store.
    pub async fn load(&self) -> Result<(), StateError> {
        let mut certificates = self.orchestrator.get_certificates().await?;
        certificates.sort_by(|a, b| {
            a.certificate
                .expiry_date
                .cmp(&b.certificate.expiry_date)
                .then_with(|| a.certificate.name.cmp(&b.certificate.name))
        });
        debug!(count = certificates.len(), "Certificate state loaded");
        self.tx.send_modify(|state| {
            state.certificates = certificates;
            state.retain_known_ids();
        });
        Ok(())
    }

    /// Reload whenever a sync pass changes the store.
    ///
    /// The task holds only a weak reference and ends once the state is
    /// dropped or the orchestrator goes away.
    pub fn follow_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let mut reports = self.orchestrator.subscribe_reports();
        let state = Arc::downgrade(self);
        tokio::spawn(async move {
            while reports.changed().await.is_ok() {
                let changed = reports
                    .borrow_and_update()
                    .as_ref()
                    .is_some_and(|r| r.downloaded > 0 || r.uploaded > 0);
                if !changed {
                    continue;
                }
                let Some(state) = state.upgrade() else {
                    break;
                };
                if let Err(e) = state.load().await {
                    warn!(error = %e, "Failed to reload certificates after sync");
                }
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.tx.borrow().clone()
    }

    /// Create a certificate with a fresh id and derived status.
    pub async fn add_certificate(
        &self,
        new: NewCertificate,
        file: Option<&[u8]>,
    ) -> Result<LocalCertificate, StateError> {
        validate(&new.name, new.issue_date, new.expiry_date)?;
        let today = Utc::now().date_naive();
        let certificate = Certificate {
            id: uuid::Uuid::new_v4().to_string(),
            status: CertificateStatus::derive(new.expiry_date, today, self.notice_days()),
            name: new.name,
            serial_number: new.serial_number,
            category: new.category,
            issue_date: new.issue_date,
            expiry_date: new.expiry_date,
            file_type: new.file_type,
            file_path: None,
            file_url: None,
        };

        let saved = self
            .orchestrator
            .upload_certificate(&certificate, file)
            .await?;
        self.upsert_in_snapshot(saved.clone());
        Ok(saved)
    }

    /// Apply a partial update; the status is re-derived.
    pub async fn update_certificate(
        &self,
        id: &str,
        update: CertificateUpdate,
        file: Option<&[u8]>,
    ) -> Result<LocalCertificate, StateError> {
        let mut certificate = self
            .orchestrator
            .get_certificate(id)
            .await?
            .ok_or_else(|| StateError::NotFound(id.to_string()))?
            .into_certificate();

        update.apply(&mut certificate);
        validate(
            &certificate.name,
            certificate.issue_date,
            certificate.expiry_date,
        )?;
        certificate.refresh_status(Utc::now().date_naive(), self.notice_days());

        let saved = self
            .orchestrator
            .upload_certificate(&certificate, file)
            .await?;
        self.upsert_in_snapshot(saved.clone());
        Ok(saved)
    }

    /// Delete a certificate and drop it from the selection and the viewer.
    pub async fn delete_certificate(&self, id: &str) -> Result<bool, StateError> {
        let deleted = self.orchestrator.delete_certificate(id).await?;
        self.tx.send_modify(|state| {
            state.certificates.retain(|c| c.id() != id);
            state.retain_known_ids();
        });
        Ok(deleted)
    }

    /// Add or remove an id from the selection. Unknown ids are ignored.
    pub fn toggle_selection(&self, id: &str) {
        self.tx.send_if_modified(|state| {
            if let Some(pos) = state.selected.iter().position(|s| s == id) {
                state.selected.remove(pos);
                true
            } else if state.get(id).is_some() {
                state.selected.push(id.to_string());
                true
            } else {
                false
            }
        });
    }

    pub fn clear_selection(&self) {
        self.tx.send_if_modified(|state| {
            let changed = !state.selected.is_empty();
            state.selected.clear();
            changed
        });
    }

    /// Set the certificate being viewed. Returns `false` for an unknown id.
    pub fn set_current_viewing(&self, id: Option<&str>) -> bool {
        let mut accepted = true;
        self.tx.send_if_modified(|state| {
            let next = match id {
                Some(id) if state.get(id).is_none() => {
                    accepted = false;
                    return false;
                }
                other => other.map(str::to_string),
            };
            let changed = state.current_viewing != next;
            state.current_viewing = next;
            changed
        });
        accepted
    }

    pub fn current_viewing(&self) -> Option<LocalCertificate> {
        let state = self.tx.borrow();
        state
            .current_viewing
            .as_deref()
            .and_then(|id| state.get(id))
            .cloned()
    }

    pub fn selected_certificates(&self) -> Vec<LocalCertificate> {
        let state = self.tx.borrow();
        state
            .selected
            .iter()
            .filter_map(|id| state.get(id).cloned())
            .collect()
    }

    pub fn certificates_by_category(&self, category: Category) -> Vec<LocalCertificate> {
        self.tx
            .borrow()
            .certificates
            .iter()
            .filter(|c| c.certificate.category == category)
            .cloned()
            .collect()
    }

    /// Counts by status derived against `today`, ignoring the stored hint.
    pub fn statistics(&self, today: NaiveDate) -> Statistics {
        let notice_days = self.notice_days();
        let state = self.tx.borrow();
        let mut stats = Statistics {
            total: state.certificates.len(),
            ..Statistics::default()
        };
        for c in &state.certificates {
            match c.certificate.current_status(today, notice_days) {
                CertificateStatus::Valid => stats.valid += 1,
                CertificateStatus::Expired => stats.expired += 1,
                CertificateStatus::Upcoming => stats.upcoming += 1,
            }
        }
        stats
    }

    /// Certificates expiring between `today` and `today + days`, soonest first.
    pub fn expiring_within(&self, days: i64, today: NaiveDate) -> Vec<LocalCertificate> {
        let mut expiring: Vec<LocalCertificate> = self
            .tx
            .borrow()
            .certificates
            .iter()
            .filter(|c| (0..=days).contains(&c.certificate.days_until_expiry(today)))
            .cloned()
            .collect();
        expiring.sort_by_key(|c| c.certificate.expiry_date);
        expiring
    }

    fn upsert_in_snapshot(&self, saved: LocalCertificate) {
        self.tx.send_modify(|state| {
            match state.certificates.iter_mut().find(|c| c.id() == saved.id()) {
                Some(existing) => *existing = saved,
                None => state.certificates.push(saved),
            }
        });
    }
}

fn validate(name: &str, issue_date: NaiveDate, expiry_date: NaiveDate) -> Result<(), StateError> {
    if name.trim().is_empty() {
        return Err(StateError::Invalid("name is empty".into()));
    }
    if expiry_date < issue_date {
        return Err(StateError::Invalid(format!(
            "expiry date {expiry_date} is before issue date {issue_date}"
        )));
    }
    Ok(())
}
