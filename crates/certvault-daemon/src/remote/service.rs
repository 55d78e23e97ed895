//! The backend seen by the sync orchestrator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::client::RemoteError;
use super::types::{CertificateUpload, RemoteCertificate, RemoteSession};

/// Operations the orchestrator needs from the hosted backend.
///
/// Implemented by [`super::SupabaseClient`]; tests substitute an in-memory fake.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// The signed-in session, or `None` when unauthenticated.
    async fn current_session(&self) -> Result<Option<RemoteSession>, RemoteError>;

    /// Create a new anonymous user and make it the current session.
    async fn sign_in_anonymously(&self) -> Result<RemoteSession, RemoteError>;

    /// Upsert a certificate keyed by its client id.
    async fn insert_certificate(&self, upload: &CertificateUpload) -> Result<(), RemoteError>;

    /// Certificates updated after `since` (all when `None`), oldest first.
    async fn fetch_certificates_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteCertificate>, RemoteError>;

    /// Decoded file bytes for a remote row id, if it has a file.
    async fn fetch_certificate_file(&self, remote_id: &str) -> Result<Option<Vec<u8>>, RemoteError>;

    async fn delete_certificate_by_client_id(&self, client_id: &str) -> Result<(), RemoteError>;
}

/// Backend stand-in used when no remote is configured.
///
/// Never has a session, so the orchestrator stays in offline mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineRemote;

#[async_trait]
impl RemoteService for OfflineRemote {
    async fn current_session(&self) -> Result<Option<RemoteSession>, RemoteError> {
        Ok(None)
    }

    async fn sign_in_anonymously(&self) -> Result<RemoteSession, RemoteError> {
        Err(RemoteError::Config("no remote backend configured".into()))
    }

    async fn insert_certificate(&self, _upload: &CertificateUpload) -> Result<(), RemoteError> {
        Err(RemoteError::Unauthenticated)
    }

    async fn fetch_certificates_since(
        &self,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteCertificate>, RemoteError> {
        Err(RemoteError::Unauthenticated)
    }

    async fn fetch_certificate_file(&self, _remote_id: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        Err(RemoteError::Unauthenticated)
    }

    async fn delete_certificate_by_client_id(&self, _client_id: &str) -> Result<(), RemoteError> {
        Err(RemoteError::Unauthenticated)
    }
}
