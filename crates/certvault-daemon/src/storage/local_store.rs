//! Encrypted certificate store.
//!
//! Wraps [`Database`] with a [`LocalCipher`]: names, serial numbers and file
//! blobs are sealed before they reach `SQLite` and opened on the way out.

use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use certvault_core::db::{datetime_from_millis, unix_millis};
use certvault_core::model::parse_date;
use certvault_core::{Certificate, LocalCertificate, SyncStatus};
use certvault_crypto::{CryptoError, LocalCipher};

use super::db::{Database, DatabaseError};
use super::models::{CertificateRow, FileRow, SyncMetadata};

const DOWNLOAD_CURSOR_KEY: &str = "download_cursor";

/// Local store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Encryption error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Invalid stored value: {0}")]
    Model(#[from] certvault_core::Error),
}

/// Encrypted local certificate store.
#[derive(Clone)]
pub struct LocalStore {
    db: Database,
    cipher: LocalCipher,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").finish_non_exhaustive()
    }
}

impl LocalStore {
    pub const fn new(db: Database, cipher: LocalCipher) -> Self {
        Self { db, cipher }
    }

    /// Open (or create) the store at `path`.
    pub async fn open(path: &Path, cipher: LocalCipher) -> Result<Self, StoreError> {
        let db = Database::open(path).await?;
        Ok(Self::new(db, cipher))
    }

    /// In-memory store for tests.
    pub async fn open_in_memory(cipher: LocalCipher) -> Result<Self, StoreError> {
        let db = Database::open_in_memory().await?;
        Ok(Self::new(db, cipher))
    }

    /// Make sure the schema is current. Safe to call repeatedly.
    pub async fn init(&self) -> Result<(), StoreError> {
        self.db.run_migrations().await?;
        Ok(())
    }

    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Save a locally edited certificate and mark it pending.
    ///
    /// Without `file_data` an existing blob is left untouched.
    pub async fn save_certificate(
        &self,
        certificate: &Certificate,
        file_data: Option<&[u8]>,
    ) -> Result<LocalCertificate, StoreError> {
        let mut certificate = certificate.clone();
        if file_data.is_some() && certificate.file_path.is_none() {
            certificate.file_path = Some(file_path_for(&certificate.id));
        }

        let row = self.seal_row(&certificate, SyncStatus::Pending, unix_millis())?;
        let file = file_data
            .map(|data| self.seal_file(&certificate, data))
            .transpose()?;

        let stamp = self.db.save_certificate_row(&row, file.as_ref()).await?;
        let local_updated_at = datetime_from_millis(stamp)?;

        debug!(
            id = %certificate.id,
            has_file = file.is_some(),
            "Certificate saved locally"
        );

        Ok(LocalCertificate {
            certificate,
            sync_status: SyncStatus::Pending,
            local_updated_at,
        })
    }

    /// Write a record adopted from the remote as synced.
    ///
    /// `local_updated_at` is set to the remote timestamp so the next merge
    /// compares like with like.
    pub async fn apply_remote(
        &self,
        certificate: &Certificate,
        file_data: Option<&[u8]>,
        remote_updated_at: DateTime<Utc>,
    ) -> Result<LocalCertificate, StoreError> {
        let mut certificate = certificate.clone();
        certificate.file_url = None;

        let row = self.seal_row(
            &certificate,
            SyncStatus::Synced,
            remote_updated_at.timestamp_millis(),
        )?;
        let file = file_data
            .map(|data| self.seal_file(&certificate, data))
            .transpose()?;

        self.db.replace_certificate_row(&row, file.as_ref()).await?;
        debug!(id = %certificate.id, "Remote certificate applied");

        Ok(LocalCertificate {
            certificate,
            sync_status: SyncStatus::Synced,
            local_updated_at: datetime_from_millis(row.local_updated_at)?,
        })
    }

    pub async fn get_certificate(&self, id: &str) -> Result<Option<LocalCertificate>, StoreError> {
        self.db
            .get_certificate_row(id)
            .await?
            .map(|row| self.open_row(row))
            .transpose()
    }

    pub async fn get_all_certificates(&self) -> Result<Vec<LocalCertificate>, StoreError> {
        let rows = self.db.list_certificate_rows().await?;
        rows.into_iter().map(|row| self.open_row(row)).collect()
    }

    /// Decrypted file bytes, if a file is stored.
    pub async fn get_certificate_file(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(row) = self.db.get_file_row(id).await? else {
            return Ok(None);
        };
        Ok(Some(self.cipher.decrypt_file(&row.encrypted_data)?))
    }

    pub async fn has_certificate_file(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.db.file_exists(id).await?)
    }

    /// Delete a certificate and its file. A missing id returns `false`.
    pub async fn delete_certificate(&self, id: &str) -> Result<bool, StoreError> {
        let deleted = self.db.delete_certificate(id).await?;
        if deleted {
            info!(id, "Certificate deleted locally");
        } else {
            debug!(id, "Delete of unknown certificate ignored");
        }
        Ok(deleted)
    }

    pub async fn update_sync_status(&self, id: &str, status: SyncStatus) -> Result<(), StoreError> {
        let affected = self.db.update_sync_status(id, status).await?;
        if affected == 0 {
            warn!(id, status = %status, "Sync status update for unknown certificate");
        }
        Ok(())
    }

    /// Mark a certificate synced unless it changed after `uploaded_at`.
    pub async fn mark_synced(
        &self,
        id: &str,
        uploaded_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let marked = self
            .db
            .mark_synced(id, uploaded_at.timestamp_millis())
            .await?;
        if !marked {
            debug!(id, "Certificate changed during upload, left pending");
        }
        Ok(marked)
    }

    pub async fn get_pending_certificates(&self) -> Result<Vec<LocalCertificate>, StoreError> {
        self.certificates_with_status(SyncStatus::Pending).await
    }

    pub async fn get_conflicted_certificates(&self) -> Result<Vec<LocalCertificate>, StoreError> {
        self.certificates_with_status(SyncStatus::Conflict).await
    }

    pub async fn count_conflicted(&self) -> Result<u64, StoreError> {
        let count = self.db.count_by_sync_status(SyncStatus::Conflict).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Sync status and timestamp of a certificate, without decrypting it.
    pub async fn sync_metadata(&self, id: &str) -> Result<Option<SyncMetadata>, StoreError> {
        let Some((status, millis)) = self.db.get_sync_columns(id).await? else {
            return Ok(None);
        };
        Ok(Some(SyncMetadata {
            sync_status: status.parse()?,
            local_updated_at: datetime_from_millis(millis)?,
        }))
    }

    /// Remote `updated_at` of the newest record already merged.
    pub async fn download_cursor(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let Some(value) = self.db.get_sync_state(DOWNLOAD_CURSOR_KEY).await? else {
            return Ok(None);
        };
        let cursor = DateTime::parse_from_rfc3339(&value)
            .map_err(|e| DatabaseError::Corrupt(format!("download cursor {value:?}: {e}")))?;
        Ok(Some(cursor.with_timezone(&Utc)))
    }

    pub async fn set_download_cursor(&self, cursor: DateTime<Utc>) -> Result<(), StoreError> {
        self.db
            .set_sync_state(DOWNLOAD_CURSOR_KEY, &cursor.to_rfc3339())
            .await?;
        Ok(())
    }

    async fn certificates_with_status(
        &self,
        status: SyncStatus,
    ) -> Result<Vec<LocalCertificate>, StoreError> {
        let rows = self.db.list_certificate_rows_by_sync_status(status).await?;
        rows.into_iter().map(|row| self.open_row(row)).collect()
    }

    fn seal_row(
        &self,
        certificate: &Certificate,
        sync_status: SyncStatus,
        local_updated_at: i64,
    ) -> Result<CertificateRow, StoreError> {
        Ok(CertificateRow {
            id: certificate.id.clone(),
            name_enc: self.cipher.encrypt(&certificate.name)?,
            serial_number_enc: self.cipher.encrypt(&certificate.serial_number)?,
            category: certificate.category.as_str().to_string(),
            issue_date: certificate.issue_date.to_string(),
            expiry_date: certificate.expiry_date.to_string(),
            status: certificate.status.as_str().to_string(),
            file_type: certificate.file_type.as_str().to_string(),
            file_path: certificate.file_path.clone(),
            sync_status: sync_status.as_str().to_string(),
            local_updated_at,
        })
    }

    fn seal_file(&self, certificate: &Certificate, data: &[u8]) -> Result<FileRow, StoreError> {
        Ok(FileRow {
            certificate_id: certificate.id.clone(),
            encrypted_data: self.cipher.encrypt_file(data)?,
            file_type: certificate.file_type.as_str().to_string(),
            size: i64::try_from(data.len()).unwrap_or(i64::MAX),
        })
    }

    fn open_row(&self, row: CertificateRow) -> Result<LocalCertificate, StoreError> {
        let certificate = Certificate {
            name: self.cipher.decrypt(&row.name_enc)?,
            serial_number: self.cipher.decrypt(&row.serial_number_enc)?,
            category: row.category.parse()?,
            issue_date: parse_date(&row.issue_date)?,
            expiry_date: parse_date(&row.expiry_date)?,
            status: row.status.parse()?,
            file_type: row.file_type.parse()?,
            file_path: row.file_path,
            file_url: None,
            id: row.id,
        };
        Ok(LocalCertificate {
            certificate,
            sync_status: row.sync_status.parse()?,
            local_updated_at: datetime_from_millis(row.local_updated_at)?,
        })
    }
}

/// Logical path recorded for a stored blob.
pub fn file_path_for(id: &str) -> String {
    format!("/certificates/{id}")
}
