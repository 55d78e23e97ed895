//! Database models for the CertVault daemon.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use certvault_core::SyncStatus;

/// Certificate record as stored: name and serial number are ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CertificateRow {
    pub id: String,
    pub name_enc: String,
    pub serial_number_enc: String,
    pub category: String,
    pub issue_date: String,
    pub expiry_date: String,
    pub status: String,
    pub file_type: String,
    pub file_path: Option<String>,
    pub sync_status: String,
    /// Unix milliseconds.
    pub local_updated_at: i64,
}

/// Encrypted file blob record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileRow {
    pub certificate_id: String,
    pub encrypted_data: String,
    pub file_type: String,
    /// Plaintext size in bytes.
    pub size: i64,
}

/// Sync bookkeeping of one certificate, readable without the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncMetadata {
    pub sync_status: SyncStatus,
    pub local_updated_at: DateTime<Utc>,
}
