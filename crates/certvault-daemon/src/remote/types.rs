//! Request and response types for the hosted backend.
//!
//! Field names follow the `PostgREST` view and RPC signatures on the server.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use certvault_core::model::parse_date;
use certvault_core::{Certificate, CertificateStatus, FileType, LocalCertificate};

use crate::storage::file_path_for;

/// Authenticated session with the backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSession {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl RemoteSession {
    /// Whether the access token is expired, or expires within `leeway_secs`.
    pub fn is_expired(&self, now: DateTime<Utc>, leeway_secs: i64) -> bool {
        self.expires_at <= now + chrono::Duration::seconds(leeway_secs)
    }
}

/// `GoTrue` user object (subset of fields).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// `GoTrue` token response from signup or refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl TokenResponse {
    pub fn into_session(self, now: DateTime<Utc>) -> RemoteSession {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(|| now + chrono::Duration::seconds(self.expires_in.unwrap_or(3600)));
        RemoteSession {
            user_id: self.user.id,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

/// Parameters of the `insert_certificate` RPC.
///
/// The server encrypts name, serial number and file data on its side and
/// upserts on `client_id`.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateUpload {
    #[serde(rename = "p_name")]
    pub name: String,
    #[serde(rename = "p_serial_number")]
    pub serial_number: String,
    #[serde(rename = "p_category")]
    pub category: String,
    #[serde(rename = "p_issue_date")]
    pub issue_date: NaiveDate,
    #[serde(rename = "p_expiry_date")]
    pub expiry_date: NaiveDate,
    #[serde(rename = "p_file_type")]
    pub file_type: String,
    #[serde(rename = "p_file_size")]
    pub file_size: Option<u64>,
    #[serde(rename = "p_client_id")]
    pub client_id: String,
    #[serde(rename = "p_client_updated_at")]
    pub client_updated_at: String,
    #[serde(rename = "p_file_data")]
    pub file_data: Option<String>,
}

impl CertificateUpload {
    /// Build the upload for a local record, stamped with its local edit time.
    pub fn new(local: &LocalCertificate, file: Option<&[u8]>) -> Self {
        let cert = &local.certificate;
        Self {
            name: cert.name.clone(),
            serial_number: cert.serial_number.clone(),
            category: cert.category.as_str().to_string(),
            issue_date: cert.issue_date,
            expiry_date: cert.expiry_date,
            file_type: cert.file_type.as_str().to_string(),
            file_size: file.map(|data| data.len() as u64),
            client_id: cert.id.clone(),
            client_updated_at: format_timestamp(local.local_updated_at),
            file_data: file.map(|data| STANDARD.encode(data)),
        }
    }
}

/// Row of the `certificates_decrypted` view.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteCertificate {
    /// Server-side row id.
    pub id: String,
    /// The local certificate id this row was uploaded from.
    pub client_id: String,
    pub name: String,
    pub serial_number: String,
    pub category: String,
    pub issue_date: String,
    pub expiry_date: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub has_file_data: bool,
    pub client_updated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RemoteCertificate {
    /// Convert to the local shape.
    ///
    /// A missing or unknown status is re-derived from the expiry date; an
    /// unknown category is an error.
    pub fn to_certificate(
        &self,
        today: NaiveDate,
        notice_days: i64,
    ) -> certvault_core::Result<Certificate> {
        let expiry_date = parse_date(&self.expiry_date)?;
        let status = self
            .status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| CertificateStatus::derive(expiry_date, today, notice_days));
        let file_type = match self.file_type.as_deref() {
            Some(s) => s.parse()?,
            None => FileType::default(),
        };

        Ok(Certificate {
            id: self.client_id.clone(),
            name: self.name.clone(),
            serial_number: self.serial_number.clone(),
            category: self.category.parse()?,
            issue_date: parse_date(&self.issue_date)?,
            expiry_date,
            status,
            file_type,
            file_path: Some(file_path_for(&self.client_id)),
            file_url: None,
        })
    }
}

/// Body of the `get_certificate_file` RPC.
#[derive(Debug, Clone, Serialize)]
pub struct FileRequest<'a> {
    pub p_certificate_id: &'a str,
}

/// RFC 3339 with a `Z` suffix, safe to embed in a query string.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
