//! Certificate domain model shared by the store, the sync layer and the CLI.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Days before expiry at which a certificate counts as `upcoming`.
pub const DEFAULT_NOTICE_DAYS: i64 = 30;

/// Certificate category. Closed set; anything else is rejected on parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "STCW")]
    Stcw,
    #[serde(rename = "GWO")]
    Gwo,
    #[serde(rename = "OPITO")]
    Opito,
    Contracts,
    Other,
}

impl Category {
    pub const ALL: [Self; 5] = [
        Self::Stcw,
        Self::Gwo,
        Self::Opito,
        Self::Contracts,
        Self::Other,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stcw => "STCW",
            Self::Gwo => "GWO",
            Self::Opito => "OPITO",
            Self::Contracts => "Contracts",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidValue {
                field: "category",
                value: s.to_string(),
            })
    }
}

/// Expiry classification.
///
/// The value stored alongside a certificate is only a hint; call
/// [`CertificateStatus::derive`] against today's date for the real answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Valid,
    Expired,
    Upcoming,
}

impl CertificateStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Expired => "expired",
            Self::Upcoming => "upcoming",
        }
    }

    /// Classify an expiry date relative to `today`.
    ///
    /// Expired strictly after the expiry day; upcoming while at most
    /// `notice_days` days remain.
    pub fn derive(expiry: NaiveDate, today: NaiveDate, notice_days: i64) -> Self {
        let remaining = (expiry - today).num_days();
        if remaining < 0 {
            Self::Expired
        } else if remaining <= notice_days {
            Self::Upcoming
        } else {
            Self::Valid
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "valid" => Ok(Self::Valid),
            "expired" => Ok(Self::Expired),
            "upcoming" => Ok(Self::Upcoming),
            other => Err(Error::InvalidValue {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// How the attached blob is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    Pdf,
    Image,
}

impl FileType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pdf" => Ok(Self::Pdf),
            "image" => Ok(Self::Image),
            other => Err(Error::InvalidValue {
                field: "file_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle tag of a locally cached certificate.
///
/// `Conflict` is a valid persisted value but nothing assigns it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Local,
    Synced,
    Pending,
    Conflict,
}

impl SyncStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Self::Local),
            "synced" => Ok(Self::Synced),
            "pending" => Ok(Self::Pending),
            "conflict" => Ok(Self::Conflict),
            other => Err(Error::InvalidValue {
                field: "sync_status",
                value: other.to_string(),
            }),
        }
    }
}

/// A professional certificate as seen by the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Client-generated identifier, also the remote `client_id`.
    pub id: String,
    pub name: String,
    pub serial_number: String,
    pub category: Category,
    pub issue_date: NaiveDate,
    pub expiry_date: NaiveDate,
    /// Cached classification; may be stale.
    pub status: CertificateStatus,
    #[serde(default)]
    pub file_type: FileType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Transient viewer URL, never persisted.
    #[serde(default, skip_serializing)]
    pub file_url: Option<String>,
}

impl Certificate {
    /// Status derived from the expiry date, ignoring the cached field.
    pub fn current_status(&self, today: NaiveDate, notice_days: i64) -> CertificateStatus {
        CertificateStatus::derive(self.expiry_date, today, notice_days)
    }

    /// Whole days from `today` until expiry; negative once expired.
    pub fn days_until_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiry_date - today).num_days()
    }

    /// Refresh the cached status hint.
    pub fn refresh_status(&mut self, today: NaiveDate, notice_days: i64) {
        self.status = self.current_status(today, notice_days);
    }
}

/// A certificate together with its local sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalCertificate {
    #[serde(flatten)]
    pub certificate: Certificate,
    pub sync_status: SyncStatus,
    /// Last local mutation, or the remote timestamp of an adopted record.
    pub local_updated_at: DateTime<Utc>,
}

impl LocalCertificate {
    pub fn id(&self) -> &str {
        &self.certificate.id
    }

    pub fn into_certificate(self) -> Certificate {
        self.certificate
    }
}

/// Parse an ISO 8601 calendar date.
///
/// Accepts a bare `YYYY-MM-DD` or a full timestamp, whose time part is dropped.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let day = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| Error::InvalidDate {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn category_round_trips_through_str() {
        for c in Category::ALL {
            assert_eq!(c.as_str().parse::<Category>().unwrap(), c);
        }
    }

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!("stcw".parse::<Category>().unwrap(), Category::Stcw);
        assert_eq!("contracts".parse::<Category>().unwrap(), Category::Contracts);
    }

    #[test]
    fn unknown_category_rejected() {
        let err = "Medical".parse::<Category>().unwrap_err();
        assert!(matches!(err, Error::InvalidValue { field: "category", .. }));
    }

    #[test]
    fn category_serializes_with_wire_names() {
        let json = serde_json::to_string(&Category::Opito).unwrap();
        assert_eq!(json, "\"OPITO\"");
        let back: Category = serde_json::from_str("\"Contracts\"").unwrap();
        assert_eq!(back, Category::Contracts);
    }

    #[test]
    fn status_expired_after_expiry_day() {
        let today = date("2024-06-16");
        assert_eq!(
            CertificateStatus::derive(date("2024-06-15"), today, DEFAULT_NOTICE_DAYS),
            CertificateStatus::Expired
        );
    }

    #[test]
    fn status_upcoming_within_notice_window() {
        let today = date("2024-06-01");
        assert_eq!(
            CertificateStatus::derive(date("2024-06-01"), today, 30),
            CertificateStatus::Upcoming
        );
        assert_eq!(
            CertificateStatus::derive(date("2024-07-01"), today, 30),
            CertificateStatus::Upcoming
        );
        assert_eq!(
            CertificateStatus::derive(date("2024-07-02"), today, 30),
            CertificateStatus::Valid
        );
    }

    #[test]
    fn stale_status_hint_is_ignored() {
        let cert = Certificate {
            id: "c1".into(),
            name: "Basic Fire Fighting".into(),
            serial_number: "BFF-2023-001".into(),
            category: Category::Stcw,
            issue_date: date("2019-01-15"),
            expiry_date: date("2024-01-15"),
            status: CertificateStatus::Valid,
            file_type: FileType::Pdf,
            file_path: None,
            file_url: None,
        };
        assert_eq!(
            cert.current_status(date("2025-01-01"), DEFAULT_NOTICE_DAYS),
            CertificateStatus::Expired
        );
        assert_eq!(cert.days_until_expiry(date("2024-01-10")), 5);
    }

    #[test]
    fn parse_date_accepts_timestamp_prefix() {
        assert_eq!(date("2024-01-05T00:00:00Z"), date("2024-01-05"));
        assert!(parse_date("05/01/2024").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn sync_status_parse_rejects_unknown() {
        assert_eq!("pending".parse::<SyncStatus>().unwrap(), SyncStatus::Pending);
        assert!("dirty".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn file_url_is_not_serialized() {
        let cert = Certificate {
            id: "c1".into(),
            name: "n".into(),
            serial_number: "s".into(),
            category: Category::Other,
            issue_date: date("2024-01-01"),
            expiry_date: date("2025-01-01"),
            status: CertificateStatus::Valid,
            file_type: FileType::Image,
            file_path: None,
            file_url: Some("blob:abc".into()),
        };
        let json = serde_json::to_string(&cert).unwrap();
        assert!(!json.contains("blob:abc"));
    }
}
