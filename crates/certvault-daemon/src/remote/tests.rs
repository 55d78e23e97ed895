//! Tests for the Supabase client and wire types.

#![allow(clippy::unwrap_used)]

use chrono::{NaiveDate, TimeZone, Utc};

use certvault_core::config::RemoteConfig;
use certvault_core::{
    Category, Certificate, CertificateStatus, FileType, LocalCertificate, SyncStatus,
};

use super::client::{RemoteError, SupabaseClient, error_message};
use super::session::SessionStore;
use super::types::{CertificateUpload, RemoteCertificate, RemoteSession, TokenResponse};

fn config(url: &str, key: &str) -> RemoteConfig {
    RemoteConfig {
        url: Some(url.into()),
        anon_key: Some(key.into()),
        request_timeout_secs: 5,
    }
}

fn client() -> SupabaseClient {
    SupabaseClient::new(&config("https://abc.supabase.co/", "anon"), None).unwrap()
}

// =============================================================================
// Client construction tests
// =============================================================================

#[test]
fn missing_url_returns_config_error() {
    let cfg = RemoteConfig {
        url: None,
        ..config("", "anon")
    };
    let err = SupabaseClient::new(&cfg, None).unwrap_err();
    assert!(matches!(err, RemoteError::Config(_)));
}

#[test]
fn empty_anon_key_returns_config_error() {
    let err = SupabaseClient::new(&config("https://abc.supabase.co", ""), None).unwrap_err();
    assert!(matches!(err, RemoteError::Config(_)));
}

#[test]
fn trailing_slash_stripped_from_base_url() {
    let c = client();
    assert_eq!(c.auth_url("/signup"), "https://abc.supabase.co/auth/v1/signup");
    assert_eq!(
        c.rest_url("/rpc/insert_certificate"),
        "https://abc.supabase.co/rest/v1/rpc/insert_certificate"
    );
}

#[test]
fn certificates_url_without_cursor() {
    assert_eq!(
        client().certificates_url(None),
        "https://abc.supabase.co/rest/v1/certificates_decrypted?select=*&order=updated_at.asc"
    );
}

#[test]
fn certificates_url_with_cursor_uses_z_suffix() {
    let ts = Utc.with_ymd_and_hms(2024, 1, 5, 8, 30, 0).unwrap();
    let url = client().certificates_url(Some(ts));
    assert!(url.ends_with("&updated_at=gt.2024-01-05T08:30:00.000000Z"));
    assert!(!url.contains('+'));
}

// =============================================================================
// Error tests
// =============================================================================

#[test]
fn error_message_reads_known_fields() {
    assert_eq!(
        error_message(r#"{"message":"permission denied"}"#).unwrap(),
        "permission denied"
    );
    assert_eq!(
        error_message(r#"{"code":400,"msg":"Anonymous sign-ins are disabled"}"#).unwrap(),
        "Anonymous sign-ins are disabled"
    );
    assert!(error_message("<html>").is_none());
}

#[test]
fn only_client_errors_are_rejections() {
    let rejected = RemoteError::Api {
        status: 401,
        message: "bad jwt".into(),
    };
    let failed = RemoteError::Api {
        status: 503,
        message: "unavailable".into(),
    };
    assert!(rejected.is_rejected());
    assert!(!failed.is_rejected());
    assert!(!RemoteError::Unauthenticated.is_rejected());
}

// =============================================================================
// Wire type tests
// =============================================================================

fn local_certificate() -> LocalCertificate {
    LocalCertificate {
        certificate: Certificate {
            id: "c1".into(),
            name: "Basic Fire Fighting".into(),
            serial_number: "BFF-2023-001".into(),
            category: Category::Stcw,
            issue_date: NaiveDate::from_ymd_opt(2023, 1, 15).unwrap(),
            expiry_date: NaiveDate::from_ymd_opt(2028, 1, 15).unwrap(),
            status: CertificateStatus::Valid,
            file_type: FileType::Pdf,
            file_path: None,
            file_url: None,
        },
        sync_status: SyncStatus::Pending,
        local_updated_at: Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(),
    }
}

#[test]
fn upload_serializes_rpc_parameters() {
    let upload = CertificateUpload::new(&local_certificate(), Some(b"hi"));
    let json = serde_json::to_value(&upload).unwrap();

    assert_eq!(json["p_name"], "Basic Fire Fighting");
    assert_eq!(json["p_serial_number"], "BFF-2023-001");
    assert_eq!(json["p_category"], "STCW");
    assert_eq!(json["p_issue_date"], "2023-01-15");
    assert_eq!(json["p_expiry_date"], "2028-01-15");
    assert_eq!(json["p_file_type"], "pdf");
    assert_eq!(json["p_file_size"], 2);
    assert_eq!(json["p_client_id"], "c1");
    assert_eq!(json["p_client_updated_at"], "2024-01-10T00:00:00.000000Z");
    assert_eq!(json["p_file_data"], "aGk=");
}

#[test]
fn upload_without_file_sends_nulls() {
    let upload = CertificateUpload::new(&local_certificate(), None);
    let json = serde_json::to_value(&upload).unwrap();
    assert!(json["p_file_size"].is_null());
    assert!(json["p_file_data"].is_null());
}

const REMOTE_ROW: &str = r#"{
    "id": "7b1e0c2a-0000-4000-8000-000000000001",
    "client_id": "c1",
    "user_id": "u1",
    "name": "Sea Survival",
    "serial_number": "SS-1",
    "category": "GWO",
    "issue_date": "2022-05-01",
    "expiry_date": "2024-05-01",
    "status": "valid",
    "file_type": "image",
    "file_size": 2048,
    "has_file_data": true,
    "client_updated_at": "2024-01-05T00:00:00+00:00",
    "updated_at": "2024-01-05T00:00:01.123456+00:00"
}"#;

#[test]
fn deserialize_remote_certificate() {
    let row: RemoteCertificate = serde_json::from_str(REMOTE_ROW).unwrap();
    assert_eq!(row.client_id, "c1");
    assert!(row.has_file_data);
    assert_eq!(
        row.client_updated_at,
        Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap()
    );

    let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let cert = row.to_certificate(today, 30).unwrap();
    assert_eq!(cert.id, "c1");
    assert_eq!(cert.category, Category::Gwo);
    assert_eq!(cert.file_type, FileType::Image);
    assert_eq!(cert.status, CertificateStatus::Valid);
    assert_eq!(cert.file_path.as_deref(), Some("/certificates/c1"));
}

#[test]
fn remote_certificate_without_status_derives_it() {
    let json = r#"{
        "id": "r2",
        "client_id": "c2",
        "name": "n",
        "serial_number": "s",
        "category": "Other",
        "issue_date": "2020-01-01",
        "expiry_date": "2023-01-01",
        "client_updated_at": "2024-01-05T00:00:00Z",
        "updated_at": "2024-01-05T00:00:00Z"
    }"#;
    let row: RemoteCertificate = serde_json::from_str(json).unwrap();
    assert!(!row.has_file_data);

    let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let cert = row.to_certificate(today, 30).unwrap();
    assert_eq!(cert.status, CertificateStatus::Expired);
    assert_eq!(cert.file_type, FileType::Pdf);
}

#[test]
fn remote_certificate_with_unknown_category_is_rejected() {
    let mut row: RemoteCertificate = serde_json::from_str(REMOTE_ROW).unwrap();
    row.category = "Diving".into();
    let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    assert!(row.to_certificate(today, 30).is_err());
}

#[test]
fn token_response_becomes_session() {
    let json = r#"{
        "access_token": "at",
        "token_type": "bearer",
        "expires_in": 3600,
        "expires_at": 1704067200,
        "refresh_token": "rt",
        "user": {"id": "u1", "is_anonymous": true}
    }"#;
    let token: TokenResponse = serde_json::from_str(json).unwrap();
    assert!(token.user.is_anonymous);

    let session = token.into_session(Utc::now());
    assert_eq!(session.user_id, "u1");
    assert_eq!(
        session.expires_at,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    );
}

#[test]
fn session_expiry_honours_leeway() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let session = RemoteSession {
        user_id: "u1".into(),
        access_token: "at".into(),
        refresh_token: "rt".into(),
        expires_at: now + chrono::Duration::seconds(30),
    };
    assert!(!session.is_expired(now, 0));
    assert!(session.is_expired(now, 60));
}

#[test]
fn session_debug_hides_tokens() {
    let session = RemoteSession {
        user_id: "u1".into(),
        access_token: "secret-access".into(),
        refresh_token: "secret-refresh".into(),
        expires_at: Utc::now(),
    };
    let debug = format!("{session:?}");
    assert!(!debug.contains("secret"));
}

// =============================================================================
// Session store tests
// =============================================================================

#[test]
fn session_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("auth").join("session.json"));
    assert!(store.load().unwrap().is_none());

    let session = RemoteSession {
        user_id: "u1".into(),
        access_token: "at".into(),
        refresh_token: "rt".into(),
        expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
    };
    store.save(&session).unwrap();
    assert_eq!(store.load().unwrap(), Some(session));

    store.clear().unwrap();
    assert!(store.load().unwrap().is_none());
    store.clear().unwrap();
}

#[test]
fn corrupt_session_file_is_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "not json").unwrap();
    assert!(matches!(
        SessionStore::new(path).load(),
        Err(RemoteError::Decode(_))
    ));
}

#[tokio::test]
async fn no_stored_session_means_unauthenticated() {
    use super::service::RemoteService;

    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    let client = SupabaseClient::new(&config("http://127.0.0.1:9", "anon"), Some(store)).unwrap();
    assert!(client.current_session().await.unwrap().is_none());
    assert!(matches!(
        client.fetch_certificates_since(None).await,
        Err(RemoteError::Unauthenticated)
    ));
}
