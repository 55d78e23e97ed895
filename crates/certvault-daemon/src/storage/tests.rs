//! Storage layer tests for the CertVault daemon.

#![allow(clippy::unwrap_used)]

use chrono::{NaiveDate, TimeZone, Utc};

use certvault_core::{Category, Certificate, CertificateStatus, FileType, SyncStatus};
use certvault_crypto::{LocalCipher, LocalKey};

use super::{LocalStore, SCHEMA_VERSION, StoreError};

fn cipher() -> LocalCipher {
    LocalCipher::new(&LocalKey::from_bytes(&[7u8; 32]).unwrap())
}

async fn test_store() -> LocalStore {
    LocalStore::open_in_memory(cipher()).await.unwrap()
}

fn certificate(id: &str, name: &str) -> Certificate {
    Certificate {
        id: id.to_string(),
        name: name.to_string(),
        serial_number: "BFF-2023-001".to_string(),
        category: Category::Stcw,
        issue_date: NaiveDate::from_ymd_opt(2023, 1, 15).unwrap(),
        expiry_date: NaiveDate::from_ymd_opt(2028, 1, 15).unwrap(),
        status: CertificateStatus::Valid,
        file_type: FileType::Pdf,
        file_path: None,
        file_url: None,
    }
}

// === Certificate tests ===

#[tokio::test]
async fn save_and_get_round_trip() {
    let store = test_store().await;
    let saved = store
        .save_certificate(&certificate("c1", "Basic Fire Fighting"), None)
        .await
        .unwrap();

    assert_eq!(saved.sync_status, SyncStatus::Pending);

    let loaded = store.get_certificate("c1").await.unwrap().unwrap();
    assert_eq!(loaded.certificate.name, "Basic Fire Fighting");
    assert_eq!(loaded.certificate.serial_number, "BFF-2023-001");
    assert_eq!(loaded.certificate.category, Category::Stcw);
    assert_eq!(loaded.sync_status, SyncStatus::Pending);
    assert_eq!(loaded.local_updated_at, saved.local_updated_at);
}

#[tokio::test]
async fn get_missing_certificate_is_none() {
    let store = test_store().await;
    assert!(store.get_certificate("nope").await.unwrap().is_none());
    assert!(store.get_certificate_file("nope").await.unwrap().is_none());
    assert!(!store.has_certificate_file("nope").await.unwrap());
}

#[tokio::test]
async fn sensitive_fields_are_not_stored_in_cleartext() {
    let store = test_store().await;
    store
        .save_certificate(&certificate("c1", "Basic Fire Fighting"), None)
        .await
        .unwrap();

    let row = store
        .database()
        .get_certificate_row("c1")
        .await
        .unwrap()
        .unwrap();
    assert!(!row.name_enc.contains("Fire"));
    assert!(!row.serial_number_enc.contains("BFF"));
}

#[tokio::test]
async fn resave_bumps_timestamp_and_keeps_single_row() {
    let store = test_store().await;
    let first = store
        .save_certificate(&certificate("c1", "Old name"), None)
        .await
        .unwrap();
    let second = store
        .save_certificate(&certificate("c1", "New name"), None)
        .await
        .unwrap();

    assert!(second.local_updated_at > first.local_updated_at);
    let all = store.get_all_certificates().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].certificate.name, "New name");
}

// === File tests ===

#[tokio::test]
async fn file_round_trip_is_byte_exact() {
    let store = test_store().await;
    let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    let saved = store
        .save_certificate(&certificate("c1", "Sea Survival"), Some(&data))
        .await
        .unwrap();

    assert_eq!(saved.certificate.file_path.as_deref(), Some("/certificates/c1"));
    assert!(store.has_certificate_file("c1").await.unwrap());
    assert_eq!(store.get_certificate_file("c1").await.unwrap().unwrap(), data);
}

#[tokio::test]
async fn save_without_file_keeps_existing_file() {
    let store = test_store().await;
    let cert = certificate("c1", "Sea Survival");
    store.save_certificate(&cert, Some(b"%PDF-1.7")).await.unwrap();

    let mut edited = cert.clone();
    edited.name = "Sea Survival (renewed)".into();
    store.save_certificate(&edited, None).await.unwrap();

    assert_eq!(
        store.get_certificate_file("c1").await.unwrap().unwrap(),
        b"%PDF-1.7"
    );
}

#[tokio::test]
async fn delete_removes_certificate_and_file() {
    let store = test_store().await;
    store
        .save_certificate(&certificate("c1", "Sea Survival"), Some(b"bytes"))
        .await
        .unwrap();

    assert!(store.delete_certificate("c1").await.unwrap());
    assert!(store.get_certificate("c1").await.unwrap().is_none());
    assert!(!store.has_certificate_file("c1").await.unwrap());
    assert!(store.database().get_file_row("c1").await.unwrap().is_none());
}

#[tokio::test]
async fn delete_missing_certificate_is_noop() {
    let store = test_store().await;
    store
        .save_certificate(&certificate("c1", "Sea Survival"), None)
        .await
        .unwrap();

    assert!(!store.delete_certificate("other").await.unwrap());
    assert_eq!(store.get_all_certificates().await.unwrap().len(), 1);
}

async fn block_with_trigger(store: &LocalStore, sql: &str) {
    sqlx::query(sql)
        .execute(store.database().pool())
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_file_write_rolls_back_new_certificate() {
    let store = test_store().await;
    block_with_trigger(
        &store,
        "CREATE TRIGGER block_files BEFORE INSERT ON files \
         BEGIN SELECT RAISE(ABORT, 'file write blocked'); END",
    )
    .await;

    let result = store
        .save_certificate(&certificate("c1", "Fire Safety"), Some(b"abc"))
        .await;

    assert!(matches!(result, Err(StoreError::Database(_))));
    assert!(store.get_certificate("c1").await.unwrap().is_none());
    assert!(store.get_pending_certificates().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_file_write_keeps_previous_version() {
    let store = test_store().await;
    let first = store
        .save_certificate(&certificate("c1", "Fire Safety"), None)
        .await
        .unwrap();
    block_with_trigger(
        &store,
        "CREATE TRIGGER block_files BEFORE INSERT ON files \
         BEGIN SELECT RAISE(ABORT, 'file write blocked'); END",
    )
    .await;

    let result = store
        .save_certificate(&certificate("c1", "Advanced Fire Safety"), Some(b"abc"))
        .await;

    assert!(result.is_err());
    let loaded = store.get_certificate("c1").await.unwrap().unwrap();
    assert_eq!(loaded.certificate.name, "Fire Safety");
    assert_eq!(loaded.local_updated_at, first.local_updated_at);
    assert!(!store.has_certificate_file("c1").await.unwrap());
}

#[tokio::test]
async fn failed_certificate_delete_keeps_file() {
    let store = test_store().await;
    store
        .save_certificate(&certificate("c1", "Sea Survival"), Some(b"bytes"))
        .await
        .unwrap();
    block_with_trigger(
        &store,
        "CREATE TRIGGER block_delete BEFORE DELETE ON certificates \
         BEGIN SELECT RAISE(ABORT, 'delete blocked'); END",
    )
    .await;

    assert!(store.delete_certificate("c1").await.is_err());
    assert!(store.get_certificate("c1").await.unwrap().is_some());
    assert_eq!(
        store.get_certificate_file("c1").await.unwrap().unwrap(),
        b"bytes"
    );
}

// === Sync bookkeeping tests ===

#[tokio::test]
async fn pending_set_tracks_mark_synced() {
    let store = test_store().await;
    let a = store
        .save_certificate(&certificate("a", "A"), None)
        .await
        .unwrap();
    store
        .save_certificate(&certificate("b", "B"), None)
        .await
        .unwrap();

    assert_eq!(store.get_pending_certificates().await.unwrap().len(), 2);

    assert!(store.mark_synced("a", a.local_updated_at).await.unwrap());

    let pending = store.get_pending_certificates().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id(), "b");
    assert_eq!(
        store.get_certificate("a").await.unwrap().unwrap().sync_status,
        SyncStatus::Synced
    );
}

#[tokio::test]
async fn mark_synced_ignores_stale_upload() {
    let store = test_store().await;
    let uploaded = store
        .save_certificate(&certificate("a", "A"), None)
        .await
        .unwrap();
    store
        .save_certificate(&certificate("a", "A edited"), None)
        .await
        .unwrap();

    assert!(!store.mark_synced("a", uploaded.local_updated_at).await.unwrap());
    assert_eq!(store.get_pending_certificates().await.unwrap().len(), 1);
}

#[tokio::test]
async fn update_sync_status_on_missing_row_is_ok() {
    let store = test_store().await;
    store
        .update_sync_status("ghost", SyncStatus::Synced)
        .await
        .unwrap();
    assert!(store.get_all_certificates().await.unwrap().is_empty());
}

#[tokio::test]
async fn conflicted_rows_are_listed() {
    let store = test_store().await;
    store
        .save_certificate(&certificate("a", "A"), None)
        .await
        .unwrap();
    store
        .update_sync_status("a", SyncStatus::Conflict)
        .await
        .unwrap();

    let conflicted = store.get_conflicted_certificates().await.unwrap();
    assert_eq!(conflicted.len(), 1);
    assert_eq!(store.count_conflicted().await.unwrap(), 1);
    assert!(store.get_pending_certificates().await.unwrap().is_empty());
}

#[tokio::test]
async fn apply_remote_stores_synced_with_remote_timestamp() {
    let store = test_store().await;
    let remote_ts = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
    let mut cert = certificate("r1", "Remote cert");
    cert.file_path = Some("/certificates/r1".into());

    store
        .apply_remote(&cert, Some(b"remote file"), remote_ts)
        .await
        .unwrap();

    let meta = store.sync_metadata("r1").await.unwrap().unwrap();
    assert_eq!(meta.sync_status, SyncStatus::Synced);
    assert_eq!(meta.local_updated_at, remote_ts);
    assert_eq!(
        store.get_certificate_file("r1").await.unwrap().unwrap(),
        b"remote file"
    );
    assert!(store.get_pending_certificates().await.unwrap().is_empty());
}

#[tokio::test]
async fn sync_metadata_missing_is_none() {
    let store = test_store().await;
    assert!(store.sync_metadata("x").await.unwrap().is_none());
}

#[tokio::test]
async fn download_cursor_persists() {
    let store = test_store().await;
    assert!(store.download_cursor().await.unwrap().is_none());

    let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
    store.set_download_cursor(ts).await.unwrap();
    assert_eq!(store.download_cursor().await.unwrap(), Some(ts));
}

// === Key and persistence tests ===

#[tokio::test]
async fn wrong_key_fails_to_decrypt() {
    let store = test_store().await;
    store
        .save_certificate(&certificate("c1", "Sea Survival"), Some(b"data"))
        .await
        .unwrap();

    let other = LocalStore::new(
        store.database().clone(),
        LocalCipher::new(&LocalKey::generate()),
    );
    assert!(matches!(
        other.get_certificate("c1").await,
        Err(StoreError::Crypto(_))
    ));
    assert!(other.get_certificate_file("c1").await.is_err());
}

#[tokio::test]
async fn init_is_idempotent() {
    let store = test_store().await;
    store.init().await.unwrap();
    store.init().await.unwrap();
    assert_eq!(
        store.database().schema_version().await.unwrap(),
        SCHEMA_VERSION
    );
}

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("vault.db");
    let key_path = dir.path().join("vault.key");
    let data = vec![0xA5u8; 1024];

    {
        let key = LocalKey::load_or_generate(&key_path).unwrap();
        let store = LocalStore::open(&db_path, LocalCipher::new(&key))
            .await
            .unwrap();
        store
            .save_certificate(&certificate("c1", "Fire Safety"), Some(&data))
            .await
            .unwrap();
        store.database().pool().close().await;
    }

    let key = LocalKey::load_or_generate(&key_path).unwrap();
    let store = LocalStore::open(&db_path, LocalCipher::new(&key))
        .await
        .unwrap();
    let loaded = store.get_certificate("c1").await.unwrap().unwrap();
    assert_eq!(loaded.certificate.name, "Fire Safety");
    assert_eq!(loaded.certificate.file_type, FileType::Pdf);
    assert_eq!(loaded.sync_status, SyncStatus::Pending);
    assert_eq!(store.get_certificate_file("c1").await.unwrap().unwrap(), data);
}
