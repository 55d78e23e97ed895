//! Database queries for the CertVault daemon.
//!
//! Rows here are already encrypted; see `LocalStore` for the plaintext view.

use certvault_core::SyncStatus;

use super::db::{Database, DatabaseError};
use super::models::{CertificateRow, FileRow};

impl Database {
    // =========================================================================
    // Certificate queries
    // =========================================================================

    /// Insert or update a certificate after a local edit, optionally with its file.
    ///
    /// The stored `local_updated_at` is `max(row.local_updated_at, previous + 1)`
    /// so that two edits within the same millisecond still produce distinct
    /// stamps. Returns the stamp actually written.
    pub async fn save_certificate_row(
        &self,
        row: &CertificateRow,
        file: Option<&FileRow>,
    ) -> Result<i64, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let stamp: i64 = sqlx::query_scalar(
            r"
            INSERT INTO certificates (
                id, name_enc, serial_number_enc, category, issue_date, expiry_date,
                status, file_type, file_path, sync_status, local_updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name_enc = excluded.name_enc,
                serial_number_enc = excluded.serial_number_enc,
                category = excluded.category,
                issue_date = excluded.issue_date,
                expiry_date = excluded.expiry_date,
                status = excluded.status,
                file_type = excluded.file_type,
                file_path = excluded.file_path,
                sync_status = excluded.sync_status,
                local_updated_at = MAX(excluded.local_updated_at, certificates.local_updated_at + 1)
            RETURNING local_updated_at
            ",
        )
        .bind(&row.id)
        .bind(&row.name_enc)
        .bind(&row.serial_number_enc)
        .bind(&row.category)
        .bind(&row.issue_date)
        .bind(&row.expiry_date)
        .bind(&row.status)
        .bind(&row.file_type)
        .bind(&row.file_path)
        .bind(&row.sync_status)
        .bind(row.local_updated_at)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(file) = file {
            upsert_file(&mut tx, file).await?;
        }

        tx.commit().await?;
        Ok(stamp)
    }

    /// Write a certificate adopted from the remote, keeping its timestamp as-is.
    pub async fn replace_certificate_row(
        &self,
        row: &CertificateRow,
        file: Option<&FileRow>,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r"
            INSERT INTO certificates (
                id, name_enc, serial_number_enc, category, issue_date, expiry_date,
                status, file_type, file_path, sync_status, local_updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name_enc = excluded.name_enc,
                serial_number_enc = excluded.serial_number_enc,
                category = excluded.category,
                issue_date = excluded.issue_date,
                expiry_date = excluded.expiry_date,
                status = excluded.status,
                file_type = excluded.file_type,
                file_path = excluded.file_path,
                sync_status = excluded.sync_status,
                local_updated_at = excluded.local_updated_at
            ",
        )
        .bind(&row.id)
        .bind(&row.name_enc)
        .bind(&row.serial_number_enc)
        .bind(&row.category)
        .bind(&row.issue_date)
        .bind(&row.expiry_date)
        .bind(&row.status)
        .bind(&row.file_type)
        .bind(&row.file_path)
        .bind(&row.sync_status)
        .bind(row.local_updated_at)
        .execute(&mut *tx)
        .await?;

        if let Some(file) = file {
            upsert_file(&mut tx, file).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Get a certificate row by ID.
    pub async fn get_certificate_row(
        &self,
        id: &str,
    ) -> Result<Option<CertificateRow>, DatabaseError> {
        let row = sqlx::query_as::<_, CertificateRow>("SELECT * FROM certificates WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(row)
    }

    /// List all certificate rows.
    pub async fn list_certificate_rows(&self) -> Result<Vec<CertificateRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, CertificateRow>("SELECT * FROM certificates")
            .fetch_all(self.pool())
            .await?;

        Ok(rows)
    }

    /// List certificate rows with the given sync status.
    pub async fn list_certificate_rows_by_sync_status(
        &self,
        status: SyncStatus,
    ) -> Result<Vec<CertificateRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, CertificateRow>(
            "SELECT * FROM certificates WHERE sync_status = ? ORDER BY local_updated_at ASC",
        )
        .bind(status.as_str())
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// Count certificates with the given sync status.
    pub async fn count_by_sync_status(&self, status: SyncStatus) -> Result<i64, DatabaseError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM certificates WHERE sync_status = ?")
                .bind(status.as_str())
                .fetch_one(self.pool())
                .await?;

        Ok(count)
    }

    /// Fetch `(sync_status, local_updated_at)` without touching encrypted columns.
    pub async fn get_sync_columns(
        &self,
        id: &str,
    ) -> Result<Option<(String, i64)>, DatabaseError> {
        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT sync_status, local_updated_at FROM certificates WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Update only the sync status column. Returns the number of rows affected.
    pub async fn update_sync_status(
        &self,
        id: &str,
        status: SyncStatus,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query("UPDATE certificates SET sync_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }

    /// Mark a certificate synced if it has not been edited since `uploaded_at`.
    pub async fn mark_synced(&self, id: &str, uploaded_at: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r"
            UPDATE certificates SET sync_status = ?
            WHERE id = ? AND local_updated_at = ?
            ",
        )
        .bind(SyncStatus::Synced.as_str())
        .bind(id)
        .bind(uploaded_at)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a certificate and its file. Returns whether a certificate existed.
    pub async fn delete_certificate(&self, id: &str) -> Result<bool, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM files WHERE certificate_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM certificates WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // File queries
    // =========================================================================

    /// Get the encrypted file row for a certificate.
    pub async fn get_file_row(&self, certificate_id: &str) -> Result<Option<FileRow>, DatabaseError> {
        let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE certificate_id = ?")
            .bind(certificate_id)
            .fetch_optional(self.pool())
            .await?;

        Ok(row)
    }

    /// Whether a file is stored for the certificate.
    pub async fn file_exists(&self, certificate_id: &str) -> Result<bool, DatabaseError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE certificate_id = ?)")
                .bind(certificate_id)
                .fetch_one(self.pool())
                .await?;

        Ok(exists)
    }

    // =========================================================================
    // Sync state queries
    // =========================================================================

    /// Read a sync state value.
    pub async fn get_sync_state(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;

        Ok(value)
    }

    /// Write a sync state value.
    pub async fn set_sync_state(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r"
            INSERT INTO sync_state (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            ",
        )
        .bind(key)
        .bind(value)
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

async fn upsert_file(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    file: &FileRow,
) -> Result<(), DatabaseError> {
    sqlx::query(
        r"
        INSERT INTO files (certificate_id, encrypted_data, file_type, size)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(certificate_id) DO UPDATE SET
            encrypted_data = excluded.encrypted_data,
            file_type = excluded.file_type,
            size = excluded.size
        ",
    )
    .bind(&file.certificate_id)
    .bind(&file.encrypted_data)
    .bind(&file.file_type)
    .bind(file.size)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
