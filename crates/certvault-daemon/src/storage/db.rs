//! Database connection and initialization.

pub use certvault_core::db::DatabaseError;

/// Version recorded in `PRAGMA user_version` by the newest migration.
pub const SCHEMA_VERSION: i64 = 1;

certvault_core::define_database!(Database, "Database migrations complete");

impl Database {
    /// Schema version recorded by the migrations.
    pub async fn schema_version(&self) -> Result<i64, DatabaseError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(self.pool())
            .await?;
        Ok(version)
    }
}
