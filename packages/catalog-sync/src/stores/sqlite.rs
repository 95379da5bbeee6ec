//! SQLite record storage.
//!
//! A file-based backend. Good for:
//! - Local development
//! - Single-worker runs
//! - Testing with persistent data

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use super::query_error;
use crate::error::{StoreError, StoreResult};
use crate::traits::store::RecordStore;
use crate::types::record::{Record, RecordUpsert, SyncStatus, UpsertAction};

/// SQLite-based record store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite:./catalog.db?mode=rwc` - File-based, created if missing
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(Box::new(e)))?;

        Self::from_pool(pool).await
    }

    /// Create an in-memory SQLite store (for testing).
    ///
    /// Pinned to one connection, since every connection to `:memory:` opens
    /// its own database.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Unavailable(Box::new(e)))?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS catalog_records (
                external_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                name_localized TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL,
                source_url TEXT NOT NULL DEFAULT '',
                resources TEXT NOT NULL DEFAULT '[]',
                column_names TEXT NOT NULL DEFAULT '[]',
                sync_status TEXT NOT NULL DEFAULT 'pending',
                last_synced_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_catalog_records_category ON catalog_records(category)",
        )
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct RecordRow {
    external_id: String,
    name: String,
    name_localized: String,
    description: String,
    category: String,
    source_url: String,
    resources: String,
    column_names: String,
    sync_status: String,
    last_synced_at: Option<DateTime<Utc>>,
}

impl RecordRow {
    fn into_record(self) -> StoreResult<Record> {
        Ok(Record {
            external_id: self.external_id,
            name: self.name,
            name_localized: self.name_localized,
            description: self.description,
            category: self.category,
            source_url: self.source_url,
            resources: serde_json::from_str(&self.resources)?,
            columns: serde_json::from_str(&self.column_names)?,
            sync_status: SyncStatus::parse(&self.sync_status),
            last_synced_at: self.last_synced_at,
        })
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn upsert_record(&self, record: &RecordUpsert) -> StoreResult<UpsertAction> {
        let resources = record
            .resources
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let columns = record
            .columns
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut tx = self.pool.begin().await.map_err(query_error)?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM catalog_records WHERE external_id = ?1")
                .bind(&record.external_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(query_error)?;

        sqlx::query(
            r#"
            INSERT INTO catalog_records
                (external_id, name, name_localized, description, category, source_url,
                 resources, column_names, sync_status, last_synced_at)
            VALUES (?1, COALESCE(?2, ?1), COALESCE(?3, ?1), COALESCE(?4, ''), ?5,
                    COALESCE(?6, ''), COALESCE(?7, '[]'), COALESCE(?8, '[]'), ?9, ?10)
            ON CONFLICT(external_id) DO UPDATE SET
                name = COALESCE(?2, catalog_records.name),
                name_localized = COALESCE(?3, catalog_records.name_localized),
                description = COALESCE(?4, catalog_records.description),
                category = excluded.category,
                source_url = COALESCE(?6, catalog_records.source_url),
                resources = COALESCE(?7, catalog_records.resources),
                column_names = COALESCE(?8, catalog_records.column_names),
                sync_status = excluded.sync_status,
                last_synced_at = excluded.last_synced_at
            "#,
        )
        .bind(&record.external_id)
        .bind(&record.name)
        .bind(&record.name_localized)
        .bind(&record.description)
        .bind(&record.category)
        .bind(&record.source_url)
        .bind(resources)
        .bind(columns)
        .bind(record.sync_status.as_str())
        .bind(record.synced_at)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;

        Ok(if existing.is_some() {
            UpsertAction::Updated
        } else {
            UpsertAction::Inserted
        })
    }

    async fn get_record(&self, external_id: &str) -> StoreResult<Option<Record>> {
        let row: Option<RecordRow> =
            sqlx::query_as("SELECT * FROM catalog_records WHERE external_id = ?1")
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;

        row.map(RecordRow::into_record).transpose()
    }

    async fn mark_failed(&self, external_id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE catalog_records SET sync_status = ?2 WHERE external_id = ?1")
            .bind(external_id)
            .bind(SyncStatus::Failed.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn count_records(&self, category: Option<&str>) -> StoreResult<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM catalog_records WHERE (?1 IS NULL OR category = ?1)",
        )
        .bind(category)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::Resource;

    async fn test_store() -> SqliteStore {
        SqliteStore::in_memory().await.unwrap()
    }

    fn upsert(id: &str) -> RecordUpsert {
        RecordUpsert {
            external_id: id.to_string(),
            name: Some("GDP".to_string()),
            name_localized: Some("PIB".to_string()),
            description: Some("Annual".to_string()),
            category: "economy".to_string(),
            source_url: Some(format!("https://data.example.gov/dataset/{id}")),
            resources: None,
            columns: None,
            sync_status: SyncStatus::Synced,
            synced_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_record_roundtrip() {
        let store = test_store().await;

        assert_eq!(store.upsert_record(&upsert("x1")).await.unwrap(), UpsertAction::Inserted);

        let record = store.get_record("x1").await.unwrap().unwrap();
        assert_eq!(record.name_localized, "PIB");
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert!(record.resources.is_empty());
        assert!(record.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn test_listing_write_keeps_resources() {
        let store = test_store().await;
        let mut enriched = upsert("x1");
        enriched.resources = Some(vec![
            Resource::new("r1", "https://f/r1.csv", "csv").with_columns(["year", "value"])
        ]);
        enriched.columns = Some(vec!["year".to_string(), "value".to_string()]);

        store.upsert_record(&enriched).await.unwrap();
        let mut listing = upsert("x1");
        listing.name = Some("Renamed".to_string());
        assert_eq!(store.upsert_record(&listing).await.unwrap(), UpsertAction::Updated);

        let record = store.get_record("x1").await.unwrap().unwrap();
        assert_eq!(record.name, "Renamed");
        assert_eq!(record.resources.len(), 1);
        assert_eq!(record.resources[0].columns, vec!["year", "value"]);
        assert_eq!(record.columns, vec!["year", "value"]);
        assert_eq!(store.count_records(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bare_write_keeps_descriptive_fields() {
        let store = test_store().await;
        store.upsert_record(&upsert("x1")).await.unwrap();

        let mut bare = upsert("x1");
        bare.name = None;
        bare.name_localized = None;
        bare.description = None;
        bare.source_url = None;
        store.upsert_record(&bare).await.unwrap();

        let record = store.get_record("x1").await.unwrap().unwrap();
        assert_eq!(record.name, "GDP");
        assert_eq!(record.name_localized, "PIB");
        assert_eq!(record.description, "Annual");
        assert_eq!(record.source_url, "https://data.example.gov/dataset/x1");
    }

    #[tokio::test]
    async fn test_bare_insert_falls_back_to_id() {
        let store = test_store().await;
        let mut bare = upsert("x9");
        bare.name = None;
        bare.name_localized = None;
        bare.description = None;
        bare.source_url = None;

        store.upsert_record(&bare).await.unwrap();

        let record = store.get_record("x9").await.unwrap().unwrap();
        assert_eq!(record.name, "x9");
        assert_eq!(record.name_localized, "x9");
        assert_eq!(record.description, "");
        assert_eq!(record.source_url, "");
    }

    #[tokio::test]
    async fn test_mark_failed_and_counts() {
        let store = test_store().await;
        store.upsert_record(&upsert("x1")).await.unwrap();
        store.upsert_record(&upsert("x2")).await.unwrap();

        store.mark_failed("x2").await.unwrap();
        store.mark_failed("unknown").await.unwrap();

        let failed = store.get_record("x2").await.unwrap().unwrap();
        assert_eq!(failed.sync_status, SyncStatus::Failed);
        assert_eq!(store.count_records(Some("economy")).await.unwrap(), 2);
        assert_eq!(store.count_records(Some("health")).await.unwrap(), 0);
    }
}
