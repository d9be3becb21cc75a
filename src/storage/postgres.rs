use crate::models::{AccessLogEntry, NewQrRecord, QrRecord, QrRecordWithViews, QrStatus};
use crate::storage::trait_def::{now_millis, validate_new_record};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS qr_records (
                id BIGSERIAL PRIMARY KEY,
                owner_id TEXT NOT NULL,
                destination_url TEXT NOT NULL,
                static_image_url TEXT NOT NULL,
                tracking_image_url TEXT,
                tracking_code TEXT UNIQUE,
                status TEXT NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active', 'deleted')),
                created_at BIGINT NOT NULL,
                UNIQUE (owner_id, static_image_url)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_qr_records_owner ON qr_records(owner_id, status, created_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS qr_access_log (
                id BIGSERIAL PRIMARY KEY,
                tracking_code TEXT NOT NULL,
                accessed_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_qr_access_log_code ON qr_access_log(tracking_code)",
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn create_record(&self, record: NewQrRecord<'_>) -> StorageResult<QrRecord> {
        validate_new_record(&record)?;

        let inserted = sqlx::query_as::<_, QrRecord>(
            r#"
            INSERT INTO qr_records
                (owner_id, destination_url, static_image_url, tracking_image_url,
                 tracking_code, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT(tracking_code) DO NOTHING
            RETURNING id, owner_id, destination_url, static_image_url, tracking_image_url,
                      tracking_code, status, created_at
            "#,
        )
        .bind(record.owner_id)
        .bind(record.destination_url)
        .bind(record.static_image_url)
        .bind(record.tracking_image_url)
        .bind(record.tracking_code)
        .bind(QrStatus::Active.as_str())
        .bind(now_millis())
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(StorageError::from)?;

        inserted.ok_or(StorageError::Conflict)
    }

    async fn get_active_by_code(&self, tracking_code: &str) -> Result<Option<QrRecord>> {
        let record = sqlx::query_as::<_, QrRecord>(
            r#"
            SELECT id, owner_id, destination_url, static_image_url, tracking_image_url,
                   tracking_code, status, created_at
            FROM qr_records
            WHERE tracking_code = $1 AND status = $2
            "#,
        )
        .bind(tracking_code)
        .bind(QrStatus::Active.as_str())
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(record)
    }

    async fn record_access(&self, tracking_code: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO qr_access_log (tracking_code, accessed_at)
            VALUES ($1, $2)
            "#,
        )
        .bind(tracking_code)
        .bind(now_millis())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn view_count(&self, tracking_code: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM qr_access_log WHERE tracking_code = $1",
        )
        .bind(tracking_code)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn access_log(&self, tracking_code: &str, limit: i64) -> Result<Vec<AccessLogEntry>> {
        let entries = sqlx::query_as::<_, AccessLogEntry>(
            r#"
            SELECT id, tracking_code, accessed_at
            FROM qr_access_log
            WHERE tracking_code = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(tracking_code)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(entries)
    }

    async fn list_active(&self, owner_id: &str) -> Result<Vec<QrRecordWithViews>> {
        let records = sqlx::query_as::<_, QrRecordWithViews>(
            r#"
            SELECT r.id, r.owner_id, r.destination_url, r.static_image_url,
                   r.tracking_image_url, r.tracking_code, r.status, r.created_at,
                   COUNT(l.id) AS view_count
            FROM qr_records r
            LEFT JOIN qr_access_log l ON l.tracking_code = r.tracking_code
            WHERE r.owner_id = $1 AND r.status = $2
            GROUP BY r.id
            ORDER BY r.created_at DESC, r.id DESC
            "#,
        )
        .bind(owner_id)
        .bind(QrStatus::Active.as_str())
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(records)
    }

    async fn list_all_active(&self, limit: i64, offset: i64) -> Result<Vec<QrRecordWithViews>> {
        let records = sqlx::query_as::<_, QrRecordWithViews>(
            r#"
            SELECT r.id, r.owner_id, r.destination_url, r.static_image_url,
                   r.tracking_image_url, r.tracking_code, r.status, r.created_at,
                   COUNT(l.id) AS view_count
            FROM qr_records r
            LEFT JOIN qr_access_log l ON l.tracking_code = r.tracking_code
            WHERE r.status = $1
            GROUP BY r.id
            ORDER BY r.created_at DESC, r.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(QrStatus::Active.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(records)
    }

    async fn soft_delete(&self, owner_id: &str, static_image_url: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE qr_records
            SET status = $1
            WHERE owner_id = $2 AND static_image_url = $3 AND status = $4
            "#,
        )
        .bind(QrStatus::Deleted.as_str())
        .bind(owner_id)
        .bind(static_image_url)
        .bind(QrStatus::Active.as_str())
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
