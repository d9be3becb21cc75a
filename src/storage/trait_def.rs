use crate::models::{AccessLogEntry, NewQrRecord, QrRecord, QrRecordWithViews};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("tracking code already exists")]
    Conflict,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Other(err.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Insert a new active record stamped with the current time.
    ///
    /// Fails with [`StorageError::Conflict`] when the tracking code is already
    /// taken by any record, active or deleted, and with
    /// [`StorageError::Validation`] when the destination is empty.
    async fn create_record(&self, record: NewQrRecord<'_>) -> StorageResult<QrRecord>;

    /// Get the active record carrying a tracking code
    async fn get_active_by_code(&self, tracking_code: &str) -> Result<Option<QrRecord>>;

    /// Append one access log row for a tracking code
    async fn record_access(&self, tracking_code: &str) -> Result<()>;

    /// Number of access log rows for a tracking code
    async fn view_count(&self, tracking_code: &str) -> Result<i64>;

    /// Most recent access log rows for a tracking code, newest first
    async fn access_log(&self, tracking_code: &str, limit: i64) -> Result<Vec<AccessLogEntry>>;

    /// Active records of one owner with view counts, newest first
    async fn list_active(&self, owner_id: &str) -> Result<Vec<QrRecordWithViews>>;

    /// Active records of every owner with view counts, newest first
    async fn list_all_active(&self, limit: i64, offset: i64) -> Result<Vec<QrRecordWithViews>>;

    /// Flip the record keyed by owner and static image location to deleted.
    /// Returns whether a row changed; a missing record is not an error.
    async fn soft_delete(&self, owner_id: &str, static_image_url: &str) -> Result<bool>;
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn validate_new_record(record: &NewQrRecord<'_>) -> StorageResult<()> {
    if record.destination_url.trim().is_empty() {
        return Err(StorageError::Validation(
            "destination URL cannot be empty".to_string(),
        ));
    }
    if record.owner_id.is_empty() {
        return Err(StorageError::Validation(
            "owner identifier cannot be empty".to_string(),
        ));
    }
    Ok(())
}
