use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One resolution of a tracking code. Rows are append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogEntry {
    pub id: i64,
    pub tracking_code: String,
    /// Unix milliseconds
    pub accessed_at: i64,
}
