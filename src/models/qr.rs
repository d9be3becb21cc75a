use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Lifecycle state of a QR record. Records are never removed, only flipped to `Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrStatus {
    Active,
    Deleted,
}

impl QrStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            QrStatus::Active => "active",
            QrStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for QrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for QrStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "active" => Ok(QrStatus::Active),
            "deleted" => Ok(QrStatus::Deleted),
            other => Err(format!("unknown QR record status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QrRecord {
    pub id: i64,
    pub owner_id: String,
    pub destination_url: String,
    pub static_image_url: String,
    /// Absent for records created before tracking existed
    pub tracking_image_url: Option<String>,
    pub tracking_code: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: QrStatus,
    /// Unix milliseconds
    pub created_at: i64,
}

/// A record together with the number of access log rows for its tracking code
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QrRecordWithViews {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub record: QrRecord,
    pub view_count: i64,
}

/// Insert payload for the record store
#[derive(Debug, Clone, Copy)]
pub struct NewQrRecord<'a> {
    pub owner_id: &'a str,
    pub destination_url: &'a str,
    pub static_image_url: &'a str,
    pub tracking_image_url: Option<&'a str>,
    pub tracking_code: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQrRequest {
    #[serde(alias = "url", alias = "destinationURL")]
    pub destination_url: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub error_correction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQrQuery {
    #[serde(alias = "imageUri", alias = "imageURI")]
    pub qr_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_its_column_text() {
        for status in [QrStatus::Active, QrStatus::Deleted] {
            assert_eq!(QrStatus::try_from(status.as_str().to_string()), Ok(status));
        }
        assert!(QrStatus::try_from("1".to_string()).is_err());
    }

    #[test]
    fn create_request_accepts_legacy_url_field() {
        let req: CreateQrRequest =
            serde_json::from_str(r#"{"url": "example.com", "size": 300}"#).unwrap();
        assert_eq!(req.destination_url, "example.com");
        assert_eq!(req.size, Some(300));
        assert!(req.color.is_none());

        let req: CreateQrRequest = serde_json::from_str(
            r##"{"destinationUrl": "https://a.b", "backgroundColor": "#ffffff", "errorCorrection": "H"}"##,
        )
        .unwrap();
        assert_eq!(req.destination_url, "https://a.b");
        assert_eq!(req.background_color.as_deref(), Some("#ffffff"));
        assert_eq!(req.error_correction.as_deref(), Some("H"));
    }
}
