use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Serialize;
use std::sync::Arc;

use super::service::{CreatedQr, QrService};
use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::{CreateQrRequest, DeleteQrQuery, QrRecordWithViews};

pub struct AppState {
    pub service: QrService,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// One saved QR code as shown to its owner
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeSummary {
    pub destination_url: String,
    pub static_image_uri: String,
    pub tracking_image_uri: Option<String>,
    pub tracking_code: Option<String>,
    pub tracking_url: Option<String>,
    pub created_at: i64,
    pub view_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQrResponse {
    pub qr_codes: Vec<QrCodeSummary>,
}

impl QrCodeSummary {
    fn from_record(service: &QrService, row: QrRecordWithViews) -> Self {
        let record = row.record;
        Self {
            tracking_url: record
                .tracking_code
                .as_deref()
                .map(|code| service.tracking_url(code)),
            destination_url: record.destination_url,
            static_image_uri: record.static_image_url,
            tracking_image_uri: record.tracking_image_url,
            tracking_code: record.tracking_code,
            created_at: record.created_at,
            view_count: row.view_count,
        }
    }
}

/// Render, upload and persist a new QR code for the caller
pub async fn create_qr(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(payload): Json<CreateQrRequest>,
) -> Result<(StatusCode, Json<CreatedQr>), AppError> {
    let created = state.service.create(&user.id, &payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// List the caller's active QR codes, newest first
pub async fn list_qr(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<ListQrResponse>, AppError> {
    let qr_codes = state
        .service
        .list(&user.id)
        .await?
        .into_iter()
        .map(|row| QrCodeSummary::from_record(&state.service, row))
        .collect();

    Ok(Json(ListQrResponse { qr_codes }))
}

/// Soft-delete one of the caller's QR codes by image URL
pub async fn delete_qr(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<DeleteQrQuery>,
) -> Result<Json<SuccessResponse>, AppError> {
    let image_uri = query.qr_url.unwrap_or_default();
    state.service.delete(&user.id, &image_uri).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
