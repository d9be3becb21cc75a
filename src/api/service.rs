//! Owner-scoped QR operations.
//!
//! Creation is all-or-nothing: both images are uploaded before the record is
//! inserted, and uploaded images are deleted again when the insert fails.

use bytes::Bytes;
use rand::distr::{Alphanumeric, SampleString};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::blob::BlobStore;
use crate::codegen::{AttemptError, CodeGenerator, GenerateError};
use crate::error::{bounded, AppError};
use crate::models::{CreateQrRequest, NewQrRecord, QrRecordWithViews};
use crate::render::{render_png, RenderError, RenderOptions};
use crate::storage::{Storage, StorageError};

/// Result of a successful creation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedQr {
    pub id: i64,
    pub static_image_uri: String,
    pub tracking_image_uri: String,
    pub tracking_url: String,
    pub tracking_code: String,
}

/// A failed creation attempt and what to do with its uploaded images
#[derive(Debug)]
enum CreateFailure {
    /// No record can reference the images
    Discard(AppError),
    /// The insert outcome is unknown, so the images may be referenced
    Keep(AppError),
}

#[derive(Clone)]
pub struct QrService {
    storage: Arc<dyn Storage>,
    blobs: Arc<dyn BlobStore>,
    generator: CodeGenerator,
    public_base_url: String,
    timeout: Duration,
}

impl QrService {
    pub fn new(
        storage: Arc<dyn Storage>,
        blobs: Arc<dyn BlobStore>,
        generator: CodeGenerator,
        public_base_url: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            storage,
            blobs,
            generator,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn tracking_url(&self, code: &str) -> String {
        tracking_url(&self.public_base_url, code)
    }

    pub async fn create(&self, owner: &str, request: &CreateQrRequest) -> Result<CreatedQr, AppError> {
        let destination = request.destination_url.trim();
        if destination.is_empty() {
            return Err(AppError::Validation("URL is required".to_string()));
        }

        let options = RenderOptions::from_request(
            request.color.as_deref(),
            request.background_color.as_deref(),
            request.size,
            request.error_correction.as_deref(),
        )
        .map_err(render_error)?;

        // Unique per request, so a colliding candidate never overwrites another record's image
        let stem = format!(
            "{}/{}-{}",
            object_prefix(owner),
            chrono::Utc::now().timestamp_millis(),
            Alphanumeric.sample_string(&mut rand::rng(), 6)
        );
        let static_png = render(destination.to_string(), options).await?;
        let static_key = format!("{stem}.png");
        let static_uri = match self.upload(&static_key, static_png).await {
            Ok(uri) => uri,
            Err(err) => {
                self.discard(&static_key).await;
                return Err(err);
            }
        };

        let static_uri_ref = static_uri.as_str();
        let stem_ref = stem.as_str();
        let created = self
            .generator
            .with_unique_code(move |code| {
                self.attempt_insert(owner, destination, static_uri_ref, stem_ref, options, code)
            })
            .await;

        match created {
            Ok(created) => {
                tracing::info!(
                    owner = %owner,
                    tracking_code = %created.tracking_code,
                    "created QR code"
                );
                Ok(created)
            }
            Err(GenerateError::Exhausted { attempts }) => {
                tracing::error!(owner = %owner, attempts, "tracking code generation exhausted");
                self.discard(&static_key).await;
                Err(AppError::GenerationExhausted)
            }
            Err(GenerateError::Failed(CreateFailure::Discard(err))) => {
                self.discard(&static_key).await;
                Err(err)
            }
            Err(GenerateError::Failed(CreateFailure::Keep(err))) => {
                tracing::warn!(
                    owner = %owner,
                    static_key = %static_key,
                    "record insert outcome unknown, keeping uploaded images"
                );
                Err(err)
            }
        }
    }

    /// One candidate code: render and upload its tracking image, then insert
    async fn attempt_insert(
        &self,
        owner: &str,
        destination: &str,
        static_uri: &str,
        stem: &str,
        options: RenderOptions,
        code: String,
    ) -> Result<CreatedQr, AttemptError<CreateFailure>> {
        let tracking_url = self.tracking_url(&code);
        let tracking_png = render(tracking_url.clone(), options)
            .await
            .map_err(|e| AttemptError::Failed(CreateFailure::Discard(e)))?;

        let tracking_key = format!("{stem}-{code}.png");
        let tracking_uri = match self.upload(&tracking_key, tracking_png).await {
            Ok(uri) => uri,
            Err(err) => {
                // A timed-out upload can still land
                self.discard(&tracking_key).await;
                return Err(AttemptError::Failed(CreateFailure::Discard(err)));
            }
        };

        let inserted = bounded(
            self.timeout,
            "record insert",
            self.storage.create_record(NewQrRecord {
                owner_id: owner,
                destination_url: destination,
                static_image_url: static_uri,
                tracking_image_url: Some(tracking_uri.as_str()),
                tracking_code: Some(code.as_str()),
            }),
        )
        .await;

        let err = match inserted {
            Ok(Ok(record)) => {
                return Ok(CreatedQr {
                    id: record.id,
                    static_image_uri: static_uri.to_string(),
                    tracking_image_uri: tracking_uri,
                    tracking_url,
                    tracking_code: code,
                })
            }
            // The insert may still commit after the deadline
            Err(timeout) => return Err(AttemptError::Failed(CreateFailure::Keep(timeout))),
            Ok(Err(err)) => err,
        };

        self.discard(&tracking_key).await;
        let err = match err {
            StorageError::Conflict => return Err(AttemptError::Conflict),
            StorageError::Validation(message) => AppError::Validation(message),
            StorageError::Other(source) => AppError::Internal(source),
        };
        Err(AttemptError::Failed(CreateFailure::Discard(err)))
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<QrRecordWithViews>, AppError> {
        let records = bounded(self.timeout, "record listing", self.storage.list_active(owner)).await??;
        Ok(records)
    }

    /// Soft-delete the owner's record for `image_uri`; unknown keys are a no-op
    pub async fn delete(&self, owner: &str, image_uri: &str) -> Result<bool, AppError> {
        let image_uri = image_uri.trim();
        if image_uri.is_empty() {
            return Err(AppError::Validation("QR image URL is required".to_string()));
        }

        let changed = bounded(
            self.timeout,
            "record delete",
            self.storage.soft_delete(owner, image_uri),
        )
        .await??;

        if changed {
            tracing::info!(owner = %owner, image = %image_uri, "soft-deleted QR code");
        }
        Ok(changed)
    }

    async fn upload(&self, key: &str, body: Bytes) -> Result<String, AppError> {
        bounded(self.timeout, "image upload", self.blobs.put_png(key, body))
            .await?
            .map_err(|e| AppError::dependency("failed to upload QR code image", e))
    }

    /// Best-effort removal of an image whose record was never inserted
    async fn discard(&self, key: &str) {
        match bounded(self.timeout, "image cleanup", self.blobs.delete(key)).await {
            Ok(Ok(())) => tracing::debug!(key, "removed orphaned QR image"),
            Ok(Err(e)) => tracing::warn!(key, error = ?e, "failed to remove orphaned QR image"),
            Err(e) => tracing::warn!(key, error = %e, "failed to remove orphaned QR image"),
        }
    }
}

pub fn tracking_url(public_base_url: &str, code: &str) -> String {
    format!(
        "{}/qr/redirect?code={}",
        public_base_url.trim_end_matches('/'),
        code
    )
}

/// Owner identifiers come from the identity provider; keep keys path-safe
fn object_prefix(owner: &str) -> String {
    owner
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Rasterizing and PNG encoding are CPU-bound; keep them off the async workers
async fn render(payload: String, options: RenderOptions) -> Result<Bytes, AppError> {
    tokio::task::spawn_blocking(move || render_png(&payload, &options))
        .await
        .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("QR rendering task failed")))?
        .map_err(render_error)
}

fn render_error(err: RenderError) -> AppError {
    if err.is_invalid_input() {
        AppError::Validation(err.to_string())
    } else {
        AppError::dependency("failed to render QR code", err.into())
    }
}
