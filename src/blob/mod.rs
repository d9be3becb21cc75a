//! Object storage for rendered QR images.

pub mod memory;
pub mod s3;

pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

use crate::config::{BlobBackend, BlobConfig};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

pub const PNG_CONTENT_TYPE: &str = "image/png";

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a PNG under `key` and return its public URI
    async fn put_png(&self, key: &str, body: Bytes) -> anyhow::Result<String>;

    /// Remove the object stored under `key`
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// Join a public base URL and an object key
pub(crate) fn public_uri(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

pub async fn connect(config: &BlobConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match config.backend {
        BlobBackend::S3 => {
            tracing::info!(
                bucket = %config.bucket,
                region = %config.region,
                endpoint = config.endpoint.as_deref().unwrap_or("aws"),
                "Using S3 blob storage"
            );
            Arc::new(S3BlobStore::new(config).await?)
        }
        BlobBackend::Memory => {
            tracing::warn!("Using in-memory blob storage; uploaded images are not persisted");
            Arc::new(MemoryBlobStore::new(&config.public_base_url))
        }
    };
    Ok(store)
}
