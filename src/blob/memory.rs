use anyhow::bail;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{public_uri, BlobStore};

/// Process-local blob store for development and tests
#[derive(Default)]
pub struct MemoryBlobStore {
    public_base_url: String,
    objects: RwLock<HashMap<String, Bytes>>,
    fail_uploads: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new(public_base_url: &str) -> Self {
        Self {
            public_base_url: public_base_url.to_string(),
            ..Self::default()
        }
    }

    /// Make every subsequent upload fail, simulating an unavailable store
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_png(&self, key: &str, body: Bytes) -> anyhow::Result<String> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            bail!("upload of {key} rejected");
        }
        self.objects.write().await.insert(key.to_string(), body);
        Ok(public_uri(&self.public_base_url, key))
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }
}
