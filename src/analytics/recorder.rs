use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::storage::Storage;

/// Appends access log rows on behalf of the redirect resolver
#[derive(Clone)]
pub struct AccessRecorder {
    storage: Arc<dyn Storage>,
    timeout: Duration,
}

impl AccessRecorder {
    pub fn new(storage: Arc<dyn Storage>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }

    /// Append one `{code, now}` entry
    pub async fn record(&self, tracking_code: &str) -> Result<()> {
        tokio::time::timeout(self.timeout, self.storage.record_access(tracking_code))
            .await
            .context("access log append timed out")?
            .with_context(|| format!("failed to append access log for {tracking_code}"))
    }
}
