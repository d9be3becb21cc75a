use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::analytics::AccessRecorder;
use crate::codegen;
use crate::error::AppError;
use crate::storage::Storage;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// Unknown and deleted codes are reported identically
    #[error("QR code not found")]
    NotFound,
    #[error("tracking code lookup timed out")]
    Timeout,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<ResolveError> for AppError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound => AppError::NotFound(err.to_string()),
            ResolveError::Timeout => AppError::Timeout {
                operation: "tracking code lookup",
            },
            ResolveError::Store(source) => AppError::Internal(source),
        }
    }
}

/// Maps tracking codes to destinations and records each hit
#[derive(Clone)]
pub struct Resolver {
    storage: Arc<dyn Storage>,
    recorder: AccessRecorder,
    timeout: Duration,
}

impl Resolver {
    pub fn new(storage: Arc<dyn Storage>, recorder: AccessRecorder, timeout: Duration) -> Self {
        Self {
            storage,
            recorder,
            timeout,
        }
    }

    /// Look up the active record for `code` and return its normalized destination.
    ///
    /// A failed access log append does not fail the resolution; it is logged
    /// as a warning and the destination is still returned.
    pub async fn resolve(&self, code: &str) -> Result<String, ResolveError> {
        if !codegen::is_well_formed(code) {
            tracing::debug!(tracking_code = %code, "rejecting malformed tracking code");
            return Err(ResolveError::NotFound);
        }

        let record = tokio::time::timeout(self.timeout, self.storage.get_active_by_code(code))
            .await
            .map_err(|_| ResolveError::Timeout)??
            .ok_or(ResolveError::NotFound)?;

        let destination = normalize_destination(&record.destination_url);

        if let Err(err) = self.recorder.record(code).await {
            tracing::warn!(tracking_code = %code, error = ?err, "failed to record access");
        }

        Ok(destination)
    }
}

/// Prefix `https://` unless the URL already starts with `http://` or `https://`
pub fn normalize_destination(url: &str) -> String {
    let has_scheme = ["http://", "https://"].iter().any(|scheme| {
        url.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    });

    if has_scheme {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_missing_scheme() {
        assert_eq!(normalize_destination("example.com"), "https://example.com");
        assert_eq!(
            normalize_destination("example.com/path?q=1"),
            "https://example.com/path?q=1"
        );
        assert_eq!(normalize_destination("ftp://host"), "https://ftp://host");
    }

    #[test]
    fn keeps_existing_scheme_case_insensitively() {
        assert_eq!(normalize_destination("http://a.b"), "http://a.b");
        assert_eq!(normalize_destination("https://a.b"), "https://a.b");
        assert_eq!(normalize_destination("HTTPS://A.B"), "HTTPS://A.B");
        assert_eq!(normalize_destination("Http://a.b"), "Http://a.b");
    }

    #[test]
    fn handles_short_and_multibyte_input() {
        assert_eq!(normalize_destination("a"), "https://a");
        assert_eq!(normalize_destination("한국.kr"), "https://한국.kr");
    }

    #[test]
    fn resolve_errors_map_to_http_taxonomy() {
        use axum::http::StatusCode;

        assert_eq!(
            AppError::from(ResolveError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(ResolveError::Timeout).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
