//! Error taxonomy surfaced at the HTTP boundary.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("{0}")]
    NotFound(String),
    /// A store or blob call exceeded its deadline; safe to retry
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },
    #[error("{message}")]
    Dependency {
        message: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("could not allocate a unique tracking code")]
    GenerationExhausted,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl AppError {
    pub fn dependency(message: impl Into<String>, source: anyhow::Error) -> Self {
        AppError::Dependency {
            message: message.into(),
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Dependency { .. } => StatusCode::BAD_GATEWAY,
            AppError::GenerationExhausted | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Timeout { .. })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Dependency { message, source } => {
                tracing::error!(error = ?source, "{message}");
                message.clone()
            }
            AppError::Internal(err) => {
                tracing::error!(error = ?err, "request failed");
                "internal server error".to_string()
            }
            AppError::Timeout { operation } => {
                tracing::warn!(operation, "operation timed out");
                self.to_string()
            }
            AppError::GenerationExhausted => {
                tracing::error!("tracking code generation exhausted its retry ceiling");
                self.to_string()
            }
            _ => self.to_string(),
        };

        let mut response = (status, Json(ErrorResponse { error: message })).into_response();
        if self.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

/// Await `future` for at most `limit`, mapping expiry to [`AppError::Timeout`]
pub async fn bounded<T, F>(limit: Duration, operation: &'static str, future: F) -> Result<T, AppError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| AppError::Timeout { operation })
}
