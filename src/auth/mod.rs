//! Principal extraction for owner-scoped routes.
//!
//! The identity provider is trusted: whatever `sub` a verified token carries
//! becomes the owner identifier of the records created in that request.

pub mod oauth;

use anyhow::{Context, Result};
use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::config::{AuthConfig, AuthMode};
use crate::error::AppError;
use oauth::JwksVerifier;

/// Authenticated principal, inserted as a request extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
}

pub struct AuthService {
    verifier: Option<JwksVerifier>,
    dev_user_id: String,
}

impl AuthService {
    pub async fn new(config: AuthConfig) -> Result<Self> {
        let verifier = match config.mode {
            AuthMode::None => None,
            AuthMode::Oauth => {
                let oauth = config
                    .oauth
                    .as_ref()
                    .context("OAuth configuration is required when AUTH_MODE=oauth")?;
                Some(JwksVerifier::from_config(oauth).await?)
            }
        };

        Ok(Self {
            verifier,
            dev_user_id: config.dev_user_id,
        })
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, AppError> {
        let Some(verifier) = &self.verifier else {
            return Ok(AuthenticatedUser {
                id: self.dev_user_id.clone(),
            });
        };

        let token = bearer_token(headers).ok_or(AppError::AuthenticationRequired)?;

        let claims = verifier.verify(token).await.map_err(|e| {
            tracing::debug!("rejecting token: {e:#}");
            AppError::AuthenticationRequired
        })?;

        let id = oauth::subject(&claims).ok_or(AppError::AuthenticationRequired)?;
        Ok(AuthenticatedUser { id: id.to_string() })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

pub async fn auth_middleware(
    auth_service: Arc<AuthService>,
    mut request: Request,
    next: Next,
) -> Response {
    match auth_service.authenticate(request.headers()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}
