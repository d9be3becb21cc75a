use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use super::resolver::Resolver;
use crate::error::AppError;
use crate::models::ResolveQuery;

pub struct RedirectState {
    pub resolver: Resolver,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub url: String,
}

/// Resolve a tracking code to its destination.
///
/// The client performs the navigation itself; no 3xx is issued here.
pub async fn resolve_code(
    State(state): State<Arc<RedirectState>>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<ResolveResponse>, AppError> {
    let code = query
        .code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::Validation("code parameter is required".to_string()))?;

    let url = state.resolver.resolve(code).await?;

    Ok(Json(ResolveResponse { url }))
}
