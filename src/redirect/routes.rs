use axum::{routing::get, Router};
use std::sync::Arc;

use super::handlers::{resolve_code, RedirectState};
use super::resolver::Resolver;

/// Public, unauthenticated routes
pub fn create_redirect_router(resolver: Resolver) -> Router {
    let state = Arc::new(RedirectState { resolver });

    Router::new()
        .route("/api/qr/redirect", get(resolve_code))
        .with_state(state)
}
