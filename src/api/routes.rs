use axum::{
    middleware,
    routing::get,
    Router,
};
use std::sync::Arc;

use crate::auth::{auth_middleware, AuthService};

use super::handlers::{create_qr, delete_qr, health_check, list_qr, AppState};
use super::service::QrService;

pub fn create_api_router(service: QrService, auth_service: Arc<AuthService>) -> Router {
    let state = Arc::new(AppState { service });

    let protected_routes = Router::new()
        .route("/api/qr", get(list_qr).post(create_qr).delete(delete_qr))
        .route_layer(middleware::from_fn(move |req, next| {
            let auth = Arc::clone(&auth_service);
            auth_middleware(auth, req, next)
        }))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes)
}
