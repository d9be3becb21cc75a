use anyhow::Result;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use qrgen::analytics::AccessRecorder;
use qrgen::api::{self, QrService};
use qrgen::auth::AuthService;
use qrgen::blob;
use qrgen::codegen::CodeGenerator;
use qrgen::config::{AuthMode, Config};
use qrgen::redirect::{self, Resolver};
use qrgen::storage;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let storage = storage::connect(&config.database).await?;
    info!("Database initialized successfully");

    let blobs = blob::connect(&config.blob).await?;
    info!(
        "Storing QR images in {:?} bucket '{}'",
        config.blob.backend, config.blob.bucket
    );

    let auth_config = config.auth.clone();
    let auth_service = Arc::new(AuthService::new(auth_config.clone()).await?);

    match auth_config.mode {
        AuthMode::None => {
            info!(
                "🔓 Authentication is disabled - every request acts as '{}'",
                auth_config.dev_user_id
            );
        }
        AuthMode::Oauth => {
            if let Some(oauth) = auth_config.oauth.as_ref() {
                info!(
                    "🔐 OAuth authentication enabled (issuer: {}, audience: {})",
                    oauth.issuer_url, oauth.audience
                );
            } else {
                info!("🔐 OAuth authentication enabled");
            }
        }
    }

    let timeout = config.io_timeout();
    let recorder = AccessRecorder::new(Arc::clone(&storage), timeout);
    let resolver = Resolver::new(Arc::clone(&storage), recorder, timeout);

    let service = QrService::new(
        Arc::clone(&storage),
        blobs,
        CodeGenerator::new(config.codegen_max_attempts),
        &config.public_base_url,
        timeout,
    );

    let app = api::create_api_router(service, auth_service)
        .merge(redirect::create_redirect_router(resolver))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Server listening on http://{}", addr);
    info!("   - Tracking links resolve under {}/qr/redirect", config.public_base_url);

    axum::serve(listener, app).await?;

    Ok(())
}
