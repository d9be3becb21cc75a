use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    /// Base URL the tracking QR codes point at, e.g. `https://qr.example.com`
    pub public_base_url: String,
    pub auth: AuthConfig,
    pub blob: BlobConfig,
    /// Upper bound applied to every database and object storage call
    pub io_timeout_secs: u64,
    /// Tracking code draws allowed per creation request before giving up
    pub codegen_max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    None,
    Oauth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthMode,
    #[serde(default)]
    pub oauth: Option<OAuthConfig>,
    /// Owner identifier used for every request while authentication is disabled
    #[serde(default = "AuthConfig::default_dev_user")]
    pub dev_user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub issuer_url: String,
    pub audience: String,
    #[serde(default)]
    pub jwks_url: Option<String>,
    #[serde(default = "OAuthConfig::default_cache_ttl_secs")]
    pub jwks_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    S3,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    pub backend: BlobBackend,
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...)
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Prefix used to build the public URI of an uploaded object
    pub public_base_url: String,
    /// Attach the `public-read` canned ACL on upload
    #[serde(default)]
    pub public_read_acl: bool,
}

impl AuthConfig {
    fn default_dev_user() -> String {
        "local-dev".to_string()
    }
}

impl OAuthConfig {
    const fn default_cache_ttl_secs() -> u64 {
        300
    }
}

impl DatabaseConfig {
    /// Database settings alone, for tools that never touch object storage
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./qrgen.db?mode=rwc".to_string());
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        Ok(DatabaseConfig {
            backend,
            url,
            max_connections,
        })
    }
}

impl Config {
    pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 15;
    pub const DEFAULT_CODEGEN_MAX_ATTEMPTS: u32 = 20;

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs.max(1))
    }

    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database = DatabaseConfig::from_env()?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("API_PORT must be a valid port number")?;

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{api_port}"));

        let auth = auth_from_env()?;
        let blob = blob_from_env()?;

        let io_timeout_secs = match std::env::var("IO_TIMEOUT_SECS") {
            Ok(v) => v
                .parse::<u64>()
                .context("IO_TIMEOUT_SECS must be a number of seconds")?,
            Err(_) => Self::DEFAULT_IO_TIMEOUT_SECS,
        };

        let codegen_max_attempts = match std::env::var("CODEGEN_MAX_ATTEMPTS") {
            Ok(v) => v
                .parse::<u32>()
                .context("CODEGEN_MAX_ATTEMPTS must be a positive integer")?,
            Err(_) => Self::DEFAULT_CODEGEN_MAX_ATTEMPTS,
        };

        Ok(Config {
            database,
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            public_base_url,
            auth,
            blob,
            io_timeout_secs,
            codegen_max_attempts,
        })
    }
}

fn auth_from_env() -> anyhow::Result<AuthConfig> {
    let disable_auth = std::env::var("DISABLE_AUTH")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false);

    let mut auth_mode = std::env::var("AUTH_MODE")
        .unwrap_or_else(|_| "none".to_string())
        .to_lowercase();

    if disable_auth {
        auth_mode = "none".to_string();
    }

    let mode = match auth_mode.as_str() {
        "none" => AuthMode::None,
        "oauth" => AuthMode::Oauth,
        other => {
            tracing::warn!(
                "Unknown AUTH_MODE '{other}', falling back to 'none'. Supported values: none, oauth"
            );
            AuthMode::None
        }
    };

    let oauth = if matches!(mode, AuthMode::Oauth) {
        let issuer_url = std::env::var("OAUTH_ISSUER_URL")
            .context("OAUTH_ISSUER_URL must be set when AUTH_MODE=oauth")?;
        let audience = std::env::var("OAUTH_AUDIENCE")
            .context("OAUTH_AUDIENCE must be set when AUTH_MODE=oauth")?;
        let jwks_url = std::env::var("OAUTH_JWKS_URL").ok();
        let jwks_cache_ttl_secs = std::env::var("OAUTH_JWKS_CACHE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or_else(OAuthConfig::default_cache_ttl_secs);

        Some(OAuthConfig {
            issuer_url,
            audience,
            jwks_url,
            jwks_cache_ttl_secs,
        })
    } else {
        None
    };

    let dev_user_id =
        std::env::var("DEV_USER_ID").unwrap_or_else(|_| AuthConfig::default_dev_user());

    Ok(AuthConfig {
        mode,
        oauth,
        dev_user_id,
    })
}

fn blob_from_env() -> anyhow::Result<BlobConfig> {
    let backend = match std::env::var("BLOB_BACKEND")
        .unwrap_or_else(|_| "s3".to_string())
        .to_lowercase()
        .as_str()
    {
        "memory" => BlobBackend::Memory,
        _ => BlobBackend::S3,
    };

    let bucket = match backend {
        BlobBackend::S3 => std::env::var("S3_BUCKET_NAME")
            .context("S3_BUCKET_NAME must be set when BLOB_BACKEND=s3")?,
        BlobBackend::Memory => {
            std::env::var("S3_BUCKET_NAME").unwrap_or_else(|_| "qrgen".to_string())
        }
    };
    let region = std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
    let endpoint = std::env::var("S3_ENDPOINT").ok();

    let public_base_url = std::env::var("S3_PUBLIC_BASE_URL").unwrap_or_else(|_| match backend {
        BlobBackend::S3 => default_public_base_url(&bucket, &region, endpoint.as_deref()),
        BlobBackend::Memory => format!("memory://{bucket}"),
    });

    let public_read_acl = std::env::var("S3_PUBLIC_READ_ACL")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false);

    Ok(BlobConfig {
        backend,
        bucket,
        region,
        endpoint,
        access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
        secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
        public_base_url,
        public_read_acl,
    })
}

/// Virtual-hosted style URL for AWS, path style for custom endpoints
fn default_public_base_url(bucket: &str, region: &str, endpoint: Option<&str>) -> String {
    match endpoint {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
        None => format!("https://{bucket}.s3.{region}.amazonaws.com"),
    }
}
