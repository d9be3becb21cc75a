//! API integration tests
//!
//! Drive the full router (owner routes + public resolution) against an
//! in-memory SQLite database and an in-memory blob store.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use qrgen::analytics::AccessRecorder;
use qrgen::api::{self, QrService};
use qrgen::auth::AuthService;
use qrgen::blob::{BlobStore, MemoryBlobStore};
use qrgen::codegen::{self, CodeGenerator, CodeSource};
use qrgen::config::{AuthConfig, AuthMode, OAuthConfig};
use qrgen::models::{AccessLogEntry, NewQrRecord, QrRecord, QrRecordWithViews};
use qrgen::redirect::{self, Resolver};
use qrgen::storage::{SqliteStorage, Storage, StorageError, StorageResult};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const TIMEOUT: Duration = Duration::from_secs(5);
const SHORT_TIMEOUT: Duration = Duration::from_millis(200);
const STALL: Duration = Duration::from_secs(5);
const PUBLIC_BASE_URL: &str = "https://qr.example.com";

struct TestApp {
    router: Router,
    storage: Arc<dyn Storage>,
    blobs: Arc<MemoryBlobStore>,
}

/// Always draws the same candidate
struct FixedSource(&'static str);

impl CodeSource for FixedSource {
    fn draw(&self) -> String {
        self.0.to_string()
    }
}

/// Failures injected around a real store
#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    fail_insert: bool,
    stall_insert: bool,
    fail_access: bool,
}

struct FaultyStorage {
    inner: Arc<dyn Storage>,
    faults: Faults,
}

#[async_trait]
impl Storage for FaultyStorage {
    async fn init(&self) -> anyhow::Result<()> {
        self.inner.init().await
    }

    async fn create_record(&self, record: NewQrRecord<'_>) -> StorageResult<QrRecord> {
        if self.faults.stall_insert {
            tokio::time::sleep(STALL).await;
        }
        if self.faults.fail_insert {
            return Err(StorageError::Other(anyhow::anyhow!("disk I/O error")));
        }
        self.inner.create_record(record).await
    }

    async fn get_active_by_code(&self, tracking_code: &str) -> anyhow::Result<Option<QrRecord>> {
        self.inner.get_active_by_code(tracking_code).await
    }

    async fn record_access(&self, tracking_code: &str) -> anyhow::Result<()> {
        if self.faults.fail_access {
            anyhow::bail!("access log is read-only");
        }
        self.inner.record_access(tracking_code).await
    }

    async fn view_count(&self, tracking_code: &str) -> anyhow::Result<i64> {
        self.inner.view_count(tracking_code).await
    }

    async fn access_log(
        &self,
        tracking_code: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<AccessLogEntry>> {
        self.inner.access_log(tracking_code, limit).await
    }

    async fn list_active(&self, owner_id: &str) -> anyhow::Result<Vec<QrRecordWithViews>> {
        self.inner.list_active(owner_id).await
    }

    async fn list_all_active(
        &self,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<QrRecordWithViews>> {
        self.inner.list_all_active(limit, offset).await
    }

    async fn soft_delete(&self, owner_id: &str, static_image_url: &str) -> anyhow::Result<bool> {
        self.inner.soft_delete(owner_id, static_image_url).await
    }
}

/// Blob store whose n-th upload (zero based) never finishes in time
struct StallingBlobs {
    inner: Arc<MemoryBlobStore>,
    stall_on: usize,
    uploads: AtomicUsize,
}

#[async_trait]
impl BlobStore for StallingBlobs {
    async fn put_png(&self, key: &str, body: Bytes) -> anyhow::Result<String> {
        if self.uploads.fetch_add(1, Ordering::SeqCst) == self.stall_on {
            tokio::time::sleep(STALL).await;
        }
        self.inner.put_png(key, body).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.inner.delete(key).await
    }
}

async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

async fn dev_auth(user: &str) -> Arc<AuthService> {
    Arc::new(
        AuthService::new(AuthConfig {
            mode: AuthMode::None,
            oauth: None,
            dev_user_id: user.to_string(),
        })
        .await
        .unwrap(),
    )
}

fn build_router(
    storage: &Arc<dyn Storage>,
    blobs: Arc<dyn BlobStore>,
    generator: CodeGenerator,
    auth: Arc<AuthService>,
) -> Router {
    build_router_with_timeout(storage, blobs, generator, auth, TIMEOUT)
}

fn build_router_with_timeout(
    storage: &Arc<dyn Storage>,
    blobs: Arc<dyn BlobStore>,
    generator: CodeGenerator,
    auth: Arc<AuthService>,
    timeout: Duration,
) -> Router {
    let service = QrService::new(
        Arc::clone(storage),
        blobs,
        generator,
        PUBLIC_BASE_URL,
        timeout,
    );
    let recorder = AccessRecorder::new(Arc::clone(storage), timeout);
    let resolver = Resolver::new(Arc::clone(storage), recorder, timeout);

    api::create_api_router(service, auth).merge(redirect::create_redirect_router(resolver))
}

async fn setup_with(generator: CodeGenerator) -> TestApp {
    let storage = create_test_storage().await;
    let blobs = Arc::new(MemoryBlobStore::new("memory://qrgen"));
    let router = build_router(&storage, blobs.clone(), generator, dev_auth("owner-1").await);
    TestApp {
        router,
        storage,
        blobs,
    }
}

async fn setup() -> TestApp {
    setup_with(CodeGenerator::new(20)).await
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn create_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/qr")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn create(app: &TestApp, destination: &str) -> Value {
    let (status, body) = send(
        &app.router,
        create_request(json!({ "destinationUrl": destination })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {body}");
    body
}

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;
    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
}

#[tokio::test]
async fn test_create_then_resolve_normalizes_destination() {
    let app = setup().await;

    let created = create(&app, "example.com").await;
    let code = created["trackingCode"].as_str().unwrap();
    assert!(codegen::is_well_formed(code));
    assert_eq!(
        created["trackingUrl"],
        format!("{PUBLIC_BASE_URL}/qr/redirect?code={code}")
    );

    let static_uri = created["staticImageUri"].as_str().unwrap();
    let tracking_uri = created["trackingImageUri"].as_str().unwrap();
    assert!(static_uri.starts_with("memory://qrgen/owner-1/"));
    assert!(tracking_uri.ends_with(&format!("-{code}.png")));
    assert_eq!(app.blobs.len().await, 2);
    let keys = app.blobs.keys().await;
    assert!(keys.iter().all(|key| key.starts_with("owner-1/")));
    assert!(keys.iter().any(|key| key.ends_with(&format!("-{code}.png"))));

    let (status, body) = send(&app.router, get(&format!("/api/qr/redirect?code={code}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "https://example.com");

    // Stored destination is kept as entered
    let record = app.storage.get_active_by_code(code).await.unwrap().unwrap();
    assert_eq!(record.destination_url, "example.com");
    assert_eq!(app.storage.view_count(code).await.unwrap(), 1);
}

#[tokio::test]
async fn test_resolve_is_not_a_redirect() {
    let app = setup().await;
    let created = create(&app, "http://example.org/page").await;
    let code = created["trackingCode"].as_str().unwrap();

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/api/qr/redirect?code={code}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::LOCATION).is_none());
}

#[tokio::test]
async fn test_same_owner_gets_distinct_codes() {
    let app = setup().await;

    let first = create(&app, "https://example.com").await;
    let second = create(&app, "https://example.com").await;

    assert_ne!(first["trackingCode"], second["trackingCode"]);
    assert_ne!(first["staticImageUri"], second["staticImageUri"]);
    assert_eq!(app.blobs.len().await, 4);
}

#[tokio::test]
async fn test_list_returns_newest_first_with_views() {
    let app = setup().await;

    let older = create(&app, "https://older.example").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let newer = create(&app, "https://newer.example").await;

    let older_code = older["trackingCode"].as_str().unwrap();
    for _ in 0..3 {
        let (status, _) = send(
            &app.router,
            get(&format!("/api/qr/redirect?code={older_code}")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app.router, get("/api/qr")).await;
    assert_eq!(status, StatusCode::OK);
    let codes = body["qrCodes"].as_array().unwrap();
    assert_eq!(codes.len(), 2);

    assert_eq!(codes[0]["trackingCode"], newer["trackingCode"]);
    assert_eq!(codes[0]["viewCount"], 0);
    assert_eq!(codes[1]["trackingCode"], older["trackingCode"]);
    assert_eq!(codes[1]["viewCount"], 3);
    assert_eq!(codes[1]["trackingUrl"], older["trackingUrl"]);
    assert_eq!(codes[1]["destinationUrl"], "https://older.example");
}

#[tokio::test]
async fn test_delete_hides_record_and_stops_resolution() {
    let app = setup().await;
    let created = create(&app, "https://example.com").await;
    let code = created["trackingCode"].as_str().unwrap();
    let static_uri = created["staticImageUri"].as_str().unwrap();

    // One hit before deletion stays in the log
    send(&app.router, get(&format!("/api/qr/redirect?code={code}"))).await;

    let (status, body) = send(&app.router, delete(&format!("/api/qr?qr_url={static_uri}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, list) = send(&app.router, get("/api/qr")).await;
    assert!(list["qrCodes"].as_array().unwrap().is_empty());

    let (status, _) = send(&app.router, get(&format!("/api/qr/redirect?code={code}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.storage.view_count(code).await.unwrap(), 1);

    // Second delete is a no-op, and the legacy parameter name works too
    let (status, _) = send(&app.router, delete(&format!("/api/qr?imageUri={static_uri}"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_delete_is_scoped_to_owner() {
    let storage = create_test_storage().await;
    let blobs = Arc::new(MemoryBlobStore::new("memory://qrgen"));
    let alice = build_router(&storage, blobs.clone(), CodeGenerator::new(20), dev_auth("alice").await);
    let mallory = build_router(&storage, blobs.clone(), CodeGenerator::new(20), dev_auth("mallory").await);

    let (status, created) = send(&alice, create_request(json!({ "url": "example.com" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let static_uri = created["staticImageUri"].as_str().unwrap();

    let (status, _) = send(&mallory, delete(&format!("/api/qr?qr_url={static_uri}"))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = send(&alice, get("/api/qr")).await;
    assert_eq!(list["qrCodes"].as_array().unwrap().len(), 1);
    let (_, list) = send(&mallory, get("/api/qr")).await;
    assert!(list["qrCodes"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_requires_image_url() {
    let app = setup().await;
    let (status, body) = send(&app.router, delete("/api/qr")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_create_validates_input() {
    let app = setup().await;

    for body in [
        json!({ "destinationUrl": "   " }),
        json!({ "destinationUrl": "https://example.com", "size": 20 }),
        json!({ "destinationUrl": "https://example.com", "color": "red" }),
        json!({ "destinationUrl": "https://example.com", "errorCorrection": "Z" }),
    ] {
        let (status, response) = send(&app.router, create_request(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {response}");
    }

    assert!(app.blobs.is_empty().await);
    assert!(app.storage.list_active("owner-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_failure_leaves_nothing_behind() {
    let app = setup().await;
    app.blobs.set_fail_uploads(true);

    let (status, body) = send(
        &app.router,
        create_request(json!({ "destinationUrl": "https://example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "failed to upload QR code image");

    assert!(app.blobs.is_empty().await);
    assert!(app.storage.list_active("owner-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_exhausted_generation_cleans_up_images() {
    let taken = "qrgen_TAKEN001";
    let app = setup_with(CodeGenerator::with_source(Arc::new(FixedSource(taken)), 3)).await;

    app.storage
        .create_record(NewQrRecord {
            owner_id: "someone-else",
            destination_url: "https://first.example",
            static_image_url: "memory://qrgen/someone-else/first.png",
            tracking_image_url: None,
            tracking_code: Some(taken),
        })
        .await
        .unwrap();

    let (status, _) = send(
        &app.router,
        create_request(json!({ "destinationUrl": "https://second.example" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    assert!(app.blobs.is_empty().await);
    assert!(app.storage.list_active("owner-1").await.unwrap().is_empty());

    // The existing holder of the code is untouched
    let (status, body) = send(&app.router, get(&format!("/api/qr/redirect?code={taken}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "https://first.example");
}

#[tokio::test]
async fn test_resolve_unknown_and_missing_codes() {
    let app = setup().await;

    let (status, _) = send(&app.router, get("/api/qr/redirect?code=qrgen_NOPE0000")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app.router, get("/api/qr/redirect?code=not-a-code")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app.router, get("/api/qr/redirect")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.storage.view_count("qrgen_NOPE0000").await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_resolutions_are_all_counted() {
    let app = setup().await;
    let created = create(&app, "https://example.com").await;
    let code = created["trackingCode"].as_str().unwrap().to_string();

    let mut handles = Vec::new();
    for _ in 0..25 {
        let router = app.router.clone();
        let uri = format!("/api/qr/redirect?code={code}");
        handles.push(tokio::spawn(async move {
            router.oneshot(get(&uri)).await.unwrap().status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(app.storage.view_count(&code).await.unwrap(), 25);
    let (_, list) = send(&app.router, get("/api/qr")).await;
    assert_eq!(list["qrCodes"][0]["viewCount"], 25);
}

#[tokio::test]
async fn test_oauth_mode_rejects_missing_and_invalid_tokens() {
    let storage = create_test_storage().await;
    let blobs = Arc::new(MemoryBlobStore::new("memory://qrgen"));

    // Nothing listens here; priming the key cache fails without failing startup
    let auth = AuthService::new(AuthConfig {
        mode: AuthMode::Oauth,
        oauth: Some(OAuthConfig {
            issuer_url: "https://accounts.google.com".to_string(),
            audience: "qrgen-test".to_string(),
            jwks_url: Some("http://127.0.0.1:9/jwks.json".to_string()),
            jwks_cache_ttl_secs: 300,
        }),
        dev_user_id: "unused".to_string(),
    })
    .await
    .unwrap();
    let router = build_router(&storage, blobs.clone(), CodeGenerator::new(20), Arc::new(auth));

    let (status, _) = send(&router, get("/api/qr")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/qr")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "authentication required");

    // Public routes stay open
    let (status, _) = send(&router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&router, get("/api/qr/redirect?code=qrgen_NOPE0000")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Router over a fault-injecting store, with the in-memory blobs it writes to
async fn faulty_app(
    faults: Faults,
    timeout: Duration,
) -> (Router, Arc<dyn Storage>, Arc<MemoryBlobStore>) {
    let inner = create_test_storage().await;
    let storage: Arc<dyn Storage> = Arc::new(FaultyStorage {
        inner: Arc::clone(&inner),
        faults,
    });
    let blobs = Arc::new(MemoryBlobStore::new("memory://qrgen"));
    let router = build_router_with_timeout(
        &storage,
        blobs.clone(),
        CodeGenerator::new(20),
        dev_auth("owner-1").await,
        timeout,
    );
    (router, inner, blobs)
}

#[tokio::test]
async fn test_tracking_upload_timeout_discards_static_image() {
    let storage = create_test_storage().await;
    let blobs = Arc::new(MemoryBlobStore::new("memory://qrgen"));
    let stalling = Arc::new(StallingBlobs {
        inner: blobs.clone(),
        stall_on: 1,
        uploads: AtomicUsize::new(0),
    });
    let router = build_router_with_timeout(
        &storage,
        stalling,
        CodeGenerator::new(20),
        dev_auth("owner-1").await,
        SHORT_TIMEOUT,
    );

    let (status, body) = send(
        &router,
        create_request(json!({ "destinationUrl": "https://example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "image upload timed out");

    assert!(blobs.is_empty().await, "left behind: {:?}", blobs.keys().await);
    assert!(storage.list_active("owner-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_insert_failure_discards_both_images() {
    let faults = Faults {
        fail_insert: true,
        ..Faults::default()
    };
    let (router, storage, blobs) = faulty_app(faults, TIMEOUT).await;

    let (status, body) = send(
        &router,
        create_request(json!({ "destinationUrl": "https://example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal server error");

    assert!(blobs.is_empty().await, "left behind: {:?}", blobs.keys().await);
    assert!(storage.list_active("owner-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_insert_timeout_keeps_images_and_is_retryable() {
    let faults = Faults {
        stall_insert: true,
        ..Faults::default()
    };
    let (router, _storage, blobs) = faulty_app(faults, SHORT_TIMEOUT).await;

    let response = router
        .clone()
        .oneshot(create_request(
            json!({ "destinationUrl": "https://example.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response.headers().get(header::RETRY_AFTER).unwrap(),
        "1"
    );

    // The row may still commit, so both images stay
    let keys = blobs.keys().await;
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|key| key.starts_with("owner-1/")));
}

#[tokio::test]
async fn test_recorder_failure_still_resolves() {
    let faults = Faults {
        fail_access: true,
        ..Faults::default()
    };
    let (router, storage, _blobs) = faulty_app(faults, TIMEOUT).await;

    storage
        .create_record(NewQrRecord {
            owner_id: "owner-1",
            destination_url: "example.com",
            static_image_url: "memory://qrgen/owner-1/a.png",
            tracking_image_url: Some("memory://qrgen/owner-1/a-track.png"),
            tracking_code: Some("qrgen_ABCD1234"),
        })
        .await
        .unwrap();

    let (status, body) = send(&router, get("/api/qr/redirect?code=qrgen_ABCD1234")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "https://example.com");
    assert_eq!(storage.view_count("qrgen_ABCD1234").await.unwrap(), 0);
}
