/// HTTP surface tests
/// These drive the full router, with every default middleware stage applied,
/// against in-memory stores.
mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use common::*;
use pattaya_api::{
    auth::build_resolver,
    create_app,
    lifecycle::PhotoLifecycle,
    middleware::pipeline::PipelineConfig,
    models::PhotoStatus,
    utils::config::{
        AuthPolicyConfig, Config, DatabaseConfig, LifecycleConfig, ProviderConfig, ServerConfig,
        SessionConfig, DEFAULT_PROVIDER_JWKS_URL,
    },
    AppState,
};
use serde_json::{json, Value};
use std::sync::{atomic::Ordering, Arc};
use tower::ServiceExt;

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            supabase_url: "http://127.0.0.1:1".to_string(),
            supabase_key: "unused".to_string(),
        },
        session: SessionConfig {
            jwt_secret: SESSION_SECRET.to_string(),
        },
        provider: ProviderConfig {
            project_id: None,
            jwks_url: DEFAULT_PROVIDER_JWKS_URL.to_string(),
            key_cache_ttl_secs: 3600,
        },
        auth: AuthPolicyConfig::default(),
        lifecycle: LifecycleConfig::default(),
        pipeline: PipelineConfig::default(),
    }
}

struct TestApp {
    router: Router,
    identities: Arc<MemoryIdentityStore>,
    photos: Arc<MemoryPhotoStore>,
}

fn test_app() -> TestApp {
    let config = Arc::new(test_config());
    let identities = Arc::new(MemoryIdentityStore::new(vec![
        identity(1, "somchai", Some("uid-somchai"), false),
        identity(2, "blocked_user", None, true),
    ]));
    let photos = Arc::new(MemoryPhotoStore::with_photo(10, PhotoStatus::Pending));

    let resolver = build_resolver(&config, identities.clone()).expect("Failed to build resolver");
    let state = AppState {
        photos: photos.clone(),
        lifecycle: Arc::new(PhotoLifecycle::new(photos.clone(), &config.lifecycle)),
        resolver: Arc::new(resolver),
        config,
    };

    TestApp {
        router: create_app(state).expect("Failed to build app"),
        identities,
        photos,
    }
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn send_json(method: Method, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_carries_pipeline_headers() {
    let app = test_app();
    let response = send(&app.router, get("/health", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(headers["x-powered-by"], "Pattaya API");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    let csp = headers[header::CONTENT_SECURITY_POLICY].to_str().unwrap();
    assert!(csp.contains("img-src 'self' data: blob: https:"));
    assert!(!csp.contains("upgrade-insecure-requests"));

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_me_requires_identity() {
    let app = test_app();

    let response = send(&app.router, get("/api/users/me", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "AuthenticationError");

    let response = send(&app.router, get("/api/users/me", Some("garbage"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app.router, get("/api/users/me", Some(&session_token(2)))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_returns_session_identity() {
    let app = test_app();
    let response = send(&app.router, get("/api/users/me", Some(&session_token(1)))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["id"], 1);
    assert_eq!(body["username"], "somchai");
    assert_eq!(body["role"]["type"], "authenticated");
}

#[tokio::test]
async fn test_unresolved_token_never_rejected_on_public_routes() {
    let app = test_app();
    let response = send(&app.router, get("/health", Some("garbage"))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_store_fault_is_a_server_error() {
    let app = test_app();
    app.identities.unreachable.store(true, Ordering::SeqCst);

    let response = send(&app.router, get("/health", Some(&session_token(1)))).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "InternalError");
}

#[tokio::test]
async fn test_resolution_diagnostics() {
    let app = test_app();
    let response = send(
        &app.router,
        get("/api/auth/resolution", Some(&session_token(2))),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["identity"], Value::Null);
    assert_eq!(
        body["attempts"],
        json!([
            { "strategy": "session", "outcome": "identity_blocked" },
            { "strategy": "provider", "outcome": "inapplicable" }
        ])
    );
}

#[tokio::test]
async fn test_reject_then_reset_photo() {
    let app = test_app();
    let token = session_token(1);

    let response = send(
        &app.router,
        send_json(
            Method::PUT,
            "/api/photos/10",
            &token,
            json!({ "status": "rejected", "rejection_reason": "blurry" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["rejection_reason"], "blurry");
    assert!(body["rejected_at"].is_string());
    assert_eq!(body["approved_at"], Value::Null);

    let response = send(
        &app.router,
        send_json(Method::PUT, "/api/photos/10", &token, json!({ "status": "pending" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let stored = app.photos.get(10).unwrap();
    assert_eq!(stored.status, PhotoStatus::Pending);
    assert!(stored.approved_at.is_none());
    assert!(stored.rejected_at.is_none());
    assert!(stored.rejection_reason.is_none());
}

#[tokio::test]
async fn test_approve_photo_clears_rejection() {
    let app = test_app();
    let token = session_token(1);

    send(
        &app.router,
        send_json(
            Method::PUT,
            "/api/photos/10",
            &token,
            json!({ "status": "rejected", "rejection_reason": "duplicate" }),
        ),
    )
    .await;
    let response = send(
        &app.router,
        send_json(Method::PUT, "/api/photos/10", &token, json!({ "status": "approved" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let stored = app.photos.get(10).unwrap();
    assert_eq!(stored.status, PhotoStatus::Approved);
    assert!(stored.approved_at.is_some());
    assert!(stored.rejected_at.is_none());
    assert!(stored.rejection_reason.is_none());
}

#[tokio::test]
async fn test_update_unknown_photo() {
    let app = test_app();
    let response = send(
        &app.router,
        send_json(
            Method::PUT,
            "/api/photos/999",
            &session_token(1),
            json!({ "status": "approved" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_requires_identity() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/api/photos/10")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "status": "approved" }).to_string()))
        .unwrap();

    let response = send(&app.router, request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.photos.get(10).unwrap().status, PhotoStatus::Pending);
}

#[tokio::test]
async fn test_create_photo_defaults() {
    let app = test_app();
    let response = send(
        &app.router,
        send_json(
            Method::POST,
            "/api/photos",
            &session_token(1),
            json!({ "caption": "Sanctuary of Truth" }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["status"], "approved");
    assert_eq!(body["author"], 1);
    assert_eq!(body["caption"], "Sanctuary of Truth");
    assert!(body["approved_at"].is_string());
    assert!(body["uploaded_at"].is_string());
}

#[tokio::test]
async fn test_overlong_rejection_reason() {
    let app = test_app();
    let response = send(
        &app.router,
        send_json(
            Method::PUT,
            "/api/photos/10",
            &session_token(1),
            json!({ "status": "rejected", "rejection_reason": "x".repeat(1001) }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_declared_body_too_large() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/photos")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, (64 * 1024 * 1024).to_string())
        .body(Body::from("{}"))
        .unwrap();

    let response = send(&app.router, request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_cors_preflight() {
    let app = test_app();
    let preflight = |origin: &str| {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/photos/10")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
            .body(Body::empty())
            .unwrap()
    };

    let response = send(&app.router, preflight("http://localhost:3000")).await;
    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

    let response = send(&app.router, preflight("https://evil.example")).await;
    assert!(!response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}
