//! General API behaviour: health, CORS, caching headers and error bodies.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use pathway::{create_router, AppState, Database, SlideOpener, RouterConfig, SlideRegistry, TileService};

use super::test_utils::{header, json_body, write_raster_slide, TestApp};

#[tokio::test]
async fn test_health() {
    let app = TestApp::empty();

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_route() {
    let app = TestApp::empty();
    assert_eq!(app.get("/nope").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_preflight_any_origin() {
    let app = TestApp::empty();

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/profiles")
        .header("origin", "https://viewer.example.com")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "access-control-allow-origin"), "*");
}

#[tokio::test]
async fn test_cors_restricted_origins() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = Arc::new(Database::open_in_memory().unwrap());
    let tiles = TileService::new(dir.path(), SlideRegistry::new(SlideOpener), Arc::clone(&db));
    let router = create_router(
        AppState::new(db, tiles),
        RouterConfig::new()
            .with_cors_origins(vec!["https://viewer.example.com".to_string()])
            .with_tracing(false),
    );

    let request = Request::builder()
        .uri("/health")
        .header("origin", "https://viewer.example.com")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(
        header(&response, "access-control-allow-origin"),
        "https://viewer.example.com"
    );

    let request = Request::builder()
        .uri("/health")
        .header("origin", "https://other.example.com")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert!(response
        .headers()
        .get("access-control-allow-origin")
        .is_none());
}

#[tokio::test]
async fn test_custom_cache_max_age() {
    let dir = tempfile::TempDir::new().unwrap();
    write_raster_slide(dir.path(), "case1.svs", 300, 200);
    let db = Arc::new(Database::open_in_memory().unwrap());
    let tiles = TileService::new(dir.path(), SlideRegistry::new(SlideOpener), Arc::clone(&db));
    let router = create_router(
        AppState::new(db, tiles),
        RouterConfig::new().with_cache_max_age(60).with_tracing(false),
    );

    let request = Request::builder()
        .uri("/tiles/case1.svs/9/0_0.jpeg")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "cache-control"), "public, max-age=60");
}

#[tokio::test]
async fn test_error_body_shape() {
    let app = TestApp::empty();

    let response = app.get("/profiles/missing/template").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = json_body(response).await;
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["status"], 404);
    assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
}

#[tokio::test]
async fn test_malformed_json_body() {
    let app = TestApp::empty();

    let response = app
        .post("/profiles", "application/json", "{not json")
        .await;
    assert!(response.status().is_client_error());
}
