//! Cache management endpoint tests: stats, clearing, and API-key auth.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use mvt_tileserver::server::RouterConfig;

use super::test_utils::{test_router, test_router_with_config, test_router_without_cache, MockTileSource};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn delete_with_key(uri: &str, key: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .header("X-API-Key", key)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

// =============================================================================
// Stats and Clearing
// =============================================================================

#[tokio::test]
async fn test_cache_stats_counts_requests() {
    let source = MockTileSource::new().with_layer("buildings");
    let router = test_router(source);

    // One miss, then a hit.
    router
        .clone()
        .oneshot(get("/tiles/buildings/0/0/0.mvt"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    router
        .clone()
        .oneshot(get("/tiles/buildings/0/0/0.mvt"))
        .await
        .unwrap();

    let response = router.oneshot(get("/cache/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stats = json_body(response).await;
    assert_eq!(stats["hits"], 1);
    assert_eq!(stats["misses"], 1);
    assert_eq!(stats["size"], 1);
    assert!(stats["memory_bytes"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_clear_layer_forces_regeneration() {
    let source = MockTileSource::new().with_layer("buildings");
    let router = test_router(source);

    router
        .clone()
        .oneshot(get("/tiles/buildings/0/0/0.mvt"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Clearing the layer reports at least one removed tile.
    let response = router
        .clone()
        .oneshot(delete("/cache/layer/buildings"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["layer"], "buildings");
    assert!(body["removed"].as_u64().unwrap() >= 1);

    // The next request is a miss again.
    let response = router
        .clone()
        .oneshot(get("/tiles/buildings/0/0/0.mvt"))
        .await
        .unwrap();
    assert_eq!(response.headers().get("X-Cache").unwrap(), "MISS");

    // A second sweep finds nothing left.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let response = router
        .clone()
        .oneshot(delete("/cache/layer/buildings"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["removed"], 1);
    let response = router
        .oneshot(delete("/cache/layer/buildings"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["removed"], 0);
}

#[tokio::test]
async fn test_clear_all() {
    let source = MockTileSource::new().with_layer("buildings").with_layer("roads");
    let router = test_router(source);

    router
        .clone()
        .oneshot(get("/tiles/buildings/0/0/0.mvt"))
        .await
        .unwrap();
    router
        .clone()
        .oneshot(get("/tiles/roads/1/0/0.mvt"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = router.clone().oneshot(delete("/cache/clear")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");

    let response = router.oneshot(get("/cache/stats")).await.unwrap();
    let stats = json_body(response).await;
    assert_eq!(stats["size"], 0);
    assert_eq!(stats["memory_bytes"], 0);
}

#[tokio::test]
async fn test_disabled_cache_admin_responses() {
    let source = MockTileSource::new().with_layer("buildings");
    let router = test_router_without_cache(source);

    let response = router.clone().oneshot(get("/cache/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "disabled");

    let response = router.clone().oneshot(delete("/cache/clear")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router
        .oneshot(delete("/cache/layer/buildings"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cache_api_can_be_disabled() {
    let source = MockTileSource::new().with_layer("buildings");
    let config = RouterConfig::new()
        .with_tracing(false)
        .with_cache_api_disabled(true);
    let router = test_router_with_config(source, config);

    let response = router.clone().oneshot(get("/cache/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router.oneshot(delete("/cache/clear")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// API-Key Authentication
// =============================================================================

#[tokio::test]
async fn test_missing_api_key_is_401() {
    let source = MockTileSource::new().with_layer("buildings");
    let config = RouterConfig::new()
        .with_tracing(false)
        .with_cache_api_key(Some("sesame".to_string()));
    let router = test_router_with_config(source, config);

    let response = router.oneshot(delete("/cache/clear")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], 401);
}

#[tokio::test]
async fn test_wrong_api_key_is_403() {
    let source = MockTileSource::new().with_layer("buildings");
    let config = RouterConfig::new()
        .with_tracing(false)
        .with_cache_api_key(Some("sesame".to_string()));
    let router = test_router_with_config(source, config);

    let response = router
        .oneshot(delete_with_key("/cache/clear", "wrong"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["code"], 403);
}

#[tokio::test]
async fn test_valid_api_key_is_accepted() {
    let source = MockTileSource::new().with_layer("buildings");
    let config = RouterConfig::new()
        .with_tracing(false)
        .with_cache_api_key(Some("sesame".to_string()));
    let router = test_router_with_config(source, config);

    let response = router
        .oneshot(delete_with_key("/cache/clear", "sesame"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_no_configured_key_means_public_access() {
    let source = MockTileSource::new().with_layer("buildings");
    let router = test_router(source);

    let response = router.oneshot(get("/cache/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_key_does_not_gate_tile_routes() {
    let source = MockTileSource::new().with_layer("buildings");
    let config = RouterConfig::new()
        .with_tracing(false)
        .with_cache_api_key(Some("sesame".to_string()));
    let router = test_router_with_config(source, config);

    let response = router
        .oneshot(get("/tiles/buildings/0/0/0.mvt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
