//! Layer listing, TileJSON, and health endpoint tests.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use mvt_tileserver::catalog::Extent;

use super::test_utils::{test_router, MockTileSource};

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("host", "localhost:9000")
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

// =============================================================================
// Layer Listing
// =============================================================================

#[tokio::test]
async fn test_layers_listing() {
    let source = MockTileSource::new()
        .with_layer("buildings")
        .with_layer("roads")
        .with_bounds(Extent {
            minx: -13_700_000.0,
            miny: 4_500_000.0,
            maxx: -13_600_000.0,
            maxy: 4_600_000.0,
        });
    let router = test_router(source);

    let response = router.oneshot(get("/layers")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let layers = body["layers"].as_array().unwrap();
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[0]["name"], "buildings");
    assert_eq!(layers[0]["srid"], 3857);
    assert_eq!(layers[0]["geometry_column"], "geom");
    assert!(layers[0]["bounds"]["minx"].as_f64().is_some());
    assert_eq!(layers[1]["name"], "roads");
}

#[tokio::test]
async fn test_layers_json_alias() {
    let source = MockTileSource::new().with_layer("buildings");
    let router = test_router(source);

    let response = router.oneshot(get("/layers.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["layers"].as_array().unwrap().len(), 1);
}

// =============================================================================
// TileJSON
// =============================================================================

#[tokio::test]
async fn test_tilejson_document() {
    let source = MockTileSource::new()
        .with_layer("buildings")
        .with_bounds(Extent {
            minx: -200.0,
            miny: -100.0,
            maxx: 400.0,
            maxy: 300.0,
        });
    let router = test_router(source);

    let response = router.oneshot(get("/tiles/buildings.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let tj = json_body(response).await;
    assert_eq!(tj["tilejson"], "3.0.0");
    assert_eq!(tj["scheme"], "xyz");
    assert_eq!(tj["minzoom"], 0);
    assert_eq!(tj["maxzoom"], 22);
    assert_eq!(
        tj["tiles"][0],
        "http://localhost:9000/tiles/buildings/{z}/{x}/{y}.mvt"
    );
    assert_eq!(tj["bounds"][0], -200.0);
    assert_eq!(tj["center"][0], 100.0);
    assert_eq!(tj["center"][2], 10.0);

    let vl = &tj["vector_layers"][0];
    assert_eq!(vl["id"], "buildings");
    assert_eq!(vl["fields"]["id"], "string");
    assert_eq!(vl["fields"]["name"], "string");
}

#[tokio::test]
async fn test_tilejson_unknown_layer_is_404() {
    let source = MockTileSource::new().with_layer("buildings");
    let router = test_router(source);

    let response = router.oneshot(get("/tiles/unknown.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = json_body(response).await;
    assert_eq!(body["code"], 404);
    assert!(body["description"]
        .as_str()
        .unwrap()
        .contains("unknown"));
}

#[tokio::test]
async fn test_tilejson_requires_json_suffix() {
    let source = MockTileSource::new().with_layer("buildings");
    let router = test_router(source);

    let response = router.oneshot(get("/tiles/buildings")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_ok() {
    let source = MockTileSource::new().with_layer("buildings");
    let router = test_router(source);

    let response = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["spatial_extension"], "loaded");
    assert_eq!(body["cache"]["enabled"], true);
    assert!(body["cache"]["stats"]["hits"].as_u64().is_some());
}

#[tokio::test]
async fn test_health_error_is_503() {
    let source = MockTileSource::new().with_health(false);
    let router = test_router(source);

    let response = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = json_body(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["database"], "disconnected");
}

// =============================================================================
// Routing
// =============================================================================

#[tokio::test]
async fn test_unknown_route_is_404() {
    let source = MockTileSource::new().with_layer("buildings");
    let router = test_router(source);

    let response = router.oneshot(get("/invalid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_post_to_tile_route_is_rejected() {
    let source = MockTileSource::new().with_layer("buildings");
    let router = test_router(source);

    let request = Request::builder()
        .method(axum::http::Method::POST)
        .uri("/tiles/buildings/0/0/0.mvt")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
