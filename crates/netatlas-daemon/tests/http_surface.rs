//! HTTP surface tests driven through the router without a listener.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use netatlas_core::certify::EchoCertifier;
use netatlas_core::config::ServiceConfig;
use netatlas_core::fetch::ScriptedBackend;
use netatlas_daemon::handlers;
use netatlas_daemon::state::{ServiceHandle, SharedState};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const TOPOLOGY_URL: &str = "https://topology.example.test/v1/subnets";
const HARDWARE_URL: &str = "https://hardware.example.test/v1/nodes";

fn start(dir: &TempDir, backend: Arc<ScriptedBackend>) -> SharedState {
    let mut config = ServiceConfig::default();
    config.fetch.topology_url = TOPOLOGY_URL.to_string();
    config.fetch.hardware_url = HARDWARE_URL.to_string();
    config.daemon.state_file = dir.path().join("state.json");
    ServiceHandle::initialize(&config, backend, Arc::new(EchoCertifier::new()))
        .expect("service initializes")
}

fn script_good_datasets(backend: &ScriptedBackend) {
    backend.script_ok(
        TOPOLOGY_URL,
        200,
        r#"{"subnets":[{"subnet_id":"sn-1","nodes":["n1","n2"]}]}"#,
    );
    backend.script_ok(
        HARDWARE_URL,
        200,
        r#"{"nodes":[
            {"node_id":"n1","chip_id":"Type1"},
            {"node_id":"n2","chip_id":"Type3"}
        ]}"#,
    );
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = TempDir::new().unwrap();
    let app = handlers::router(start(&dir, Arc::new(ScriptedBackend::new())));

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["phase"], "idle");
    assert_eq!(body["total_nodes"], 0);
    assert_eq!(body["stale"], true);
}

#[tokio::test]
async fn test_refresh_then_query_roundtrip() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::new());
    script_good_datasets(&backend);
    let app = handlers::router(start(&dir, backend));

    let response = app
        .clone()
        .oneshot(
            Request::post("/refresh")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"caller":"operator"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_subnets"], 1);
    assert_eq!(body["total_nodes"], 2);

    let response = app
        .clone()
        .oneshot(Request::get("/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stats = body_json(response).await;
    assert_eq!(stats["gen1_nodes"], 1);
    assert_eq!(stats["gen2_nodes"], 1);

    let response = app
        .oneshot(Request::get("/subnets/sn-1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let subnet = body_json(response).await;
    assert_eq!(subnet["node_count"], 2);
}

#[tokio::test]
async fn test_rate_limited_refresh_is_429_with_retry_hint() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::new());
    script_good_datasets(&backend);
    let app = handlers::router(start(&dir, backend));

    let first = app
        .clone()
        .oneshot(Request::post("/refresh").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(Request::post("/refresh").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(second).await;
    assert_eq!(body["kind"], "rate_limited");
    assert!(body["retry_after_ns"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_unknown_subnet_is_404() {
    let dir = TempDir::new().unwrap();
    let app = handlers::router(start(&dir, Arc::new(ScriptedBackend::new())));

    let response = app
        .oneshot(Request::get("/subnets/absent").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_upstream_failure_maps_to_bad_gateway() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::new());
    backend.script_ok(TOPOLOGY_URL, 503, "unavailable");
    let app = handlers::router(start(&dir, backend));

    let response = app
        .oneshot(Request::post("/refresh").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "transport");
}

#[tokio::test]
async fn test_certified_bundle_is_hex_encoded() {
    let dir = TempDir::new().unwrap();
    let app = handlers::router(start(&dir, Arc::new(ScriptedBackend::new())));

    let response = app
        .oneshot(Request::get("/certified").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let fingerprint = body["fingerprint"].as_str().unwrap();
    assert_eq!(fingerprint.len(), 64);
    assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    // The echo certifier's certificate is the fingerprint itself.
    assert_eq!(body["certificate"], body["fingerprint"]);
}

#[tokio::test]
async fn test_upload_and_clear() {
    let dir = TempDir::new().unwrap();
    let app = handlers::router(start(&dir, Arc::new(ScriptedBackend::new())));

    let response = app
        .clone()
        .oneshot(
            Request::post("/upload")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"[{"node_id":"n1","node_hardware_generation":"Gen1","subnet_id":"sn-9"}]"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_nodes"], 1);

    let response = app
        .clone()
        .oneshot(Request::post("/clear").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_nodes"], 0);

    let response = app
        .oneshot(Request::get("/subnets").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let subnets = body_json(response).await;
    assert_eq!(subnets.as_array().unwrap().len(), 0);
}
