use std::time::{Duration, Instant};

use pipeline_camera_push::infrastructure::http;
use pipeline_camera_push::{HealthSnapshot, HealthStore, PrometheusReporter};
use tokio_util::sync::CancellationToken;

async fn get_json(store: &HealthStore, path: &str) -> serde_json::Value {
    let response = warp::test::request()
        .method("GET")
        .path(path)
        .reply(&http::routes(store.clone()))
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/json");
    serde_json::from_slice(response.body()).unwrap()
}

#[tokio::test]
async fn test_initial_health_has_every_field() {
    let store = HealthStore::new();
    let body = get_json(&store, "/health").await;

    assert_eq!(body["status"], "degraded");
    assert_eq!(body["camera"], false);
    assert_eq!(body["publish"], "down");
    assert_eq!(body["uptime_seconds"], 0.0);
    assert!(body["last_error"].is_null());
    assert!(body["timestamp"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_status_follows_snapshot() {
    let store = HealthStore::new();

    store.publish(store.snapshot().starting());
    let body = get_json(&store, "/health").await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["camera"], true);
    assert_eq!(body["publish"], "starting");

    store.publish(store.snapshot().up(Instant::now() - Duration::from_secs(12)));
    let body = get_json(&store, "/health").await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["publish"], "up");
    assert!(body["uptime_seconds"].as_f64().unwrap() >= 12.0);

    store.publish(store.snapshot().down(Some("ffmpeg exited with code 1".to_string())));
    let body = get_json(&store, "/").await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["camera"], false);
    assert_eq!(body["uptime_seconds"], 0.0);
    assert_eq!(body["last_error"], "ffmpeg exited with code 1");
}

#[tokio::test]
async fn test_root_and_health_agree() {
    let store = HealthStore::new();
    store.publish(HealthSnapshot::initial().down(Some("boom".to_string())));

    let root = get_json(&store, "/").await;
    let health = get_json(&store, "/health").await;
    assert_eq!(root["last_error"], health["last_error"]);
    assert_eq!(root["status"], health["status"]);
}

#[tokio::test]
async fn test_liveness_probe() {
    let response = warp::test::request()
        .method("GET")
        .path("/livez")
        .reply(&http::routes(HealthStore::new()))
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.body(), "OK");
}

#[tokio::test]
async fn test_metrics_endpoint_serves_text() {
    // Registration fails harmlessly if another test registered first
    let _ = PrometheusReporter::init_metrics();

    let response = warp::test::request()
        .method("GET")
        .path("/metrics")
        .reply(&http::routes(HealthStore::new()))
        .await;

    assert_eq!(response.status(), 200);
    let body = String::from_utf8(response.body().to_vec()).unwrap();
    assert!(body.contains("pipeline_attempts_total"));
}

#[tokio::test]
async fn test_post_is_rejected() {
    let response = warp::test::request()
        .method("POST")
        .path("/health")
        .reply(&http::routes(HealthStore::new()))
        .await;

    assert_eq!(response.status(), 405);
}

#[tokio::test]
async fn test_server_binds_and_shuts_down() {
    let store = HealthStore::new();
    let shutdown = CancellationToken::new();

    let (addr, server) = http::bind(store, 0, shutdown.clone()).unwrap();
    assert_ne!(addr.port(), 0);
    let handle = tokio::spawn(server);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("server should stop after shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_bind_fails_when_port_taken() {
    let shutdown = CancellationToken::new();
    let (addr, server) = http::bind(HealthStore::new(), 0, shutdown.clone()).unwrap();
    let handle = tokio::spawn(server);

    assert!(http::bind(HealthStore::new(), addr.port(), shutdown.clone()).is_err());

    shutdown.cancel();
    handle.await.unwrap();
}
