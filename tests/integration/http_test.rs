//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! HTTP接口集成测试

#[path = "../common/mod.rs"]
mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{coordinator, eventually, items, stale_snapshot, CountingSource, FlakyStore};
use oxfresh::http::{router, AppState, PROVENANCE_HEADER};
use oxfresh::{FreshnessCoordinator, MemoryStore};
use serde_json::Value;
use serial_test::serial;
use std::sync::Arc;
use tower::ServiceExt;

fn app(coordinator: &FreshnessCoordinator) -> Router {
    router(AppState::new(coordinator.clone()))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let provenance = response
        .headers()
        .get(PROVENANCE_HEADER)
        .map(|v| v.to_str().unwrap().to_string());
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, provenance, body.to_vec())
}

#[tokio::test]
async fn test_data_endpoint_serves_live_then_cache() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(CountingSource::new(items(&["a", "b", "c"])));
    let coordinator = coordinator(store.clone(), source.clone(), "http_data");

    let (status, provenance, body) = get(app(&coordinator), "/data").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(provenance.as_deref(), Some("live"));

    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["capturedAt"].is_string());
    assert_eq!(json["items"].as_array().unwrap().len(), 3);
    assert_eq!(json["items"][0]["name"], "a");

    let (status, provenance, body) = get(app(&coordinator), "/data").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(provenance.as_deref(), Some("cache"));
    let cached: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(cached["capturedAt"], json["capturedAt"]);

    // 缓存响应返回之后才触发后台刷新
    eventually("background refresh ran", || source.calls() == 2).await;
}

#[tokio::test]
async fn test_data_endpoint_reports_failure() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(CountingSource::failing());
    let coordinator = coordinator(store, source, "http_failure");

    let (status, provenance, body) = get(app(&coordinator), "/data").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(provenance, None);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, serde_json::json!({ "error": "Failed to fetch data" }));
}

#[tokio::test]
async fn test_health_endpoint() {
    let store = Arc::new(FlakyStore::with_snapshots(vec![stale_snapshot(&["a"])]));
    let source = Arc::new(CountingSource::new(items(&["b"])));
    let coordinator = coordinator(store.clone(), source, "http_health");

    let (status, _, body) = get(app(&coordinator), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["refreshing"], false);
    assert_eq!(json["store_available"], true);
    assert!(json.get("last_fetched_at").is_none());
    assert!(json["uptime_seconds"].is_u64());

    store.set_fail_reads(true);
    store.set_available(false);
    let (status, provenance, _) = get(app(&coordinator), "/data").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(provenance.as_deref(), Some("live"));

    let (_, _, body) = get(app(&coordinator), "/health").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["store_available"], false);
    assert!(json["last_fetched_at"].is_string());
}

#[tokio::test]
#[serial]
async fn test_metrics_endpoint() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(CountingSource::new(items(&["a"])));
    let coordinator = coordinator(store, source, "http_metrics");
    let service = coordinator.service_name().to_string();

    let (status, _, _) = get(app(&coordinator), "/data").await;
    assert_eq!(status, StatusCode::OK);

    let response = app(&coordinator)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains(&format!(
        "fresh_requests_total{{service=\"{}\", result=\"live\"}} 1",
        service
    )));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let coordinator = coordinator(
        Arc::new(MemoryStore::new()),
        Arc::new(CountingSource::new(Vec::new())),
        "http_404",
    );

    let (status, _, _) = get(app(&coordinator), "/games").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
