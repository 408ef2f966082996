//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了HTTP接口：数据、健康检查和指标端点。

use crate::coordinator::{FreshnessCoordinator, Served};
use crate::metrics::get_metrics_string;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::time::Instant;

/// 标记响应来源的响应头
pub const PROVENANCE_HEADER: &str = "x-data-source";

/// 路由共享状态
#[derive(Clone, Debug)]
pub struct AppState {
    pub coordinator: FreshnessCoordinator,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(coordinator: FreshnessCoordinator) -> Self {
        Self {
            coordinator,
            started_at: Instant::now(),
        }
    }
}

/// 创建路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/data", get(get_data))
        .route("/health", get(get_health))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    refreshing: bool,
    store_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_fetched_at: Option<String>,
    uptime_seconds: u64,
}

impl IntoResponse for Served {
    fn into_response(self) -> Response {
        let (snapshot, provenance, ticket) = self.into_parts();

        let mut response = Json(snapshot.as_ref()).into_response();
        response.headers_mut().insert(
            PROVENANCE_HEADER,
            HeaderValue::from_static(provenance.as_str()),
        );

        // 响应体已序列化，此时才让后台刷新入队
        drop(ticket);
        response
    }
}

/// GET /data
async fn get_data(State(state): State<AppState>) -> Response {
    match state.coordinator.handle_request().await {
        Ok(served) => served.into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: "Failed to fetch data".to_string(),
            }),
        )
            .into_response(),
    }
}

/// GET /health
async fn get_health(State(state): State<AppState>) -> Json<HealthBody> {
    let coordinator = &state.coordinator;
    Json(HealthBody {
        status: coordinator.store_health().await.as_str(),
        refreshing: coordinator.is_refreshing(),
        store_available: coordinator.store_available(),
        last_fetched_at: coordinator
            .last_fetched()
            .await
            .map(|s| s.captured_at.to_rfc3339()),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// GET /metrics
async fn get_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        get_metrics_string(),
    )
}
