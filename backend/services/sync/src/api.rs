use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tidemark_common::types::ServiceInfo;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::scheduler::{StatusSnapshot, SyncScheduler};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<SyncScheduler>,
    pub info: ServiceInfo,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(state.info)
}

async fn sync_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.scheduler.status().await)
}

fn accepted() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted" })),
    )
}

async fn trigger_full(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    state.scheduler.trigger_full_sync()?;
    Ok(accepted())
}

async fn trigger_incremental(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    state.scheduler.trigger_incremental_sync()?;
    Ok(accepted())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/sync/status", get(sync_status))
        .route("/sync/full", post(trigger_full))
        .route("/sync/incremental", post(trigger_incremental))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::multi::SyncMode;
    use crate::scheduler::{JobResult, SchedulerConfig, SyncRunner};

    struct NoopRunner;

    #[async_trait]
    impl SyncRunner for NoopRunner {
        async fn run(&self, _mode: SyncMode, _cancel: CancellationToken) -> JobResult {
            Ok(0)
        }
    }

    /// Scheduler that is never started, so queued triggers stay queued.
    fn test_state(queue_capacity: usize) -> AppState {
        let config = SchedulerConfig {
            queue_capacity,
            run_on_startup: false,
            ..SchedulerConfig::default()
        };
        AppState {
            scheduler: SyncScheduler::new(Arc::new(NoopRunner), config),
            info: ServiceInfo::new("tidemark-sync"),
        }
    }

    async fn read_body(resp: axum::http::Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = build_router(test_state(1));
        let resp = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(read_body(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn info_names_the_service() {
        let app = build_router(test_state(1));
        let resp = app.oneshot(get("/info")).await.unwrap();
        let body = read_body(resp).await;
        assert_eq!(body["name"], "tidemark-sync");
        assert!(body["instance_id"].is_string());
    }

    #[tokio::test]
    async fn status_has_expected_shape() {
        let app = build_router(test_state(2));
        let resp = app.oneshot(get("/sync/status")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = read_body(resp).await;
        assert_eq!(body["running"], false);
        assert_eq!(body["queue_len"], 0);
        assert!(body["last_full"].is_null());
        assert!(body["last_incremental"].is_null());
        assert!(body["current"].is_null());
        assert!(body["jobs"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn trigger_accepted_then_queue_full() {
        let state = test_state(1);
        let app = build_router(state.clone());

        let resp = app.clone().oneshot(post("/sync/full")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(read_body(resp).await["status"], "accepted");

        let resp = app.clone().oneshot(post("/sync/incremental")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(read_body(resp).await["error"].is_string());

        let resp = app.oneshot(get("/sync/status")).await.unwrap();
        assert_eq!(read_body(resp).await["queue_len"], 1);
    }

    #[tokio::test]
    async fn trigger_after_shutdown_is_unavailable() {
        let state = test_state(4);
        state.scheduler.shutdown().await;
        let app = build_router(state);

        let resp = app.oneshot(post("/sync/incremental")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn trigger_requires_post() {
        let app = build_router(test_state(4));
        let resp = app.oneshot(get("/sync/full")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
