//! HTTP entrypoint
//!
//! Runs discovery on request and keeps the most recent result. One run at
//! a time; the engine (and its breaker registry) lives as long as the server.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::discovery::DiscoveryResult;
use crate::engine::Engine;
use crate::providers::ResultSink;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,
    sinks: Arc<Vec<Box<dyn ResultSink>>>,
    latest: Arc<RwLock<Option<DiscoveryResult>>>,
    running: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(engine: Engine, sinks: Vec<Box<dyn ResultSink>>) -> Self {
        Self {
            engine: Arc::new(engine),
            sinks: Arc::new(sinks),
            latest: Arc::new(RwLock::new(None)),
            running: Arc::new(Mutex::new(())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/discovery/run", post(run_discovery))
        .route("/api/discovery/latest", get(latest_result))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "fleetscan-engine",
        "version": env!("CARGO_PKG_VERSION"),
        "accounts": state.engine.config().accounts.len(),
        "breakers": state.engine.orchestrator().breakers().snapshot(),
    }))
}

async fn run_discovery(State(state): State<AppState>) -> Response {
    let Ok(_running) = state.running.try_lock() else {
        return (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "status": "error",
                "message": "a discovery run is already in progress"
            })),
        )
            .into_response();
    };

    let result = state.engine.run().await;
    publish(&state.sinks, &result).await;
    *state.latest.write().await = Some(result.clone());

    Json(result).into_response()
}

async fn latest_result(State(state): State<AppState>) -> Response {
    match state.latest.read().await.as_ref() {
        Some(result) => Json(result.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "status": "error",
                "message": "no discovery run has completed yet"
            })),
        )
            .into_response(),
    }
}

/// Hand the result to every sink; failures are logged, never retried
pub async fn publish(sinks: &[Box<dyn ResultSink>], result: &DiscoveryResult) {
    for sink in sinks {
        match sink.publish(result).await {
            Ok(()) => info!(sink = sink.name(), run_id = %result.run_id, "Result published"),
            Err(e) => warn!(sink = sink.name(), run_id = %result.run_id, error = %e, "Result sink failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoveryConfig;
    use crate::discovery::fixtures::{instance, RegionScript, ScriptedLister, StaticCredentials};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait]
    impl ResultSink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        async fn publish(&self, _result: &DiscoveryResult) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl ResultSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn publish(&self, _result: &DiscoveryResult) -> anyhow::Result<()> {
            anyhow::bail!("sink unavailable")
        }
    }

    fn state(published: Arc<AtomicUsize>) -> AppState {
        let config = DiscoveryConfig::from_json(
            r#"{"default_regions": ["us-east-1"], "accounts": [{"id": "111", "credential_ref": "A"}]}"#,
        )
        .unwrap();
        let lister = ScriptedLister::new().region(
            "111",
            "us-east-1",
            RegionScript::Pages(vec![vec![instance("db-1"), instance("db-2")]]),
        );
        let engine =
            Engine::with_providers(config, Arc::new(StaticCredentials::new()), Arc::new(lister))
                .unwrap();
        AppState::new(
            engine,
            vec![Box::new(FailingSink), Box::new(CountingSink(published))],
        )
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(state(Arc::default()));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["accounts"], 1);
    }

    #[tokio::test]
    async fn test_run_then_latest() {
        let published = Arc::new(AtomicUsize::new(0));
        let app = router(state(published.clone()));

        let before = app
            .clone()
            .oneshot(Request::get("/api/discovery/latest").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(before.status(), StatusCode::NOT_FOUND);

        let run = app
            .clone()
            .oneshot(Request::post("/api/discovery/run").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(run.status(), StatusCode::OK);
        let run_body = body_json(run).await;
        assert_eq!(run_body["accounts_scanned"], 1);
        assert_eq!(run_body["resources"].as_array().unwrap().len(), 2);
        // A failing sink does not stop the others
        assert_eq!(published.load(Ordering::SeqCst), 1);

        let latest = app
            .oneshot(Request::get("/api/discovery/latest").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(latest.status(), StatusCode::OK);
        assert_eq!(body_json(latest).await["run_id"], run_body["run_id"]);
    }
}
