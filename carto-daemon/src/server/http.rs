//! HTTP routes and handlers for the daemon API.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::state::AppState;
use crate::build::IngestSummary;
use crate::storage::KnowledgeStats;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/ingest", post(ingest))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T, duration_ms: u64) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
            duration_ms,
        })
    }

    fn err(error: impl ToString, duration_ms: u64) -> Json<Self> {
        Json(Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            duration_ms,
        })
    }
}

// =============================================================================
// Health & Status
// =============================================================================

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "carto-daemon"
    }))
}

#[derive(Serialize)]
struct StatusResponse {
    root: String,
    database: String,
    uptime_seconds: f64,
    ingest_running: bool,
    graph: KnowledgeStats,
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let start = Instant::now();

    match state.kb.stats() {
        Ok(graph) => {
            let data = StatusResponse {
                root: state.root.display().to_string(),
                database: state.kb.path().display().to_string(),
                uptime_seconds: state.uptime_seconds(),
                ingest_running: state.ingest_lock.try_lock().is_err(),
                graph,
            };
            ApiResponse::ok(data, start.elapsed().as_millis() as u64)
        }
        Err(e) => ApiResponse::<StatusResponse>::err(e, start.elapsed().as_millis() as u64),
    }
}

// =============================================================================
// Ingest
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct IngestRequest {
    /// Source root, absolute or relative to the daemon root
    #[serde(default)]
    path: Option<String>,
}

async fn ingest(
    State(state): State<Arc<AppState>>,
    body: Option<Json<IngestRequest>>,
) -> impl IntoResponse {
    let start = Instant::now();
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let root = state.resolve_root(req.path.as_deref());

    let Ok(_guard) = state.ingest_lock.try_lock() else {
        return ApiResponse::<IngestSummary>::err(
            "An ingest is already running",
            start.elapsed().as_millis() as u64,
        );
    };

    match state.pipeline.ingest(&root).await {
        Ok(summary) => {
            if let Err(e) = state
                .kb
                .set_metadata("last_ingest", &summary.started_at.to_rfc3339())
            {
                tracing::warn!("Failed to record ingest time: {}", e);
            }
            ApiResponse::ok(summary, start.elapsed().as_millis() as u64)
        }
        Err(e) => {
            tracing::error!("Ingest of {:?} failed: {:#}", root, e);
            ApiResponse::<IngestSummary>::err(format!("{:#}", e), start.elapsed().as_millis() as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{IngestPipeline, PipelineOptions};
    use crate::config::CartoConfig;
    use crate::storage::{GraphStore, KnowledgeBase};
    use tempfile::TempDir;

    async fn serve(dir: &TempDir) -> String {
        let kb = Arc::new(KnowledgeBase::open(dir.path().join("graph.duckdb")).unwrap());
        let store: Arc<dyn GraphStore> = kb.clone();
        let pipeline = IngestPipeline::new(
            CartoConfig::default(),
            store,
            None,
            PipelineOptions {
                embed: false,
                reference_docs: false,
                show_progress: false,
            },
        );
        let state = AppState::new(pipeline, kb, dir.path().join("src"));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let base = serve(&dir).await;
        let body: serde_json::Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_ingest_route_loads_graph() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(
            dir.path().join("src/main.ts"),
            "function g() {}\nfunction f() { g(); }\n",
        )
        .unwrap();
        let base = serve(&dir).await;

        let client = reqwest::Client::new();
        let response: ApiResponse<serde_json::Value> = client
            .post(format!("{}/ingest", base))
            .json(&serde_json::json!({}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(response.success, "{:?}", response.error);
        let data = response.data.unwrap();
        assert_eq!(data["file_count"], 1);
        assert_eq!(data["node_count"], 3);
        assert_eq!(data["load"]["nodes_created"], 3);

        let status: ApiResponse<serde_json::Value> = client
            .get(format!("{}/status", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let graph = &status.data.unwrap()["graph"];
        assert_eq!(graph["node_count"], 3);
        assert!(graph["last_ingest"].is_string());
    }

    #[tokio::test]
    async fn test_ingest_missing_root_fails() {
        let dir = TempDir::new().unwrap();
        let base = serve(&dir).await;

        let response: ApiResponse<serde_json::Value> = reqwest::Client::new()
            .post(format!("{}/ingest", base))
            .json(&serde_json::json!({ "path": "does-not-exist" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(!response.success);
        assert!(response.error.unwrap().contains("not a directory"));
    }
}
