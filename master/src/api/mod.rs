pub mod workers;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::types::HealthResponse;
use workers::AppState;

pub const DEFAULT_WEB_ROOT: &str = "/etc/wireguard/master-sw/web";

pub fn create_router(state: Arc<AppState>, web_root: &Path) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Worker management
        .route(
            "/api/workers",
            post(workers::enroll_worker).get(workers::list_workers),
        )
        .route("/api/workers/status", get(workers::worker_status))
        // Static UI
        .route_service("/", ServeFile::new(web_root.join("index.html")))
        .nest_service("/static", ServeDir::new(web_root.join("static")))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Health check endpoint
async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
        }),
    )
}
