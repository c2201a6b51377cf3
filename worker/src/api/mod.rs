pub mod wg;

use axum::{
    async_trait,
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, Request, StatusCode},
    routing::{get, post},
    Json, Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{warn, Span};

use crate::driver::{CommandRunner, WgDriver};
use crate::error::WorkerError;
use crate::locks::InterfaceLocks;
use crate::supervisor::Supervisor;
use crate::types::HealthResponse;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Set by the master on every call of one enrollment fan-out
pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub struct WorkerState {
    api_key: String,
    pub conf_dir: PathBuf,
    pub driver: WgDriver,
    pub supervisor: Supervisor,
    pub locks: InterfaceLocks,
}

impl WorkerState {
    pub fn new(api_key: String, conf_dir: PathBuf, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            api_key,
            conf_dir,
            driver: WgDriver::new(runner.clone()),
            supervisor: Supervisor::new(runner),
            locks: InterfaceLocks::new(),
        }
    }

    /// Keys compare case-insensitively (Unicode lowercase on both sides);
    /// an empty key never matches.
    pub fn authorize(&self, presented: &str) -> bool {
        !presented.is_empty() && presented.to_lowercase() == self.api_key.to_lowercase()
    }
}

/// Extractor that rejects requests without a matching `X-API-Key`
pub struct ApiKey;

#[async_trait]
impl FromRequestParts<Arc<WorkerState>> for ApiKey {
    type Rejection = WorkerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<WorkerState>,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if state.authorize(presented) {
            Ok(ApiKey)
        } else {
            warn!(
                "Auth failed for {} (X-API-Key present={})",
                parts.uri.path(),
                !presented.is_empty()
            );
            Err(WorkerError::Unauthorized)
        }
    }
}

pub fn create_router(state: Arc<WorkerState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Tunnel management
        .route("/api/wg/interface", post(wg::create_interface))
        .route("/api/wg/peer", post(wg::add_peer))
        .route("/api/wg/status", get(wg::status))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(state)
}

/// Request span carrying the master's request id, `-` when absent
fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
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
