use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::http::StatusCode;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::types::{InterfaceRequest, PeerRequest, Worker};

/// Timeout for every master -> worker request
pub const WORKER_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Status and body of a completed worker call, whatever the status was
#[derive(Debug, Clone)]
pub struct WorkerReply {
    pub status: StatusCode,
    pub body: Bytes,
}

impl WorkerReply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).trim_end().to_string()
    }
}

/// HTTP client for the worker API, authenticating with each worker's `X-API-Key`
#[derive(Clone)]
pub struct WorkerClient {
    client: Client,
}

impl WorkerClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(WORKER_CALL_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// POST /api/wg/interface on `worker`
    pub async fn create_interface(
        &self,
        worker: &Worker,
        req: &InterfaceRequest,
        request_id: &str,
    ) -> Result<WorkerReply> {
        self.post_json(worker, "/api/wg/interface", req, request_id)
            .await
    }

    /// POST /api/wg/peer on `worker`
    pub async fn add_peer(
        &self,
        worker: &Worker,
        req: &PeerRequest,
        request_id: &str,
    ) -> Result<WorkerReply> {
        self.post_json(worker, "/api/wg/peer", req, request_id).await
    }

    /// GET /api/wg/status on `worker`
    pub async fn status(&self, worker: &Worker) -> Result<WorkerReply> {
        let url = format!("{}/api/wg/status", worker.base_url());
        debug!("Fetching worker status from {}", url);

        let resp = self
            .client
            .get(&url)
            .header("x-api-key", &worker.api_key)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        Self::into_reply(resp).await
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        worker: &Worker,
        path: &str,
        body: &T,
        request_id: &str,
    ) -> Result<WorkerReply> {
        let url = format!("{}{}", worker.base_url(), path);
        debug!("POST {} (request_id={})", url, request_id);

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &worker.api_key)
            .header("x-request-id", request_id)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        Self::into_reply(resp).await
    }

    async fn into_reply(resp: reqwest::Response) -> Result<WorkerReply> {
        let status =
            StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let body = resp
            .bytes()
            .await
            .context("Failed to read worker response body")?;

        Ok(WorkerReply { status, body })
    }
}
