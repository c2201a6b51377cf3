use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::{
    db::{execute_async, DbPool},
    error::MasterError,
    services::{
        mesh::EnrollmentPhase, worker_registry, KeyGenerator, KeyPair, MeshOrchestrator,
        OverlayIpam,
    },
    types::{EnrollWorkerRequest, EnrollWorkerResponse, StatusQuery, Worker, WorkerDraft},
    worker_client::WorkerClient,
};

pub struct AppState {
    pub db: DbPool,
    pub ipam: OverlayIpam,
    pub keys: Arc<dyn KeyGenerator>,
    pub client: WorkerClient,
    pub orchestrator: Arc<MeshOrchestrator>,
    /// Serializes (allocate, insert) across concurrent enrollments
    pub enroll_lock: Mutex<()>,
    /// In-flight mesh fan-outs
    pub fanouts: TaskTracker,
}

impl AppState {
    pub fn new(
        db: DbPool,
        ipam: OverlayIpam,
        keys: Arc<dyn KeyGenerator>,
        client: WorkerClient,
        orchestrator: MeshOrchestrator,
    ) -> Self {
        Self {
            db,
            ipam,
            keys,
            client,
            orchestrator: Arc::new(orchestrator),
            enroll_lock: Mutex::new(()),
            fanouts: TaskTracker::new(),
        }
    }
}

/// POST /api/workers - Enroll a worker and start meshing it in the background
pub async fn enroll_worker(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<EnrollWorkerResponse>), MasterError> {
    let req: EnrollWorkerRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!("Invalid enrollment body: {}", e);
        MasterError::BadRequest("invalid json")
    })?;
    req.validate()?;

    info!(
        "Enrolling worker: name={}, ip={}:{} (phase: {})",
        req.name,
        req.ip,
        req.port,
        EnrollmentPhase::Draft
    );

    let keys = match state.keys.generate().await {
        Ok(keys) => {
            info!("Generated key pair (public={}, private=masked)", keys.public_key);
            keys
        }
        Err(e) => {
            warn!("Key generation failed, using keys from request: {:#}", e);
            KeyPair {
                private_key: req.private_key.clone().unwrap_or_default(),
                public_key: req.public_key.clone().unwrap_or_default(),
            }
        }
    };

    let worker = {
        let _guard = state.enroll_lock.lock().await;

        let used = execute_async(&state.db, worker_registry::list_cidrs)
            .await
            .map_err(|e| {
                error!("Failed to read allocated addresses: {:#}", e);
                MasterError::Store("address allocation failed")
            })?;

        let cidr = state
            .ipam
            .allocate(used.iter().map(String::as_str))
            .map_err(|e| {
                error!("Address allocation failed: {}", e);
                MasterError::PoolExhausted
            })?;

        let draft = WorkerDraft {
            name: req.name,
            ip: req.ip,
            port: req.port,
            api_key: req.api_key,
            private_key: keys.private_key,
            public_key: keys.public_key,
            cidr,
        };

        let insert = draft.clone();
        let id = execute_async(&state.db, move |conn| {
            worker_registry::insert_worker(conn, &insert)
        })
        .await
        .map_err(|e| {
            error!("Failed to persist worker: {:#}", e);
            MasterError::Store("db insert failed")
        })?;

        draft.into_worker(id)
    };

    info!(
        "Worker created: id={}, name={}, ip={}:{}, cidr={}, public_key={} (phase: {})",
        worker.id,
        worker.name,
        worker.ip,
        worker.port,
        worker.cidr,
        worker.public_key,
        EnrollmentPhase::Persisted
    );

    let response = EnrollWorkerResponse {
        id: worker.id,
        cidr: worker.cidr.clone(),
    };

    let orchestrator = state.orchestrator.clone();
    state.fanouts.spawn(async move {
        orchestrator.mesh_new_worker(worker).await;
    });

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/workers - List all workers.
///
/// The response includes every worker's tunnel private key. Keys are
/// generated centrally and shipped during interface creation, so the master
/// is their custodian; treat this endpoint as sensitive.
pub async fn list_workers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Worker>>, MasterError> {
    let workers = execute_async(&state.db, worker_registry::list_workers)
        .await
        .map_err(|e| {
            error!("Failed to list workers: {:#}", e);
            MasterError::Store("db list failed")
        })?;

    info!("Returning {} workers", workers.len());
    Ok(Json(workers))
}

/// GET /api/workers/status?id=N - Relay a worker's tunnel status
pub async fn worker_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Response, MasterError> {
    let raw_id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or(MasterError::BadRequest("missing id"))?;
    let id: i64 = raw_id
        .parse()
        .map_err(|_| MasterError::BadRequest("invalid id"))?;

    let worker = execute_async(&state.db, move |conn| worker_registry::get_worker(conn, id))
        .await
        .map_err(|e| {
            error!("Failed to look up worker {}: {:#}", id, e);
            MasterError::Store("db query failed")
        })?
        .ok_or_else(|| {
            warn!("Status requested for unknown worker id={}", id);
            MasterError::NotFound
        })?;

    info!("Proxying status request to worker id={} ({})", id, worker.base_url());

    let reply = state.client.status(&worker).await.map_err(|e| {
        warn!("Worker status request failed: {:#}", e);
        MasterError::Upstream(format!("{:#}", e))
    })?;

    info!(
        "Worker status response: status={}, len={}",
        reply.status,
        reply.body.len()
    );

    Ok((
        reply.status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        reply.body,
    )
        .into_response())
}
