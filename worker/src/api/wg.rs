use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{ApiKey, WorkerState};
use crate::error::WorkerError;
use crate::tunnel_conf::{self, TunnelConf};
use crate::types::{InterfaceRequest, PeerRequest};

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, WorkerError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("Invalid json: {}", e);
        WorkerError::BadRequest("invalid json")
    })
}

fn check_iface(iface: &str) -> Result<(), WorkerError> {
    if tunnel_conf::is_valid_iface(iface) {
        Ok(())
    } else {
        warn!("Rejecting invalid interface name {:?}", iface);
        Err(WorkerError::BadRequest("invalid iface"))
    }
}

/// POST /api/wg/interface - Write the `[Interface]` stanza and bring the interface up
pub async fn create_interface(
    State(state): State<Arc<WorkerState>>,
    _auth: ApiKey,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WorkerError> {
    let req: InterfaceRequest = parse_body(&body)?;

    if req.iface.is_empty() || req.private_key.is_empty() || req.address.is_empty() {
        warn!(
            "Missing fields in interface create: iface={}, address={}, listen_port={}",
            req.iface, req.address, req.listen_port
        );
        return Err(WorkerError::BadRequest("missing fields"));
    }
    check_iface(&req.iface)?;

    let _guard = state.locks.lock(&req.iface).await;

    let conf = TunnelConf::new(&state.conf_dir, &req.iface);
    let stanza = tunnel_conf::interface_stanza(&req.private_key, &req.address, req.listen_port);
    let preserved = conf.write_interface(&stanza).await.map_err(|e| {
        error!("Write conf failed: {:#}", e);
        WorkerError::Config("write conf failed")
    })?;

    info!(
        "Wrote interface conf to {:?} (address={}, preserved_peers={})",
        conf.path(),
        req.address,
        preserved
    );

    state.supervisor.bring_up(&state.driver, &req.iface).await;

    Ok((StatusCode::CREATED, "interface created\n"))
}

/// POST /api/wg/peer - Add a peer to the live interface and persist it
pub async fn add_peer(
    State(state): State<Arc<WorkerState>>,
    _auth: ApiKey,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WorkerError> {
    let req: PeerRequest = parse_body(&body)?;

    if req.iface.is_empty() || req.public_key.is_empty() || req.allowed_ips.is_empty() {
        warn!(
            "Missing fields in peer add: iface={}, public_key={}, allowed_ips={}",
            req.iface, req.public_key, req.allowed_ips
        );
        return Err(WorkerError::BadRequest("missing fields"));
    }
    check_iface(&req.iface)?;

    let _guard = state.locks.lock(&req.iface).await;

    let output = state
        .driver
        .set_peer(&req.iface, &req.public_key, &req.allowed_ips, req.endpoint())
        .await;
    if !output.success {
        error!("wg set failed: {}", output.combined().trim_end());
        return Err(WorkerError::Driver("wg set failed".to_string()));
    }
    info!(
        "Peer {} set on {} (allowed_ips={})",
        req.public_key, req.iface, req.allowed_ips
    );

    let conf = TunnelConf::new(&state.conf_dir, &req.iface);
    if conf.contains_peer(&req.public_key).await {
        info!(
            "Peer {} already present in {:?}, skipping append",
            req.public_key,
            conf.path()
        );
        return Ok((StatusCode::CREATED, "peer added (already present)\n"));
    }

    let block = tunnel_conf::peer_block(&req.public_key, &req.allowed_ips, req.endpoint());
    match conf.append_peer(&block).await {
        Ok(written) => info!("Appended peer to {:?} ({} bytes)", conf.path(), written),
        Err(e) => {
            // The peer is live; only persistence is missing
            warn!("Conf append failed: {:#}", e);
            return Ok((StatusCode::CREATED, "peer added (but conf append failed)\n"));
        }
    }

    state.supervisor.reload(&state.driver, &req.iface).await;

    Ok((StatusCode::CREATED, "peer added\n"))
}

/// GET /api/wg/status - `wg show` output, verbatim
pub async fn status(State(state): State<Arc<WorkerState>>) -> Result<Response, WorkerError> {
    let output = state.driver.show().await;

    if !output.success {
        error!("wg show failed: {}", output.combined().trim_end());
        return Err(WorkerError::Driver(output.combined()));
    }

    info!("wg show output len={}", output.stdout.len());
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        output.stdout,
    )
        .into_response())
}
