use anyhow::{Context, Result};
use clap::Parser;
use ipnet::Ipv4Net;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use wgmesh_master::api::{self, workers::AppState, DEFAULT_WEB_ROOT};
use wgmesh_master::db::{self, DEFAULT_DB_PATH};
use wgmesh_master::services::{ipam::DEFAULT_OVERLAY_POOL, MeshOrchestrator, OverlayIpam, WgKeyGenerator};
use wgmesh_master::worker_client::WorkerClient;

#[derive(Parser, Debug)]
#[command(name = "wgmesh-master")]
#[command(about = "WireGuard full-mesh control plane", long_about = None)]
struct Args {
    /// Bind address for HTTP server
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Worker registry database file
    #[arg(long, default_value = DEFAULT_DB_PATH)]
    db_path: PathBuf,

    /// Directory holding index.html and static/ for the web UI
    #[arg(long, default_value = DEFAULT_WEB_ROOT)]
    web_root: PathBuf,

    /// Overlay address pool
    #[arg(long, default_value = DEFAULT_OVERLAY_POOL)]
    pool: Ipv4Net,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting wgmesh master");

    let db = db::init_db(&args.db_path)?;

    let ipam = OverlayIpam::new(args.pool);
    info!("Overlay pool: {}", ipam.pool());

    let client = WorkerClient::new()?;
    let orchestrator = MeshOrchestrator::new(db.clone(), client.clone());

    let state = Arc::new(AppState::new(
        db,
        ipam,
        Arc::new(WgKeyGenerator::new()),
        client,
        orchestrator,
    ));

    info!("Web UI served from {:?}", args.web_root);
    let app = api::create_router(state.clone(), &args.web_root);

    let addr: SocketAddr = args.bind.parse().context("Invalid bind address")?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let in-flight mesh fan-outs finish
    state.fanouts.close();
    if !state.fanouts.is_empty() {
        info!("Waiting for {} mesh fan-out(s) to finish", state.fanouts.len());
    }
    state.fanouts.wait().await;

    info!("Master stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
