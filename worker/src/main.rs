use anyhow::{bail, Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use wgmesh_worker::api::{self, WorkerState};
use wgmesh_worker::driver::SystemRunner;
use wgmesh_worker::tunnel_conf::DEFAULT_CONF_DIR;

#[derive(Parser, Debug)]
#[command(name = "wgmesh-worker")]
#[command(about = "wgmesh worker agent", long_about = None)]
struct Args {
    /// Bind address for HTTP server
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Shared secret expected in X-API-Key
    #[arg(long, env = "WORKER_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Directory holding <iface>.conf files
    #[arg(long, default_value = DEFAULT_CONF_DIR)]
    conf_dir: PathBuf,

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

    if args.api_key.is_empty() {
        bail!("WORKER_API_KEY not set");
    }

    info!("Starting wgmesh worker");
    info!(
        "Agent configuration: conf_dir={:?}, api_key_present={}",
        args.conf_dir,
        !args.api_key.is_empty()
    );

    create_conf_dir(&args.conf_dir)?;

    let state = Arc::new(WorkerState::new(
        args.api_key,
        args.conf_dir,
        Arc::new(SystemRunner),
    ));
    let app = api::create_router(state);

    let addr: SocketAddr = args.bind.parse().context("Invalid bind address")?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Worker stopped");
    Ok(())
}

fn create_conf_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .with_context(|| format!("Failed to create conf dir {:?}", dir))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

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

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
