use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use wgmesh_master::api::{self as master_api, workers::AppState};
use wgmesh_master::db::init_db;
use wgmesh_master::services::keys::stub::SequentialKeys;
use wgmesh_master::services::{KeyGenerator, MeshOrchestrator, OverlayIpam};
use wgmesh_master::worker_client::WorkerClient;
use wgmesh_worker::api::{self as worker_api, WorkerState};
use wgmesh_worker::driver::stub::StubRunner;

/// Serve `app` on an ephemeral loopback port
pub async fn serve(app: Router) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to port 0");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server failed");
    });
    (addr, handle)
}

/// A worker agent whose host commands are recorded instead of executed
pub struct TestWorker {
    pub name: String,
    pub api_key: String,
    pub port: u16,
    pub runner: Arc<StubRunner>,
    conf_dir: TempDir,
    server: JoinHandle<()>,
}

impl TestWorker {
    pub async fn start(name: &str, api_key: &str) -> Self {
        let conf_dir = TempDir::new().expect("Failed to create temp dir");
        let runner = Arc::new(StubRunner::new());
        let state = Arc::new(WorkerState::new(
            api_key.to_string(),
            conf_dir.path().to_path_buf(),
            runner.clone(),
        ));
        let (addr, server) = serve(worker_api::create_router(state)).await;

        Self {
            name: name.to_string(),
            api_key: api_key.to_string(),
            port: addr.port(),
            runner,
            conf_dir,
            server,
        }
    }

    pub fn conf_path(&self) -> PathBuf {
        self.conf_dir.path().join("wg0.conf")
    }

    /// Contents of wg0.conf, empty if it does not exist
    pub fn conf(&self) -> String {
        std::fs::read_to_string(self.conf_path()).unwrap_or_default()
    }

    pub fn enroll_body(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "ip": "127.0.0.1",
            "port": self.port,
            "api_key": self.api_key,
        })
    }
}

impl Drop for TestWorker {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// A master plus the workers enrolled into it
pub struct TestMesh {
    pub master_port: u16,
    pub state: Arc<AppState>,
    pub workers: Vec<TestWorker>,
    master: JoinHandle<()>,
    keys: Arc<SequentialKeys>,
    _temp_dir: TempDir,
    db_path: PathBuf,
}

impl TestMesh {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("master-sw").join("master.db");
        let keys = Arc::new(SequentialKeys::new());
        let (master_port, state, master) = start_master(&db_path, keys.clone()).await;

        Self {
            master_port,
            state,
            workers: Vec::new(),
            master,
            keys,
            _temp_dir: temp_dir,
            db_path,
        }
    }

    pub fn master_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.master_port)
    }

    /// Start a worker and enroll it; returns the enrollment response
    pub async fn add_worker(&mut self, name: &str) -> EnrollWorkerResponse {
        let worker = TestWorker::start(name, &format!("key-{}", name)).await;
        let resp = self.enroll(&worker.enroll_body()).await;
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        let created = resp.json::<EnrollWorkerResponse>().await.unwrap();
        self.workers.push(worker);
        created
    }

    pub async fn enroll(&self, body: &serde_json::Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/api/workers", self.master_url()))
            .json(body)
            .send()
            .await
            .expect("Failed to enroll")
    }

    pub async fn list_workers(&self) -> Vec<Worker> {
        reqwest::get(format!("{}/api/workers", self.master_url()))
            .await
            .expect("Failed to list workers")
            .json::<Vec<Worker>>()
            .await
            .expect("Failed to parse response")
    }

    /// Wait until every fan-out started so far has finished
    pub async fn wait_for_fanouts(&self) {
        let tracker = &self.state.fanouts;
        tracker.close();
        tokio::time::timeout(Duration::from_secs(30), tracker.wait())
            .await
            .expect("Timed out waiting for mesh fan-out");
        tracker.reopen();
    }

    pub fn worker(&self, name: &str) -> &TestWorker {
        self.workers
            .iter()
            .find(|w| w.name == name)
            .unwrap_or_else(|| panic!("no worker named {}", name))
    }

    /// Restart the master on the same database (new port)
    pub async fn restart_master(&mut self) {
        self.wait_for_fanouts().await;
        self.master.abort();

        let (port, state, master) = start_master(&self.db_path, self.keys.clone()).await;
        self.master_port = port;
        self.state = state;
        self.master = master;
    }
}

impl Drop for TestMesh {
    fn drop(&mut self) {
        self.master.abort();
    }
}

async fn start_master(
    db_path: &std::path::Path,
    keys: Arc<SequentialKeys>,
) -> (u16, Arc<AppState>, JoinHandle<()>) {
    let db = init_db(db_path).expect("Failed to open registry");
    let client = WorkerClient::new().unwrap();
    let orchestrator =
        MeshOrchestrator::new(db.clone(), client.clone()).with_settle_delay(Duration::ZERO);
    let keys: Arc<dyn KeyGenerator> = keys;
    let state = Arc::new(AppState::new(
        db,
        OverlayIpam::default(),
        keys,
        client,
        orchestrator,
    ));

    let web_root = db_path.parent().unwrap().join("web");
    let (addr, handle) = serve(master_api::create_router(state.clone(), &web_root)).await;
    (addr.port(), state, handle)
}

/// Whether `conf` holds a peer block for `worker`
pub fn has_peer_block(conf: &str, worker: &Worker) -> bool {
    conf.contains(&format!(
        "\n[Peer]\nPublicKey = {}\nAllowedIPs = {}\n",
        worker.public_key, worker.cidr
    ))
}

/// Response types for deserialization
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Worker {
    pub id: i64,
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub api_key: String,
    pub private_key: String,
    pub public_key: String,
    pub cidr: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct EnrollWorkerResponse {
    pub id: i64,
    pub cidr: String,
}
