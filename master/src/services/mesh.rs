use anyhow::Result;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{execute_async, DbPool};
use crate::services::worker_registry;
use crate::types::{InterfaceRequest, PeerRequest, Worker};
use crate::worker_client::{WorkerClient, WorkerReply};

pub const TUNNEL_IFACE: &str = "wg0";
pub const TUNNEL_LISTEN_PORT: u16 = 51820;

/// Pause after a fan-out before the task finishes
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Where an enrollment is, as seen from the master. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentPhase {
    Draft,
    Persisted,
    IfaceRequested,
    MeshingInProgress,
    MeshingComplete,
}

impl fmt::Display for EnrollmentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnrollmentPhase::Draft => "draft",
            EnrollmentPhase::Persisted => "persisted",
            EnrollmentPhase::IfaceRequested => "iface-requested",
            EnrollmentPhase::MeshingInProgress => "meshing",
            EnrollmentPhase::MeshingComplete => "complete",
        };
        f.write_str(s)
    }
}

/// Outcome counters for one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshReport {
    pub calls: usize,
    pub failures: usize,
}

impl MeshReport {
    fn record(&mut self, what: &str, target: &Worker, outcome: Result<WorkerReply>) {
        self.calls += 1;
        match outcome {
            Ok(reply) if reply.is_success() => {
                info!(
                    "{} on {} ok: status={} body={}",
                    what,
                    target.name,
                    reply.status,
                    reply.body_text()
                );
            }
            Ok(reply) => {
                self.failures += 1;
                warn!(
                    "{} on {} rejected: status={} body={}",
                    what,
                    target.name,
                    reply.status,
                    reply.body_text()
                );
            }
            Err(e) => {
                self.failures += 1;
                warn!("{} on {} failed: {:#}", what, target.name, e);
            }
        }
    }
}

/// The peer entry other workers need in order to reach `worker`
pub fn peer_entry(worker: &Worker) -> PeerRequest {
    PeerRequest {
        iface: TUNNEL_IFACE.to_string(),
        public_key: worker.public_key.clone(),
        allowed_ips: worker.cidr.clone(),
        endpoint: Some(format!("{}:{}", worker.ip, TUNNEL_LISTEN_PORT)),
    }
}

pub fn interface_for(worker: &Worker) -> InterfaceRequest {
    InterfaceRequest {
        iface: TUNNEL_IFACE.to_string(),
        private_key: worker.private_key.clone(),
        listen_port: TUNNEL_LISTEN_PORT,
        address: worker.cidr.clone(),
    }
}

/// Materializes the full mesh around a freshly enrolled worker.
///
/// Best-effort: every call is attempted, failures are logged and counted,
/// nothing is retried or rolled back.
pub struct MeshOrchestrator {
    db: DbPool,
    client: WorkerClient,
    settle_delay: Duration,
}

impl MeshOrchestrator {
    pub fn new(db: DbPool, client: WorkerClient) -> Self {
        Self {
            db,
            client,
            settle_delay: SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Create the interface on `new`, then exchange peer entries with every
    /// other registered worker.
    ///
    /// Existing workers never get their interface re-created, even though
    /// the worker would keep their peers; only peer entries are pushed to them.
    pub async fn mesh_new_worker(&self, new: Worker) -> MeshReport {
        let request_id = Uuid::new_v4().to_string();
        let mut report = MeshReport::default();

        info!(
            "Setting up mesh for worker id={} name={} ({}) request_id={}",
            new.id, new.name, new.ip, request_id
        );

        self.enter(&new, EnrollmentPhase::IfaceRequested);
        let outcome = self
            .client
            .create_interface(&new, &interface_for(&new), &request_id)
            .await;
        report.record("create interface", &new, outcome);

        let workers = match execute_async(&self.db, worker_registry::list_workers).await {
            Ok(workers) => workers,
            Err(e) => {
                error!("Mesh setup for {} aborted, cannot list workers: {:#}", new.name, e);
                self.enter(&new, EnrollmentPhase::MeshingComplete);
                return report;
            }
        };

        self.enter(&new, EnrollmentPhase::MeshingInProgress);
        let new_peer = peer_entry(&new);

        for existing in workers.iter().filter(|w| w.id != new.id) {
            let outcome = self
                .client
                .add_peer(existing, &new_peer, &request_id)
                .await;
            report.record(&format!("add peer {}", new.name), existing, outcome);

            let outcome = self
                .client
                .add_peer(&new, &peer_entry(existing), &request_id)
                .await;
            report.record(&format!("add peer {}", existing.name), &new, outcome);
        }

        tokio::time::sleep(self.settle_delay).await;
        self.enter(&new, EnrollmentPhase::MeshingComplete);

        info!(
            "Mesh setup for worker id={} finished: {} call(s), {} failure(s)",
            new.id, report.calls, report.failures
        );
        report
    }

    fn enter(&self, worker: &Worker, phase: EnrollmentPhase) {
        info!("Worker id={} enrollment phase: {}", worker.id, phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::types::WorkerDraft;
    use tempfile::TempDir;

    fn worker(id: i64, ip: &str, port: u16) -> Worker {
        Worker {
            id,
            name: format!("w{}", id),
            ip: ip.to_string(),
            port,
            api_key: "k".to_string(),
            private_key: format!("priv-{}", id),
            public_key: format!("pub-{}", id),
            cidr: format!("10.100.0.{}/32", id),
        }
    }

    #[test]
    fn test_peer_entry_uses_tunnel_port() {
        let peer = peer_entry(&worker(2, "5.6.7.8", 8080));

        assert_eq!(peer.iface, "wg0");
        assert_eq!(peer.public_key, "pub-2");
        assert_eq!(peer.allowed_ips, "10.100.0.2/32");
        assert_eq!(peer.endpoint.as_deref(), Some("5.6.7.8:51820"));
    }

    #[test]
    fn test_interface_for() {
        let iface = interface_for(&worker(1, "1.2.3.4", 8080));

        assert_eq!(iface.private_key, "priv-1");
        assert_eq!(iface.listen_port, 51820);
        assert_eq!(iface.address, "10.100.0.1/32");
    }

    #[tokio::test]
    async fn test_unreachable_workers_do_not_abort_fanout() {
        let dir = TempDir::new().unwrap();
        let db = init_db(&dir.path().join("master.db")).unwrap();

        // Port 1 on loopback refuses connections
        for id in 1..=3 {
            let w = worker(id, "127.0.0.1", 1);
            let draft = WorkerDraft {
                name: w.name,
                ip: w.ip,
                port: w.port,
                api_key: w.api_key,
                private_key: w.private_key,
                public_key: w.public_key,
                cidr: w.cidr,
            };
            let conn = db.get().unwrap();
            worker_registry::insert_worker(&conn, &draft).unwrap();
        }

        let client = WorkerClient::with_timeout(Duration::from_millis(500)).unwrap();
        let orchestrator = MeshOrchestrator::new(db, client).with_settle_delay(Duration::ZERO);

        let report = orchestrator
            .mesh_new_worker(worker(3, "127.0.0.1", 1))
            .await;

        // 1 interface + 2 calls per pre-existing worker
        assert_eq!(report.calls, 5);
        assert_eq!(report.failures, 5);
    }

    #[tokio::test]
    async fn test_silent_workers_time_out() {
        let dir = TempDir::new().unwrap();
        let db = init_db(&dir.path().join("master.db")).unwrap();

        // Accepts connections and never writes a byte back
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        for id in 1..=2 {
            let w = worker(id, "127.0.0.1", port);
            let draft = WorkerDraft {
                name: w.name,
                ip: w.ip,
                port: w.port,
                api_key: w.api_key,
                private_key: w.private_key,
                public_key: w.public_key,
                cidr: w.cidr,
            };
            let conn = db.get().unwrap();
            worker_registry::insert_worker(&conn, &draft).unwrap();
        }

        let client = WorkerClient::with_timeout(Duration::from_millis(200)).unwrap();
        let orchestrator = MeshOrchestrator::new(db, client).with_settle_delay(Duration::ZERO);

        let started = std::time::Instant::now();
        let report = orchestrator
            .mesh_new_worker(worker(2, "127.0.0.1", port))
            .await;

        assert_eq!(report.calls, 3);
        assert_eq!(report.failures, 3);
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "fan-out took {:?}",
            started.elapsed()
        );
    }
}
