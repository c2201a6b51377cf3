use serde::{Deserialize, Serialize};

use crate::error::MasterError;

// ============================================================================
// Worker Types
// ============================================================================

/// Body of `POST /api/workers`.
///
/// `private_key`/`public_key` are only used when the master cannot generate a
/// key pair itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollWorkerRequest {
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub api_key: String,
    pub private_key: Option<String>,
    pub public_key: Option<String>,
}

impl EnrollWorkerRequest {
    pub fn validate(&self) -> Result<(), MasterError> {
        if self.name.trim().is_empty()
            || self.ip.trim().is_empty()
            || self.api_key.is_empty()
            || self.port == 0
        {
            return Err(MasterError::BadRequest("missing fields"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollWorkerResponse {
    pub id: i64,
    pub cidr: String,
}

/// A worker record before the store has assigned it an id
#[derive(Debug, Clone)]
pub struct WorkerDraft {
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub api_key: String,
    pub private_key: String,
    pub public_key: String,
    pub cidr: String,
}

impl WorkerDraft {
    pub fn into_worker(self, id: i64) -> Worker {
        Worker {
            id,
            name: self.name,
            ip: self.ip,
            port: self.port,
            api_key: self.api_key,
            private_key: self.private_key,
            public_key: self.public_key,
            cidr: self.cidr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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

impl Worker {
    /// Base URL of this worker's HTTP API
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusQuery {
    pub id: Option<String>,
}

// ============================================================================
// Worker API Payloads
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceRequest {
    pub iface: String,
    pub private_key: String,
    pub listen_port: u16,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRequest {
    pub iface: String,
    pub public_key: String,
    pub allowed_ips: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
