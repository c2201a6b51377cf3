use serde::{Deserialize, Serialize};

// ============================================================================
// Interface / Peer Requests
// ============================================================================

/// Body of `POST /api/wg/interface`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceRequest {
    pub iface: String,
    pub private_key: String,
    pub listen_port: u16,
    /// e.g. `10.100.0.2/32`
    pub address: String,
}

/// Body of `POST /api/wg/peer`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerRequest {
    pub iface: String,
    pub public_key: String,
    pub allowed_ips: String,
    pub endpoint: Option<String>,
}

impl PeerRequest {
    /// The endpoint, with an empty string meaning none
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref().filter(|e| !e.is_empty())
    }
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
