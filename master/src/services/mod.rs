pub mod ipam;
pub mod keys;
pub mod mesh;
pub mod worker_registry;

pub use ipam::OverlayIpam;
pub use keys::{KeyGenerator, KeyPair, WgKeyGenerator};
pub use mesh::MeshOrchestrator;
