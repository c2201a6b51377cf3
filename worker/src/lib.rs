//! Worker agent for the wgmesh overlay.
//!
//! Exposes a small authenticated HTTP API that the master uses to create the
//! local WireGuard interface and add peers to it.

#[cfg(not(unix))]
compile_error!("wgmesh-worker requires a Unix host (wg-quick, systemd).");

pub mod api;
pub mod driver;
pub mod error;
pub mod locks;
pub mod supervisor;
pub mod tunnel_conf;
pub mod types;
