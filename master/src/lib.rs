//! Control plane for a full-mesh WireGuard overlay.
//!
//! The master keeps the worker registry, hands out overlay addresses and,
//! after each enrollment, pushes interface and peer configuration to the
//! workers over their HTTP API.

pub mod api;
pub mod db;
pub mod error;
pub mod services;
pub mod types;
pub mod worker_client;
