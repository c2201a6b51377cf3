use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per interface name.
///
/// Held across the config-file write and the driver/supervisor calls for
/// that interface, so concurrent fan-outs cannot tear the file or interleave
/// `wg` invocations.
#[derive(Debug, Default)]
pub struct InterfaceLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl InterfaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, iface: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(iface.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
