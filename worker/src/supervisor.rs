//! systemd control of `wg-quick@<iface>` units, with `wg-quick` fallbacks.
//!
//! Nothing here fails the caller: every outcome is logged and reported as a
//! boolean.

use std::sync::Arc;
use tracing::{info, warn};

use crate::driver::{CommandOutput, CommandRunner, WgDriver};

pub const SYSTEMCTL: &str = "systemctl";

pub fn unit_name(iface: &str) -> String {
    format!("wg-quick@{}", iface)
}

#[derive(Clone)]
pub struct Supervisor {
    runner: Arc<dyn CommandRunner>,
}

impl Supervisor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn systemctl(&self, action: &str, iface: &str) -> CommandOutput {
        let unit = unit_name(iface);
        let output = self.runner.run(SYSTEMCTL, &[action, unit.as_str()]).await;
        log_outcome(&format!("systemctl {} {}", action, unit), &output);
        output
    }

    pub async fn enable(&self, iface: &str) -> CommandOutput {
        self.systemctl("enable", iface).await
    }

    pub async fn start(&self, iface: &str) -> CommandOutput {
        self.systemctl("start", iface).await
    }

    pub async fn restart(&self, iface: &str) -> CommandOutput {
        self.systemctl("restart", iface).await
    }

    /// Enable and start the unit; run `wg-quick up` if the start fails.
    ///
    /// Returns whether the interface was brought up by either path.
    pub async fn bring_up(&self, driver: &WgDriver, iface: &str) -> bool {
        self.enable(iface).await;

        if self.start(iface).await.success {
            return true;
        }

        warn!("Falling back to wg-quick up {}", iface);
        let output = driver.up(iface).await;
        log_outcome(&format!("wg-quick up {}", iface), &output);
        output.success
    }

    /// Restart the unit so the live interface matches the persisted config;
    /// run `wg-quick down` + `up` if the restart fails.
    pub async fn reload(&self, driver: &WgDriver, iface: &str) -> bool {
        if self.restart(iface).await.success {
            return true;
        }

        warn!("Restart failed, falling back to wg-quick down/up for {}", iface);
        let down = driver.down(iface).await;
        log_outcome(&format!("wg-quick down {}", iface), &down);
        let up = driver.up(iface).await;
        log_outcome(&format!("wg-quick up {}", iface), &up);
        up.success
    }
}

fn log_outcome(what: &str, output: &CommandOutput) {
    if output.success {
        info!("{} ok: {}", what, output.combined().trim_end());
    } else {
        warn!("{} failed: {}", what, output.combined().trim_end());
    }
}
