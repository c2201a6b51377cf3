//! Execution of host programs (`wg`, `wg-quick`, `systemctl`).

use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

pub const WG: &str = "wg";
pub const WG_QUICK: &str = "wg-quick";

/// Result of running a host program.
///
/// A program that could not be started at all is reported as a failed run
/// with the spawn error in `stderr`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> CommandOutput;
}

/// Runs programs from `PATH`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> CommandOutput {
        debug!("Executing {} {}", program, args.join(" "));

        match Command::new(program).args(args).output().await {
            Ok(output) => CommandOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(e) => CommandOutput::failed(format!("failed to run {}: {}", program, e)),
        }
    }
}

/// The tunnel driver CLI
#[derive(Clone)]
pub struct WgDriver {
    runner: Arc<dyn CommandRunner>,
}

impl WgDriver {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// `wg set <iface> peer <key> allowed-ips <cidr> [endpoint <host:port>]`
    pub async fn set_peer(
        &self,
        iface: &str,
        public_key: &str,
        allowed_ips: &str,
        endpoint: Option<&str>,
    ) -> CommandOutput {
        let mut args = vec!["set", iface, "peer", public_key, "allowed-ips", allowed_ips];
        if let Some(endpoint) = endpoint {
            args.extend(["endpoint", endpoint]);
        }
        self.runner.run(WG, &args).await
    }

    /// `wg show`
    pub async fn show(&self) -> CommandOutput {
        self.runner.run(WG, &["show"]).await
    }

    /// `wg-quick up <iface>`
    pub async fn up(&self, iface: &str) -> CommandOutput {
        self.runner.run(WG_QUICK, &["up", iface]).await
    }

    /// `wg-quick down <iface>`
    pub async fn down(&self, iface: &str) -> CommandOutput {
        self.runner.run(WG_QUICK, &["down", iface]).await
    }
}

/// Recording stand-in for host programs
#[cfg(any(test, feature = "dev-stubs"))]
pub mod stub {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Invocation {
        pub program: String,
        pub args: Vec<String>,
    }

    impl Invocation {
        pub fn command_line(&self) -> String {
            let mut line = self.program.clone();
            for arg in &self.args {
                line.push(' ');
                line.push_str(arg);
            }
            line
        }
    }

    /// Succeeds with empty output unless told otherwise.
    ///
    /// Scripted by `(program, first argument)`, e.g. `("systemctl", "start")`.
    #[derive(Debug, Default)]
    pub struct StubRunner {
        calls: Mutex<Vec<Invocation>>,
        failing: Mutex<HashSet<(String, String)>>,
        outputs: Mutex<HashMap<(String, String), String>>,
    }

    impl StubRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail(&self, program: &str, subcommand: &str) {
            self.failing
                .lock()
                .unwrap()
                .insert((program.to_string(), subcommand.to_string()));
        }

        pub fn respond(&self, program: &str, subcommand: &str, stdout: &str) {
            self.outputs.lock().unwrap().insert(
                (program.to_string(), subcommand.to_string()),
                stdout.to_string(),
            );
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        /// Command lines run so far, e.g. `"wg set wg0 peer ..."`
        pub fn command_lines(&self) -> Vec<String> {
            self.calls().iter().map(Invocation::command_line).collect()
        }
    }

    #[async_trait]
    impl CommandRunner for StubRunner {
        async fn run(&self, program: &str, args: &[&str]) -> CommandOutput {
            self.calls.lock().unwrap().push(Invocation {
                program: program.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
            });

            let key = (
                program.to_string(),
                args.first().map(|a| a.to_string()).unwrap_or_default(),
            );
            let stdout = self
                .outputs
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .unwrap_or_default();

            if self.failing.lock().unwrap().contains(&key) {
                CommandOutput {
                    success: false,
                    stdout,
                    stderr: format!("{} {}: stub failure\n", key.0, key.1),
                }
            } else {
                CommandOutput::ok(stdout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stub::StubRunner;
    use super::*;

    #[tokio::test]
    async fn test_set_peer_arguments() {
        let runner = Arc::new(StubRunner::new());
        let driver = WgDriver::new(runner.clone());

        driver
            .set_peer("wg0", "pubB", "10.100.0.2/32", Some("5.6.7.8:51820"))
            .await;
        driver.set_peer("wg0", "pubC", "10.100.0.3/32", None).await;

        assert_eq!(
            runner.command_lines(),
            vec![
                "wg set wg0 peer pubB allowed-ips 10.100.0.2/32 endpoint 5.6.7.8:51820",
                "wg set wg0 peer pubC allowed-ips 10.100.0.3/32",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_a_failed_run() {
        let output = SystemRunner
            .run("wgmesh-no-such-program", &["show"])
            .await;

        assert!(!output.success);
        assert!(output.stderr.contains("wgmesh-no-such-program"));
    }

    #[test]
    fn test_combined_output() {
        let output = CommandOutput {
            success: false,
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
        };
        assert_eq!(output.combined(), "out\nerr\n");
    }
}
