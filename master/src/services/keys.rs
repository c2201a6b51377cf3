use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// A tunnel key pair in the driver's base64 text form
#[derive(Clone, Default, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"(masked)")
            .field("public_key", &self.public_key)
            .finish()
    }
}

#[async_trait]
pub trait KeyGenerator: Send + Sync {
    async fn generate(&self) -> Result<KeyPair>;
}

/// Generates keys with `wg genkey | wg pubkey`
#[derive(Debug, Clone)]
pub struct WgKeyGenerator {
    program: String,
}

impl WgKeyGenerator {
    pub fn new() -> Self {
        Self {
            program: "wg".to_string(),
        }
    }

    async fn genkey(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("genkey")
            .output()
            .await
            .with_context(|| format!("Failed to run {} genkey", self.program))?;

        if !output.status.success() {
            bail!(
                "{} genkey exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn pubkey(&self, private_key: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .arg("pubkey")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to run {} pubkey", self.program))?;

        let mut stdin = child.stdin.take().context("pubkey stdin not captured")?;
        stdin
            .write_all(format!("{}\n", private_key).as_bytes())
            .await
            .context("Failed to write private key to pubkey")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for pubkey")?;

        if !output.status.success() {
            bail!(
                "{} pubkey exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for WgKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyGenerator for WgKeyGenerator {
    async fn generate(&self) -> Result<KeyPair> {
        let private_key = self.genkey().await?;
        let public_key = self.pubkey(&private_key).await?;

        if private_key.is_empty() || public_key.is_empty() {
            bail!("{} produced an empty key", self.program);
        }

        Ok(KeyPair {
            private_key,
            public_key,
        })
    }
}

/// Key generators that do not need the tunnel driver installed
#[cfg(any(test, feature = "dev-stubs"))]
pub mod stub {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Hands out `priv-N`/`pub-N`, unique per call
    #[derive(Debug, Default)]
    pub struct SequentialKeys {
        next: AtomicU64,
    }

    impl SequentialKeys {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl KeyGenerator for SequentialKeys {
        async fn generate(&self) -> Result<KeyPair> {
            let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
            Ok(KeyPair {
                private_key: format!("priv-{}", n),
                public_key: format!("pub-{}", n),
            })
        }
    }

    /// Always fails, as if the driver CLI were missing
    #[derive(Debug, Default)]
    pub struct UnavailableKeys;

    #[async_trait]
    impl KeyGenerator for UnavailableKeys {
        async fn generate(&self) -> Result<KeyPair> {
            bail!("wg: command not found")
        }
    }
}
