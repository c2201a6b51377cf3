//! Per-interface `wg-quick` config files under the conf dir.
//!
//! Files are handled as raw bytes. Peers survive interface re-creation by
//! textual splice at the first `"\n[Peer]"`, never by parse-and-re-emit, so
//! fields added by operators are kept exactly as written.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub const DEFAULT_CONF_DIR: &str = "/etc/wireguard";

pub const PEER_SENTINEL: &[u8] = b"\n[Peer]";

const CONF_FILE_MODE: u32 = 0o600;

/// Interface names `wg-quick` accepts: 1-15 chars of `[A-Za-z0-9_=+.-]`
pub fn is_valid_iface(iface: &str) -> bool {
    !iface.is_empty()
        && iface.len() <= 15
        && iface
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'=' | b'+' | b'.' | b'-'))
}

pub fn interface_stanza(private_key: &str, address: &str, listen_port: u16) -> String {
    format!(
        "[Interface]\nPrivateKey = {}\nAddress = {}\nListenPort = {}\n",
        private_key, address, listen_port
    )
}

pub fn peer_block(public_key: &str, allowed_ips: &str, endpoint: Option<&str>) -> String {
    let mut block = format!(
        "\n[Peer]\nPublicKey = {}\nAllowedIPs = {}\n",
        public_key, allowed_ips
    );
    if let Some(endpoint) = endpoint {
        block.push_str(&format!("Endpoint = {}\n", endpoint));
    }
    block
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Everything from the first `"\n[Peer]"` to end of file, or nothing
pub fn preserved_peers(existing: &[u8]) -> &[u8] {
    match find(existing, PEER_SENTINEL) {
        Some(idx) => &existing[idx..],
        None => &[],
    }
}

/// Whether `existing` already holds a `PublicKey = <public_key>` line.
///
/// The key must run to end of line, so `pub-1` does not match `pub-10`.
pub fn has_peer(existing: &[u8], public_key: &str) -> bool {
    let needle = format!("PublicKey = {}", public_key);
    let needle = needle.as_bytes();

    let mut from = 0;
    while let Some(pos) = find(&existing[from..], needle) {
        let start = from + pos;
        let end = start + needle.len();
        let at_line_start = start == 0 || existing[start - 1] == b'\n';
        let at_line_end = matches!(existing.get(end), None | Some(b'\n') | Some(b'\r'));
        if at_line_start && at_line_end {
            return true;
        }
        from = start + 1;
    }
    false
}

/// `<conf_dir>/<iface>.conf`
#[derive(Debug, Clone)]
pub struct TunnelConf {
    path: PathBuf,
}

impl TunnelConf {
    pub fn new(conf_dir: &Path, iface: &str) -> Self {
        Self {
            path: conf_dir.join(format!("{}.conf", iface)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file contents; a missing file reads as empty
    pub async fn read(&self) -> Result<Vec<u8>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", self.path)),
        }
    }

    /// Replace the `[Interface]` stanza, keeping any existing peer blocks.
    ///
    /// Returns whether peer blocks were carried over.
    pub async fn write_interface(&self, stanza: &str) -> Result<bool> {
        // An unreadable old file is treated as having no peers
        let existing = self.read().await.unwrap_or_default();
        let peers = preserved_peers(&existing);

        let mut contents = Vec::with_capacity(stanza.len() + peers.len());
        contents.extend_from_slice(stanza.as_bytes());
        contents.extend_from_slice(peers);

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(CONF_FILE_MODE)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {:?}", self.path))?;
        file.write_all(&contents)
            .await
            .with_context(|| format!("Failed to write {:?}", self.path))?;
        file.flush().await?;

        Ok(!peers.is_empty())
    }

    pub async fn contains_peer(&self, public_key: &str) -> bool {
        self.read()
            .await
            .map(|existing| has_peer(&existing, public_key))
            .unwrap_or(false)
    }

    /// Append a peer block, creating the file if needed. Returns bytes written.
    pub async fn append_peer(&self, block: &str) -> Result<usize> {
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .mode(CONF_FILE_MODE)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {:?} for append", self.path))?;
        file.write_all(block.as_bytes())
            .await
            .with_context(|| format!("Failed to append to {:?}", self.path))?;
        file.flush().await?;

        Ok(block.len())
    }
}
