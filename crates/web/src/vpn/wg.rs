//! WireGuard control capability
//!
//! Key generation and the status dump are delegated to the `wg` binary when
//! the host has one. Hosts without it get an in-process stub: real x25519
//! keys, no live statistics. The `WgControl` trait is the seam tests
//! substitute doubles for.

use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command as AsyncCommand;
use tracing::{info, warn};

use wgadmin_common::{Error, Result};

/// Timeout for any invocation of the control binary
const WG_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// WireGuard key pair, both halves base64
#[derive(Debug, Clone)]
pub struct WgKeyPair {
    pub private_key: String,
    pub public_key: String,
}

/// One peer entry from the status dump
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerStats {
    pub public_key: String,
    pub endpoint: String,
    pub allowed_ips: String,
    pub latest_handshake: String,
    pub transfer_rx: u64,
    pub transfer_tx: u64,
    pub persistent_keepalive: String,
}

/// Per-interface statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceStats {
    pub peers: Vec<PeerStats>,
}

// ============================================================================
// Control interface
// ============================================================================

/// WireGuard control interface
#[async_trait]
pub trait WgControl: Send + Sync {
    /// Generate a private/public key pair
    async fn generate_keypair(&self) -> Result<WgKeyPair>;

    /// Raw output of the status dump command
    async fn dump_status(&self) -> Result<String>;
}

/// Select a control implementation based on what the host provides
pub fn detect() -> Arc<dyn WgControl> {
    if WgCli::available() {
        info!("Using wg binary for key generation and status");
        Arc::new(WgCli)
    } else {
        warn!("wg binary not found, using in-process stub");
        Arc::new(WgStub)
    }
}

// ============================================================================
// CLI implementation
// ============================================================================

/// Control implementation that shells out to `wg`
pub struct WgCli;

impl WgCli {
    /// Check whether the `wg` binary can be invoked
    pub fn available() -> bool {
        Command::new("wg").arg("--version").output().is_ok()
    }

    async fn run(args: &[&str], input: Option<&str>) -> Result<String> {
        let mut cmd = AsyncCommand::new("wg");
        cmd.args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        if let Some(data) = input {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| Error::Internal("wg stdin unavailable".to_string()))?;
            stdin.write_all(data.as_bytes()).await?;
            // dropping the handle closes the pipe so wg sees EOF
        }

        let output = tokio::time::timeout(WG_COMMAND_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| Error::Timeout {
                seconds: WG_COMMAND_TIMEOUT.as_secs(),
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Internal(format!(
                "wg {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl WgControl for WgCli {
    async fn generate_keypair(&self) -> Result<WgKeyPair> {
        let private_key = Self::run(&["genkey"], None)
            .await
            .map_err(|e| Error::KeyGeneration(e.to_string()))?;
        let public_key = Self::run(&["pubkey"], Some(&private_key))
            .await
            .map_err(|e| Error::KeyGeneration(e.to_string()))?;
        Ok(WgKeyPair {
            private_key,
            public_key,
        })
    }

    async fn dump_status(&self) -> Result<String> {
        Self::run(&["show", "all", "dump"], None).await
    }
}

// ============================================================================
// Stub implementation
// ============================================================================

/// Control stub for hosts without the wg binary
pub struct WgStub;

#[async_trait]
impl WgControl for WgStub {
    async fn generate_keypair(&self) -> Result<WgKeyPair> {
        Ok(generate_keypair_x25519())
    }

    async fn dump_status(&self) -> Result<String> {
        Err(Error::Internal(
            "status dump not available without the wg binary".to_string(),
        ))
    }
}

/// Generate a WireGuard key pair via x25519 base point multiplication
pub fn generate_keypair_x25519() -> WgKeyPair {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use rand::RngCore;
    use x25519_dalek::{PublicKey, StaticSecret};

    let mut private_key_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut private_key_bytes);

    // WireGuard key clamping
    private_key_bytes[0] &= 248;
    private_key_bytes[31] &= 127;
    private_key_bytes[31] |= 64;

    let secret = StaticSecret::from(private_key_bytes);
    let public = PublicKey::from(&secret);

    WgKeyPair {
        private_key: STANDARD.encode(private_key_bytes),
        public_key: STANDARD.encode(public.as_bytes()),
    }
}

// ============================================================================
// Status dump parsing
// ============================================================================

/// Parse the tab-separated output of `wg show all dump`.
///
/// A line with at least 5 fields starts or continues an interface record; a
/// line with at least 8 fields is one peer entry. Byte counters default to
/// zero when the field is empty.
pub fn parse_status_dump(output: &str) -> HashMap<String, InterfaceStats> {
    let mut interfaces: HashMap<String, InterfaceStats> = HashMap::new();

    for line in output.lines() {
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 5 {
            continue;
        }

        let entry = interfaces.entry(parts[0].to_string()).or_default();
        if parts.len() >= 8 {
            entry.peers.push(PeerStats {
                public_key: parts[1].to_string(),
                endpoint: parts[2].to_string(),
                allowed_ips: parts[3].to_string(),
                latest_handshake: parts[4].to_string(),
                transfer_rx: parts[5].parse().unwrap_or(0),
                transfer_tx: parts[6].parse().unwrap_or(0),
                persistent_keepalive: parts[7].to_string(),
            });
        }
    }

    interfaces
}

/// Fixed stand-in served when live statistics are unavailable. The values
/// are recognizably synthetic.
pub fn placeholder_status() -> HashMap<String, InterfaceStats> {
    let mut interfaces = HashMap::new();
    interfaces.insert(
        "wg0".to_string(),
        InterfaceStats {
            peers: vec![PeerStats {
                public_key:
                    "mOCK_PUBLIC_KEY_FOR_DEFAULT_CLIENT_1234567890123456789012345678901234567890"
                        .to_string(),
                endpoint: "192.168.1.100:51820".to_string(),
                allowed_ips: "10.0.0.2/32".to_string(),
                latest_handshake: "1640995200".to_string(),
                transfer_rx: 1_024_000,
                transfer_tx: 512_000,
                persistent_keepalive: "25".to_string(),
            }],
        },
    );
    interfaces
}

/// Live statistics, or the placeholder when the control binary is missing
/// or fails. The status endpoint never fails on account of the binary.
pub async fn collect_status(ctl: &dyn WgControl) -> HashMap<String, InterfaceStats> {
    match ctl.dump_status().await {
        Ok(output) => parse_status_dump(&output),
        Err(e) => {
            warn!("Status dump unavailable, serving placeholder data: {}", e);
            placeholder_status()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};

    #[test]
    fn test_keypair_generation() {
        let kp = generate_keypair_x25519();
        assert_eq!(kp.private_key.len(), 44); // base64 of 32 bytes
        assert_eq!(kp.public_key.len(), 44);
        assert_ne!(kp.private_key, kp.public_key);

        // Private key is clamped per the WireGuard curve requirements
        let bytes = STANDARD.decode(&kp.private_key).unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[0] & 7, 0);
        assert_eq!(bytes[31] & 128, 0);
        assert_eq!(bytes[31] & 64, 64);
    }

    #[test]
    fn test_parse_status_dump() {
        let dump = "wg0\tPRIVKEY\tPUBKEY\t51820\toff\n\
                    wg0\tpeer-key-1\t203.0.113.5:51820\t10.0.0.2/32\t1700000000\t1024\t2048\t25\toff\n\
                    wg0\tpeer-key-2\t(none)\t10.0.0.3/32\t0\t\t\toff\toff";

        let interfaces = parse_status_dump(dump);
        assert_eq!(interfaces.len(), 1);

        let wg0 = &interfaces["wg0"];
        assert_eq!(wg0.peers.len(), 2);

        let first = &wg0.peers[0];
        assert_eq!(first.public_key, "peer-key-1");
        assert_eq!(first.endpoint, "203.0.113.5:51820");
        assert_eq!(first.allowed_ips, "10.0.0.2/32");
        assert_eq!(first.latest_handshake, "1700000000");
        assert_eq!(first.transfer_rx, 1024);
        assert_eq!(first.transfer_tx, 2048);
        assert_eq!(first.persistent_keepalive, "25");

        // Empty byte counters default to zero
        let second = &wg0.peers[1];
        assert_eq!(second.transfer_rx, 0);
        assert_eq!(second.transfer_tx, 0);
    }

    #[test]
    fn test_parse_status_dump_skips_short_lines() {
        let dump = "garbage\nwg0\ta\tb\n\nwg1\tPRIV\tPUB\t51820\toff";
        let interfaces = parse_status_dump(dump);
        assert_eq!(interfaces.len(), 1);
        assert!(interfaces.contains_key("wg1"));
        assert!(interfaces["wg1"].peers.is_empty());
    }

    #[test]
    fn test_parse_status_dump_multiple_interfaces() {
        let dump = "wg0\tPRIV\tPUB\t51820\toff\n\
                    wg0\tk1\tep\tips\thq\t1\t2\t25\toff\n\
                    wg1\tPRIV\tPUB\t51821\toff";
        let interfaces = parse_status_dump(dump);
        assert_eq!(interfaces.len(), 2);
        assert_eq!(interfaces["wg0"].peers.len(), 1);
        assert!(interfaces["wg1"].peers.is_empty());
    }

    struct FailingControl;

    #[async_trait]
    impl WgControl for FailingControl {
        async fn generate_keypair(&self) -> Result<WgKeyPair> {
            Err(Error::KeyGeneration("simulated failure".to_string()))
        }

        async fn dump_status(&self) -> Result<String> {
            Err(Error::Internal("simulated missing binary".to_string()))
        }
    }

    #[tokio::test]
    async fn test_collect_status_falls_back_to_placeholder() {
        let status = collect_status(&FailingControl).await;
        assert_eq!(status.len(), 1);

        let wg0 = &status["wg0"];
        assert_eq!(wg0.peers.len(), 1);
        assert!(wg0.peers[0].public_key.starts_with("mOCK_"));
        assert_eq!(wg0.peers[0].transfer_rx, 1_024_000);
    }

    #[tokio::test]
    async fn test_stub_keypair() {
        let kp = WgStub.generate_keypair().await.unwrap();
        assert_eq!(kp.private_key.len(), 44);
        assert!(WgStub.dump_status().await.is_err());
    }
}
