//! Tunnel configuration rendering
//!
//! Produces the client-side config document and its QR code. Fields are
//! substituted verbatim; keys and addresses are trusted to already be well
//! formed.

use image::Luma;
use qrcode::QrCode;

use crate::vpn::db::{PeerRecord, ServerRecord};
use wgadmin_common::{Error, Result};

/// Render the peer-side tunnel configuration for the active server.
pub fn render_config(peer: &PeerRecord, server: &ServerRecord) -> String {
    format!(
        r#"[Interface]
PrivateKey = {private_key}
Address = {address}/24
DNS = 8.8.8.8

[Peer]
PublicKey = {server_pubkey}
Endpoint = {endpoint}:{port}
AllowedIPs = 0.0.0.0/0
PersistentKeepalive = 25"#,
        private_key = peer.private_key,
        address = peer.ip_address,
        server_pubkey = server.public_key,
        endpoint = server.endpoint,
        port = server.port,
    )
}

/// Encode the configuration text as a PNG QR image.
pub fn config_qr_png(config: &str) -> Result<Vec<u8>> {
    let code = QrCode::new(config.as_bytes())
        .map_err(|e| Error::Internal(format!("QR encoding failed: {}", e)))?;
    let img = code.render::<Luma<u8>>().min_dimensions(256, 256).build();

    let mut png = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| Error::Internal(format!("PNG encoding failed: {}", e)))?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_peer() -> PeerRecord {
        PeerRecord {
            id: 1,
            name: "laptop".to_string(),
            public_key: "peer-public-key".to_string(),
            private_key: "peer-private-key".to_string(),
            ip_address: "10.0.0.2".to_string(),
            is_active: true,
            created_at: 0,
            last_connected: None,
            bytes_received: 0,
            bytes_sent: 0,
        }
    }

    fn sample_server() -> ServerRecord {
        ServerRecord {
            id: 1,
            name: "default-server".to_string(),
            public_key: "server-public-key".to_string(),
            private_key: "server-private-key".to_string(),
            endpoint: "vpn.example.com".to_string(),
            port: 51820,
            is_active: true,
            created_at: 0,
        }
    }

    fn field<'a>(config: &'a str, key: &str) -> &'a str {
        config
            .lines()
            .find_map(|line| line.strip_prefix(key))
            .and_then(|rest| rest.strip_prefix(" = "))
            .unwrap_or_else(|| panic!("missing field {}", key))
    }

    #[test]
    fn test_render_config_round_trip() {
        let peer = sample_peer();
        let server = sample_server();
        let config = render_config(&peer, &server);

        assert_eq!(field(&config, "PrivateKey"), "peer-private-key");
        assert_eq!(field(&config, "Address"), "10.0.0.2/24");
        assert_eq!(field(&config, "DNS"), "8.8.8.8");
        assert_eq!(field(&config, "PublicKey"), "server-public-key");
        assert_eq!(field(&config, "Endpoint"), "vpn.example.com:51820");
        assert_eq!(field(&config, "AllowedIPs"), "0.0.0.0/0");
        assert_eq!(field(&config, "PersistentKeepalive"), "25");
    }

    #[test]
    fn test_config_qr_png_magic() {
        let config = render_config(&sample_peer(), &sample_server());
        let png = config_qr_png(&config).unwrap();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']));
    }
}
