//! VPN peer management
//!
//! - Relational registries for users, peers, and the active server
//! - WireGuard control capability (CLI or in-process stub)
//! - Tunnel config and QR rendering
//! - HTTP routes

pub mod db;
pub mod render;
pub mod routes;
pub mod wg;

pub use db::{next_peer_address, PeerRecord, ServerRecord, UserRecord, VpnDb};
pub use render::{config_qr_png, render_config};
pub use routes::{vpn_router, ApiContext};
pub use wg::{collect_status, WgCli, WgControl, WgStub};
