//! WgAdmin Web API
//!
//! HTTP management backend for WireGuard VPN peers: authentication, peer
//! CRUD, tunnel-config rendering, and status reporting.

pub mod auth;
pub mod server;
pub mod sysstat;
pub mod vpn;

pub use server::{bootstrap, build_router, serve, WebServerConfig};
pub use vpn::routes::ApiContext;
pub use vpn::{VpnDb, WgControl};
