//! Web server assembly and first-boot bootstrap

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{routing::get, Json, Router};
use chrono::Utc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{hash_password, TokenService};
use crate::vpn::db::VpnDb;
use crate::vpn::routes::{vpn_router, ApiContext};
use crate::vpn::wg::{self, WgControl};
use wgadmin_common::Database;

/// Web server configuration
#[derive(Clone, Debug)]
pub struct WebServerConfig {
    /// Secret used to sign bearer tokens
    pub jwt_secret: String,
    /// Password for the bootstrap admin user
    pub admin_password: String,
    /// Public endpoint host for the bootstrap server record
    pub server_endpoint: String,
    /// Listen port for the bootstrap server record
    pub server_port: u16,
    /// Allowed CORS origins for the management frontend
    pub cors_origins: Vec<String>,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "your-secret-key-change-this".to_string(),
            admin_password: "admin123".to_string(),
            server_endpoint: "localhost".to_string(),
            server_port: 51820,
            cors_origins: vec![
                "http://localhost:4200".to_string(),
                "http://127.0.0.1:4200".to_string(),
            ],
        }
    }
}

// ============================================================================
// Health
// ============================================================================

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": wgadmin_common::VERSION,
    }))
}

// ============================================================================
// Bootstrap
// ============================================================================

/// Create the default admin user, server record, and first peer on an empty
/// store. Idempotent: existing rows are left alone.
pub async fn bootstrap(
    db: &VpnDb,
    wg: &dyn WgControl,
    cfg: &WebServerConfig,
) -> wgadmin_common::Result<()> {
    if db.count_users()? == 0 {
        let hash = hash_password(&cfg.admin_password)?;
        db.create_user("admin", "admin@vpn.local", &hash, true)?;
        info!("Created default admin user: admin");
    }

    if db.count_servers()? == 0 {
        let keypair = wg.generate_keypair().await?;
        db.create_server(
            "default-server",
            &keypair.public_key,
            &keypair.private_key,
            &cfg.server_endpoint,
            cfg.server_port,
        )?;
        info!(
            "Created default VPN server record at {}:{}",
            cfg.server_endpoint, cfg.server_port
        );
    }

    if db.count_peers()? == 0 {
        match wg.generate_keypair().await {
            Ok(keypair) => {
                db.create_peer("default-client", &keypair.public_key, &keypair.private_key)?;
                info!("Created default VPN client: default-client");
            }
            Err(e) => warn!("Skipping default client creation: {}", e),
        }
    }

    Ok(())
}

// ============================================================================
// Router assembly
// ============================================================================

fn cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Assemble the full application router.
pub fn build_router(ctx: Arc<ApiContext>, cfg: &WebServerConfig) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", vpn_router(ctx))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&cfg.cors_origins))
}

/// Open the store, select the WireGuard capability, run bootstrap, and serve.
pub async fn serve(addr: SocketAddr, db: Database, cfg: WebServerConfig) -> anyhow::Result<()> {
    let vpn_db = VpnDb::new(db);
    vpn_db.init_schema()?;

    let wg = wg::detect();
    bootstrap(&vpn_db, wg.as_ref(), &cfg).await?;

    let ctx = Arc::new(ApiContext {
        db: vpn_db,
        wg,
        tokens: TokenService::new(&cfg.jwt_secret),
    });

    let app = build_router(ctx, &cfg);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
