use std::net::SocketAddr;

use tracing::info;

use wgadmin_common::Database;
use wgadmin_web::server::WebServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let addr: SocketAddr = std::env::var("WGADMIN_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;

    let db = match std::env::var("WGADMIN_DB_PATH") {
        Ok(path) if !path.trim().is_empty() => Database::open(path.trim())?,
        _ => {
            let path = wgadmin_common::default_db_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Database::open(path)?
        }
    };

    let cfg = WebServerConfig {
        jwt_secret: std::env::var("JWT_SECRET")
            .unwrap_or_else(|_| "your-secret-key-change-this".to_string()),
        admin_password: std::env::var("WGADMIN_ADMIN_PASSWORD")
            .unwrap_or_else(|_| "admin123".to_string()),
        server_endpoint: std::env::var("WG_SERVER_ENDPOINT")
            .unwrap_or_else(|_| "localhost".to_string()),
        server_port: std::env::var("WG_SERVER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(51820),
        cors_origins: std::env::var("WGADMIN_CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:4200,http://127.0.0.1:4200".to_string())
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect(),
    };

    info!("Starting WgAdmin API on http://{}", addr);

    wgadmin_web::server::serve(addr, db, cfg).await
}
