//! VPN API routes
//!
//! The HTTP surface: login, password change, peer CRUD, tunnel config + QR
//! download, and the status endpoint. All `/api/*` routes except login
//! require a bearer token.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

use crate::auth::{self, TokenService};
use crate::sysstat;
use crate::vpn::db::{PeerRecord, UserRecord, VpnDb};
use crate::vpn::render::{config_qr_png, render_config};
use crate::vpn::wg::{collect_status, WgControl};
use wgadmin_common::Error;

// ============================================================================
// State
// ============================================================================

/// Application context handed to every request handler
pub struct ApiContext {
    pub db: VpnDb,
    pub wg: Arc<dyn WgControl>,
    pub tokens: TokenService,
}

// ============================================================================
// Request types
// ============================================================================

// Fields are optional so that a missing field yields a 400 with an error
// body rather than a deserialization rejection.

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangePasswordRequest {
    current_password: Option<String>,
    new_password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateClientRequest {
    name: Option<String>,
}

// ============================================================================
// Router
// ============================================================================

/// Create the VPN API router, nested under `/api` by the server.
pub fn vpn_router(ctx: Arc<ApiContext>) -> Router {
    Router::new()
        .route("/auth/login", post(login_handler))
        .route("/auth/password", post(change_password_handler))
        .route(
            "/clients",
            get(list_clients_handler).post(create_client_handler),
        )
        .route("/clients/:id", delete(delete_client_handler))
        .route("/clients/:id/config", get(client_config_handler))
        .route("/clients/:id/qr", get(client_qr_handler))
        .route("/status", get(status_handler))
        .with_state(ctx)
}

// ============================================================================
// Auth helpers
// ============================================================================

fn extract_token(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

fn get_current_user(
    ctx: &ApiContext,
    headers: &axum::http::HeaderMap,
) -> Result<UserRecord, StatusCode> {
    let token = extract_token(headers).ok_or(StatusCode::UNAUTHORIZED)?;
    let user_id = ctx.tokens.verify(&token).ok_or(StatusCode::UNAUTHORIZED)?;

    ctx.db
        .get_user(user_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)
}

fn iso_timestamp(secs: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

fn peer_summary(peer: &PeerRecord) -> serde_json::Value {
    serde_json::json!({
        "id": peer.id,
        "name": peer.name,
        "ip_address": peer.ip_address,
        "is_active": peer.is_active,
        "created_at": iso_timestamp(peer.created_at),
        "last_connected": peer.last_connected.map(iso_timestamp),
        "bytes_received": peer.bytes_received,
        "bytes_sent": peer.bytes_sent,
    })
}

// ============================================================================
// Auth handlers
// ============================================================================

async fn login_handler(
    State(ctx): State<Arc<ApiContext>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let (username, password) = match (req.username.as_deref(), req.password.as_deref()) {
        (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => (u, p),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Username and password required"})),
            )
                .into_response();
        }
    };

    let user = match ctx.db.get_user_by_username(username) {
        Ok(u) => u,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": format!("Database error: {}", e)})),
            )
                .into_response();
        }
    };

    // Same generic rejection whether the username is unknown or the password
    // is wrong.
    let user = match user {
        Some(u) if auth::verify_password(password, &u.password_hash) => u,
        _ => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": "Invalid credentials"})),
            )
                .into_response();
        }
    };

    if let Err(e) = ctx.db.touch_last_login(user.id) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("Database error: {}", e)})),
        )
            .into_response();
    }

    let token = match ctx.tokens.issue(user.id) {
        Ok(t) => t,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": format!("Token error: {}", e)})),
            )
                .into_response();
        }
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "access_token": token,
            "user": {
                "id": user.id,
                "username": user.username,
                "email": user.email,
                "is_admin": user.is_admin,
            }
        })),
    )
        .into_response()
}

async fn change_password_handler(
    State(ctx): State<Arc<ApiContext>>,
    headers: axum::http::HeaderMap,
    Json(req): Json<ChangePasswordRequest>,
) -> impl IntoResponse {
    let user = match get_current_user(&ctx, &headers) {
        Ok(u) => u,
        Err(status) => {
            return (status, Json(serde_json::json!({"error": "Unauthorized"}))).into_response();
        }
    };

    let (current, new) = match (req.current_password.as_deref(), req.new_password.as_deref()) {
        (Some(c), Some(n)) if !c.is_empty() && !n.is_empty() => (c, n),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Current and new password required"})),
            )
                .into_response();
        }
    };

    if !auth::verify_password(current, &user.password_hash) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Invalid credentials"})),
        )
            .into_response();
    }

    let hash = match auth::hash_password(new) {
        Ok(h) => h,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response();
        }
    };

    match ctx.db.set_password(user.id, &hash) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"message": "Password updated successfully"})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("Database error: {}", e)})),
        )
            .into_response(),
    }
}

// ============================================================================
// Client handlers
// ============================================================================

async fn list_clients_handler(
    State(ctx): State<Arc<ApiContext>>,
    headers: axum::http::HeaderMap,
) -> impl IntoResponse {
    if let Err(status) = get_current_user(&ctx, &headers) {
        return (status, Json(serde_json::json!({"error": "Unauthorized"}))).into_response();
    }

    match ctx.db.list_peers() {
        Ok(peers) => {
            let summaries: Vec<_> = peers.iter().map(peer_summary).collect();
            (StatusCode::OK, Json(summaries)).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("Database error: {}", e)})),
        )
            .into_response(),
    }
}

async fn create_client_handler(
    State(ctx): State<Arc<ApiContext>>,
    headers: axum::http::HeaderMap,
    Json(req): Json<CreateClientRequest>,
) -> impl IntoResponse {
    if let Err(status) = get_current_user(&ctx, &headers) {
        return (status, Json(serde_json::json!({"error": "Unauthorized"}))).into_response();
    }

    let name = match req.name.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Client name required"})),
            )
                .into_response();
        }
    };

    let keypair = match ctx.wg.generate_keypair().await {
        Ok(kp) => kp,
        Err(e) => {
            error!("Error generating keys: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to generate client keys"})),
            )
                .into_response();
        }
    };

    match ctx
        .db
        .create_peer(&name, &keypair.public_key, &keypair.private_key)
    {
        Ok(peer) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": peer.id,
                "name": peer.name,
                "ip_address": peer.ip_address,
                "public_key": peer.public_key,
            })),
        )
            .into_response(),
        Err(Error::AlreadyExists { .. }) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": "Client name already exists"})),
        )
            .into_response(),
        Err(Error::AddressPoolExhausted(pool)) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": format!("Address pool {} exhausted", pool)})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("Database error: {}", e)})),
        )
            .into_response(),
    }
}

async fn delete_client_handler(
    State(ctx): State<Arc<ApiContext>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    if let Err(status) = get_current_user(&ctx, &headers) {
        return (status, Json(serde_json::json!({"error": "Unauthorized"}))).into_response();
    }

    match ctx.db.delete_peer(id) {
        Ok(true) => (
            StatusCode::OK,
            Json(serde_json::json!({"message": "Client deleted successfully"})),
        )
            .into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Client not found"})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("Database error: {}", e)})),
        )
            .into_response(),
    }
}

// ============================================================================
// Config handlers
// ============================================================================

/// Look up the peer and the active server for config rendering.
fn peer_and_server(
    ctx: &ApiContext,
    id: i64,
) -> Result<(PeerRecord, crate::vpn::db::ServerRecord), Response> {
    let peer = match ctx.db.get_peer(id) {
        Ok(Some(p)) => p,
        Ok(None) => {
            return Err((
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "Client not found"})),
            )
                .into_response());
        }
        Err(e) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": format!("Database error: {}", e)})),
            )
                .into_response());
        }
    };

    let server = match ctx.db.active_server() {
        Ok(Some(s)) => s,
        Ok(None) => {
            return Err((
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "No active server found"})),
            )
                .into_response());
        }
        Err(e) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": format!("Database error: {}", e)})),
            )
                .into_response());
        }
    };

    Ok((peer, server))
}

async fn client_config_handler(
    State(ctx): State<Arc<ApiContext>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    if let Err(status) = get_current_user(&ctx, &headers) {
        return (status, Json(serde_json::json!({"error": "Unauthorized"}))).into_response();
    }

    let (peer, server) = match peer_and_server(&ctx, id) {
        Ok(found) => found,
        Err(response) => return response,
    };

    let config = render_config(&peer, &server);
    (StatusCode::OK, Json(serde_json::json!({"config": config}))).into_response()
}

async fn client_qr_handler(
    State(ctx): State<Arc<ApiContext>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    if let Err(status) = get_current_user(&ctx, &headers) {
        return (status, Json(serde_json::json!({"error": "Unauthorized"}))).into_response();
    }

    let (peer, server) = match peer_and_server(&ctx, id) {
        Ok(found) => found,
        Err(response) => return response,
    };

    let config = render_config(&peer, &server);
    match config_qr_png(&config) {
        Ok(png) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "image/png")
            .body(axum::body::Body::from(png))
            .unwrap()
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

// ============================================================================
// Status handler
// ============================================================================

async fn status_handler(
    State(ctx): State<Arc<ApiContext>>,
    headers: axum::http::HeaderMap,
) -> impl IntoResponse {
    if let Err(status) = get_current_user(&ctx, &headers) {
        return (status, Json(serde_json::json!({"error": "Unauthorized"}))).into_response();
    }

    let wireguard = collect_status(ctx.wg.as_ref()).await;
    let system = sysstat::sample().await;

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "wireguard": wireguard,
            "system": system,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
        .into_response()
}
