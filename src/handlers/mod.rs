//! HTTP request handlers

pub mod audit;
pub mod auth;
pub mod employee_auth;
pub mod employees;
pub mod middleware;
pub mod templates;
pub mod uploads;

pub use audit::*;
pub use auth::*;
pub use employee_auth::*;
pub use employees::*;
pub use templates::*;
pub use uploads::*;

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap, StatusCode},
    Json,
};
use sqlx::PgPool;

use crate::engine::{Engine, EngineError, RequestMeta};
use crate::models::ApiResponse;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub engine: Engine,
    pub max_upload_size: usize,
    pub is_production: bool,
    /// Trusted proxy IP prefixes for X-Forwarded-For validation
    pub trusted_proxies: Vec<String>,
    pub session_expiry_hours: i64,
    pub employee_session_hours: i64,
    pub admin_registration: bool,
}

/// Map an engine failure onto the API envelope.
pub fn error_response<T>(err: EngineError) -> (StatusCode, Json<ApiResponse<T>>) {
    match err {
        EngineError::NotFound(_) => (StatusCode::NOT_FOUND, Json(ApiResponse::error(err.to_string()))),
        EngineError::DuplicateFieldName(_) | EngineError::DuplicateUsername(_) => {
            (StatusCode::CONFLICT, Json(ApiResponse::error(err.to_string())))
        }
        EngineError::ValidationFailed(details) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error_with_details("Validation failed", details)),
        ),
        EngineError::InvalidCredentials => (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Invalid username or password")),
        ),
        EngineError::Credential(_) | EngineError::File(_) | EngineError::Storage(_) => {
            tracing::error!("Request failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Internal server error")),
            )
        }
    }
}

/// Client address, honouring X-Forwarded-For / X-Real-IP only when the
/// direct peer is a trusted proxy.
pub fn get_client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted_proxies: &[String],
) -> String {
    let peer_ip = peer.map(|addr| addr.ip().to_string());

    let from_trusted_proxy = peer_ip
        .as_deref()
        .is_some_and(|ip| trusted_proxies.iter().any(|prefix| ip.starts_with(prefix.as_str())));

    if from_trusted_proxy {
        if let Some(first_ip) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
        {
            return first_ip.to_string();
        }

        if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
            return real_ip.trim().to_string();
        }
    }

    peer_ip.unwrap_or_else(|| "unknown".to_string())
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.chars().take(500).collect::<String>())
}

#[async_trait]
impl FromRequestParts<AppState> for RequestMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(RequestMeta {
            ip_address: Some(get_client_ip(&parts.headers, peer, &state.trusted_proxies)),
            user_agent: user_agent(&parts.headers),
        })
    }
}
