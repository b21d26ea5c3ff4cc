//! Administrator authentication handlers
//!
//! Administrators own templates and employee records. Their accounts and
//! sessions live in `admin_users` / `admin_sessions`, apart from the
//! employee realm in [`super::employee_auth`].

use crate::engine::credentials::check_credentials;
use crate::engine::{EngineError, RequestMeta};
use crate::models::*;
use crate::validation::{describe_errors, validate_password};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use validator::Validate;

use super::AppState;

/// Session cookie name
pub const SESSION_COOKIE: &str = "hr_admin_session";

/// Rate limit: max attempts per IP per hour
pub const MAX_LOGIN_ATTEMPTS: i64 = 10;

// =============================================================================
// Registration Endpoint
// =============================================================================

/// Open administrator sign-up, enabled by `ADMIN_REGISTRATION`
pub async fn admin_register(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(input): Json<RegisterAdmin>,
) -> impl IntoResponse {
    if !state.admin_registration {
        return (
            StatusCode::FORBIDDEN,
            Json(ApiResponse::<AdminUserResponse>::error(
                "Administrator registration is disabled",
            )),
        );
    }

    let client_ip = meta.ip_address.clone().unwrap_or_default();
    if !check_rate_limit(&state.pool, &client_ip, "admin_register").await {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiResponse::error("Too many attempts. Please try again later.")),
        );
    }
    record_attempt(&state.pool, &client_ip, "admin_register").await;

    let mut problems = input.validate().err().map(|e| describe_errors(&e)).unwrap_or_default();
    if let Err(e) = validate_password(&input.password) {
        problems.push(e.to_string());
    }
    if !problems.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error_with_details("Validation failed", problems)),
        );
    }

    let password_hash = match state.engine.hasher().hash(&input.password) {
        Ok(h) => h,
        Err(e) => {
            tracing::error!("Failed to hash administrator password: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Registration failed")),
            );
        }
    };

    let result = sqlx::query_as::<_, AdminUser>(
        r#"
        INSERT INTO admin_users (username, email, password_hash, display_name)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(input.username.trim())
    .bind(input.email.trim())
    .bind(&password_hash)
    .bind(&input.display_name)
    .fetch_one(&state.pool)
    .await;

    match result {
        Ok(user) => {
            tracing::info!("Administrator {} registered", user.username);
            (
                StatusCode::CREATED,
                Json(ApiResponse::success(AdminUserResponse::from(user))),
            )
        }
        Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => (
            StatusCode::CONFLICT,
            Json(ApiResponse::error("Username already exists")),
        ),
        Err(e) => {
            tracing::error!("Failed to create administrator: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Registration failed")),
            )
        }
    }
}

// =============================================================================
// Login Endpoint
// =============================================================================

/// Admin login
pub async fn admin_login(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(input): Json<LoginRequest>,
) -> impl IntoResponse {
    let client_ip = meta.ip_address.clone().unwrap_or_default();

    if !check_rate_limit(&state.pool, &client_ip, "login").await {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::SET_COOKIE, "".to_string())],
            Json(ApiResponse::<AdminUserResponse>::error(
                "Too many login attempts. Please try again later.",
            )),
        );
    }
    record_attempt(&state.pool, &client_ip, "login").await;

    let user = match sqlx::query_as::<_, AdminUser>("SELECT * FROM admin_users WHERE username = $1")
        .bind(input.username.trim())
        .fetch_optional(&state.pool)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            tracing::error!("Database error during admin login: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::SET_COOKIE, "".to_string())],
                Json(ApiResponse::error("Authentication error")),
            );
        }
    };

    // Unknown user, inactive user and wrong password look the same
    let user = match check_credentials(state.engine.hasher(), user.as_ref(), &input.password) {
        Ok(()) => user,
        Err(EngineError::InvalidCredentials) => None,
        Err(e) => {
            tracing::error!("Credential check failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::SET_COOKIE, "".to_string())],
                Json(ApiResponse::error("Authentication error")),
            );
        }
    };
    let Some(user) = user else {
        return (
            StatusCode::UNAUTHORIZED,
            [(header::SET_COOKIE, "".to_string())],
            Json(ApiResponse::error("Invalid username or password")),
        );
    };

    let token = generate_session_token();
    let token_hash = hash_token(&token);
    let expires_at = Utc::now() + Duration::hours(state.session_expiry_hours);

    let session_result = sqlx::query(
        r#"
        INSERT INTO admin_sessions (admin_user_id, token_hash, expires_at, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user.id)
    .bind(&token_hash)
    .bind(expires_at)
    .bind(&client_ip)
    .bind(&meta.user_agent)
    .execute(&state.pool)
    .await;

    if let Err(e) = session_result {
        tracing::error!("Failed to create admin session: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::SET_COOKIE, "".to_string())],
            Json(ApiResponse::error("Failed to create session")),
        );
    }

    let _ = sqlx::query("UPDATE admin_users SET last_login_at = NOW() WHERE id = $1")
        .bind(user.id)
        .execute(&state.pool)
        .await;

    tracing::info!("Administrator {} logged in from {}", user.username, client_ip);

    let cookie = session_cookie(
        SESSION_COOKIE,
        &token,
        state.session_expiry_hours,
        state.is_production,
    );

    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(ApiResponse::success(AdminUserResponse::from(user))),
    )
}

/// Admin logout
pub async fn admin_logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Some(token) = extract_cookie(&headers, SESSION_COOKIE) {
        let _ = sqlx::query("DELETE FROM admin_sessions WHERE token_hash = $1")
            .bind(hash_token(&token))
            .execute(&state.pool)
            .await;
    }

    (
        StatusCode::OK,
        [(header::SET_COOKIE, clear_cookie(SESSION_COOKIE, state.is_production))],
        Json(ApiResponse::success(())),
    )
}

/// Get current admin user; runs behind `require_admin`
pub async fn get_current_admin(Extension(admin): Extension<AdminUser>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse::success(AdminUserResponse::from(admin))),
    )
}

// =============================================================================
// Session Validation
// =============================================================================

/// Resolve the admin session cookie to an active user
pub async fn validate_admin_session(
    pool: &PgPool,
    headers: &HeaderMap,
) -> Result<Option<AdminUser>, sqlx::Error> {
    let Some(token) = extract_cookie(headers, SESSION_COOKIE) else {
        return Ok(None);
    };

    sqlx::query_as::<_, AdminUser>(
        r#"
        SELECT u.* FROM admin_users u
        JOIN admin_sessions s ON s.admin_user_id = u.id
        WHERE s.token_hash = $1 AND s.expires_at > NOW() AND u.is_active = true
        "#,
    )
    .bind(hash_token(&token))
    .fetch_optional(pool)
    .await
}

// =============================================================================
// Helper Functions
// =============================================================================

pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    let prefix = format!("{}=", name);

    cookie_header
        .split(';')
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(prefix.as_str()))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn session_cookie(name: &str, token: &str, hours: i64, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}{}",
        name,
        token,
        hours * 3600,
        secure_flag
    )
}

pub fn clear_cookie(name: &str, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0{}",
        name, secure_flag
    )
}

pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub async fn check_rate_limit(pool: &PgPool, ip: &str, endpoint: &str) -> bool {
    check_rate_limit_with_max(pool, ip, endpoint, MAX_LOGIN_ATTEMPTS).await
}

pub async fn check_rate_limit_with_max(pool: &PgPool, ip: &str, endpoint: &str, max: i64) -> bool {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM rate_limit_attempts
        WHERE ip_address = $1 AND endpoint = $2
        AND attempted_at > NOW() - INTERVAL '1 hour'
        "#,
    )
    .bind(ip)
    .bind(endpoint)
    .fetch_one(pool)
    .await
    .unwrap_or(0);

    count < max
}

pub async fn record_attempt(pool: &PgPool, ip: &str, endpoint: &str) {
    let _ = sqlx::query("INSERT INTO rate_limit_attempts (ip_address, endpoint) VALUES ($1, $2)")
        .bind(ip)
        .bind(endpoint)
        .execute(pool)
        .await;
}
