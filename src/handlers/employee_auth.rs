//! Employee self-service handlers
//!
//! Employees sign up against an active template, log in with the username
//! and password set at registration (or by their administrator), and then
//! read and edit their own record. Sessions live in `employee_sessions`.

use crate::engine::{Actor, RequestMeta};
use crate::models::*;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{Duration, Utc};
use sqlx::PgPool;

use super::auth::{
    check_rate_limit, clear_cookie, extract_cookie, generate_session_token, hash_token,
    record_attempt, session_cookie,
};
use super::{error_response, AppState};

/// Session cookie name for employee sessions
pub const EMPLOYEE_SESSION_COOKIE: &str = "hr_employee_session";

// =============================================================================
// Registration Endpoint
// =============================================================================

/// Employee self-registration against a public template
pub async fn employee_register(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(input): Json<EmployeeRegistration>,
) -> impl IntoResponse {
    let client_ip = meta.ip_address.clone().unwrap_or_default();

    if !check_rate_limit(&state.pool, &client_ip, "employee_register").await {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiResponse::<EmployeeResponse>::error(
                "Too many registration attempts. Please try again later.",
            )),
        );
    }
    record_attempt(&state.pool, &client_ip, "employee_register").await;

    match state.engine.register_employee(input, &meta).await {
        Ok(record) => {
            tracing::info!(
                "Employee {} registered against template {}",
                record.employee.id,
                record.template.id
            );
            (
                StatusCode::CREATED,
                Json(ApiResponse::success(record.into_response())),
            )
        }
        Err(e) => error_response(e),
    }
}

// =============================================================================
// Login Endpoint
// =============================================================================

pub async fn employee_login(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(input): Json<LoginRequest>,
) -> impl IntoResponse {
    let client_ip = meta.ip_address.clone().unwrap_or_default();

    // Check rate limit (10 attempts per hour per IP)
    if !check_rate_limit(&state.pool, &client_ip, "employee_login").await {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::SET_COOKIE, "".to_string())],
            Json(ApiResponse::<EmployeeSessionResponse>::error(
                "Too many login attempts. Please try again later.",
            )),
        );
    }
    record_attempt(&state.pool, &client_ip, "employee_login").await;

    let record = match state
        .engine
        .authenticate_employee(&input.username, &input.password, &meta)
        .await
    {
        Ok(record) => record,
        Err(e) => {
            let (status, body) = error_response(e);
            return (status, [(header::SET_COOKIE, "".to_string())], body);
        }
    };

    let token = generate_session_token();
    let expires_at = Utc::now() + Duration::hours(state.employee_session_hours);

    let session_result = sqlx::query(
        r#"
        INSERT INTO employee_sessions (employee_id, token_hash, expires_at, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(record.employee.id)
    .bind(hash_token(&token))
    .bind(expires_at)
    .bind(&client_ip)
    .bind(&meta.user_agent)
    .execute(&state.pool)
    .await;

    if let Err(e) = session_result {
        tracing::error!("Failed to create employee session: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::SET_COOKIE, "".to_string())],
            Json(ApiResponse::error("Failed to create session")),
        );
    }

    let cookie = session_cookie(
        EMPLOYEE_SESSION_COOKIE,
        &token,
        state.employee_session_hours,
        state.is_production,
    );

    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(ApiResponse::success(EmployeeSessionResponse {
            employee: record.into_response(),
            session_expires_at: expires_at,
        })),
    )
}

// =============================================================================
// Logout Endpoint
// =============================================================================

pub async fn employee_logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Some(token) = extract_cookie(&headers, EMPLOYEE_SESSION_COOKIE) {
        let _ = sqlx::query("DELETE FROM employee_sessions WHERE token_hash = $1")
            .bind(hash_token(&token))
            .execute(&state.pool)
            .await;
    }

    (
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            clear_cookie(EMPLOYEE_SESSION_COOKIE, state.is_production),
        )],
        Json(ApiResponse::success(())),
    )
}

// =============================================================================
// Own Record
// =============================================================================

/// The logged-in employee's record; recorded as a view.
pub async fn get_current_employee(
    State(state): State<AppState>,
    Extension(session): Extension<EmployeeSession>,
    meta: RequestMeta,
) -> impl IntoResponse {
    match state
        .engine
        .view_employee(Actor::SelfService, session.employee_id, &meta)
        .await
    {
        Ok(record) => (
            StatusCode::OK,
            Json(ApiResponse::success(EmployeeSessionResponse {
                employee: record.into_response(),
                session_expires_at: session.expires_at,
            })),
        ),
        Err(e) => error_response(e),
    }
}

/// Edit own field values. `is_active` in the body is ignored.
pub async fn update_current_employee(
    State(state): State<AppState>,
    Extension(session): Extension<EmployeeSession>,
    meta: RequestMeta,
    Json(input): Json<UpdateEmployee>,
) -> impl IntoResponse {
    match state
        .engine
        .update_employee(Actor::SelfService, session.employee_id, input, &meta)
        .await
    {
        Ok(record) => (StatusCode::OK, Json(ApiResponse::success(record.into_response()))),
        Err(e) => error_response(e),
    }
}

/// Change own password; other sessions of the employee are ended.
pub async fn change_employee_password(
    State(state): State<AppState>,
    Extension(session): Extension<EmployeeSession>,
    meta: RequestMeta,
    Json(input): Json<ChangePasswordRequest>,
) -> impl IntoResponse {
    let client_ip = meta.ip_address.clone().unwrap_or_default();
    if !check_rate_limit(&state.pool, &client_ip, "change_password").await {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiResponse::<()>::error(
                "Too many attempts. Please try again later.",
            )),
        );
    }
    record_attempt(&state.pool, &client_ip, "change_password").await;

    if let Err(e) = state
        .engine
        .change_password(
            session.employee_id,
            &input.current_password,
            &input.new_password,
            &meta,
        )
        .await
    {
        return error_response(e);
    }

    let _ = sqlx::query("DELETE FROM employee_sessions WHERE employee_id = $1 AND id <> $2")
        .bind(session.employee_id)
        .bind(session.id)
        .execute(&state.pool)
        .await;

    (StatusCode::OK, Json(ApiResponse::success(())))
}

// =============================================================================
// Session Validation
// =============================================================================

/// Resolve the employee session cookie. Sessions of deactivated employees,
/// or of employees whose login was switched off, are not valid.
pub async fn validate_employee_session(
    pool: &PgPool,
    headers: &HeaderMap,
) -> Option<EmployeeSession> {
    let token = extract_cookie(headers, EMPLOYEE_SESSION_COOKIE)?;

    match sqlx::query_as::<_, EmployeeSession>(
        r#"
        SELECT s.* FROM employee_sessions s
        JOIN employees e ON e.id = s.employee_id
        WHERE s.token_hash = $1 AND s.expires_at > NOW()
        AND e.is_active = true AND e.is_login_active = true
        "#,
    )
    .bind(hash_token(&token))
    .fetch_optional(pool)
    .await
    {
        Ok(Some(session)) => Some(session),
        Ok(None) => {
            tracing::debug!("No valid employee session found for token hash");
            None
        }
        Err(e) => {
            tracing::error!("Database error during employee session lookup: {}", e);
            None
        }
    }
}
