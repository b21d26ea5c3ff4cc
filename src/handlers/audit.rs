//! Audit history handler

use crate::engine::AuditFilter;
use crate::models::*;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};

use super::{error_response, AppState};

/// Audit entries for the administrator's employees, newest first
pub async fn list_audit(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Query(filter): Query<AuditFilter>,
) -> impl IntoResponse {
    match state.engine.list_audit(admin.id, filter).await {
        Ok(entries) => (StatusCode::OK, Json(ApiResponse::success(entries))),
        Err(e) => error_response(e),
    }
}
