//! Template management handlers
//!
//! Administrators manage their own templates; the public endpoints list the
//! active templates an employee can register against.

use crate::engine::field_types::FieldType;
use crate::models::*;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Serialize;

use super::{error_response, AppState};

// =============================================================================
// Field Type Catalog
// =============================================================================

#[derive(Debug, Serialize)]
pub struct FieldTypeInfo {
    pub value: FieldType,
    pub label: &'static str,
    pub has_options: bool,
    pub stores_file: bool,
}

/// The closed set of field types a template may use
pub async fn list_field_types() -> impl IntoResponse {
    let types: Vec<FieldTypeInfo> = FieldType::ALL
        .iter()
        .map(|t| FieldTypeInfo {
            value: *t,
            label: t.label(),
            has_options: t.has_options(),
            stores_file: t.stores_file(),
        })
        .collect();

    Json(ApiResponse::success(types))
}

// =============================================================================
// Admin Template Endpoints
// =============================================================================

/// List the administrator's templates, inactive ones included
pub async fn list_templates(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
) -> impl IntoResponse {
    match state.engine.list_templates(admin.id).await {
        Ok(templates) => (StatusCode::OK, Json(ApiResponse::success(templates))),
        Err(e) => error_response(e),
    }
}

pub async fn create_template(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Json(input): Json<CreateTemplate>,
) -> impl IntoResponse {
    match state.engine.create_template(admin.id, input).await {
        Ok(template) => (StatusCode::CREATED, Json(ApiResponse::success(template))),
        Err(e) => error_response(e),
    }
}

/// Template with its ordered fields and bound employee count
pub async fn get_template(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.engine.get_template_detail(admin.id, id).await {
        Ok(template) => (StatusCode::OK, Json(ApiResponse::success(template))),
        Err(e) => error_response(e),
    }
}

pub async fn deactivate_template(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.engine.deactivate_template(admin.id, id).await {
        Ok(template) => (StatusCode::OK, Json(ApiResponse::success(template))),
        Err(e) => error_response(e),
    }
}

/// Hard delete; bound employees are removed with the template
pub async fn delete_template(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.engine.delete_template(admin.id, id).await {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::success(()))),
        Err(e) => error_response(e),
    }
}

pub async fn add_template_field(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Path(id): Path<i64>,
    Json(spec): Json<FieldSpec>,
) -> impl IntoResponse {
    match state.engine.add_field(admin.id, id, spec).await {
        Ok(field) => (StatusCode::CREATED, Json(ApiResponse::success(field))),
        Err(e) => error_response(e),
    }
}

pub async fn reorder_template_fields(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Path(id): Path<i64>,
    Json(input): Json<ReorderFields>,
) -> impl IntoResponse {
    match state.engine.reorder_fields(admin.id, id, &input.field_orders).await {
        Ok(fields) => (StatusCode::OK, Json(ApiResponse::success(fields))),
        Err(e) => error_response(e),
    }
}

// =============================================================================
// Public Template Endpoints
// =============================================================================

/// Active templates across all owners, for self-registration
pub async fn list_public_templates(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.list_active_templates(None).await {
        Ok(templates) => (StatusCode::OK, Json(ApiResponse::success(templates))),
        Err(e) => error_response(e),
    }
}

pub async fn get_public_template(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.engine.get_public_template(id).await {
        Ok(template) => (StatusCode::OK, Json(ApiResponse::success(template))),
        Err(e) => error_response(e),
    }
}
