//! Employee management handlers (admin)

use crate::engine::{Actor, RequestMeta, SearchParams};
use crate::models::*;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use super::{error_response, AppState};

/// List or search the administrator's employees
pub async fn list_employees(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    match state.engine.search_employees(admin.id, &params).await {
        Ok((records, total)) => {
            let items = records.into_iter().map(|r| r.into_response()).collect();
            (
                StatusCode::OK,
                Json(ApiResponse::success(PaginatedResponse::new(
                    items,
                    total,
                    params.page(),
                    params.per_page(),
                ))),
            )
        }
        Err(e) => error_response(e),
    }
}

pub async fn create_employee(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    meta: RequestMeta,
    Json(input): Json<CreateEmployee>,
) -> impl IntoResponse {
    match state.engine.create_employee(admin.id, input, &meta).await {
        Ok(record) => (
            StatusCode::CREATED,
            Json(ApiResponse::success(record.into_response())),
        ),
        Err(e) => error_response(e),
    }
}

/// Employee detail; recorded as a view
pub async fn get_employee(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Path(id): Path<i64>,
    meta: RequestMeta,
) -> impl IntoResponse {
    match state
        .engine
        .view_employee(Actor::Admin(admin.id), id, &meta)
        .await
    {
        Ok(record) => (StatusCode::OK, Json(ApiResponse::success(record.into_response()))),
        Err(e) => error_response(e),
    }
}

pub async fn get_employee_by_uuid(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Path(employee_uuid): Path<Uuid>,
) -> impl IntoResponse {
    match state
        .engine
        .get_employee_by_uuid(Actor::Admin(admin.id), employee_uuid)
        .await
    {
        Ok(record) => (StatusCode::OK, Json(ApiResponse::success(record.into_response()))),
        Err(e) => error_response(e),
    }
}

pub async fn update_employee(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Path(id): Path<i64>,
    meta: RequestMeta,
    Json(input): Json<UpdateEmployee>,
) -> impl IntoResponse {
    match state
        .engine
        .update_employee(Actor::Admin(admin.id), id, input, &meta)
        .await
    {
        Ok(record) => (StatusCode::OK, Json(ApiResponse::success(record.into_response()))),
        Err(e) => error_response(e),
    }
}

pub async fn delete_employee(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Path(id): Path<i64>,
    meta: RequestMeta,
) -> impl IntoResponse {
    match state.engine.delete_employee(admin.id, id, &meta).await {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::success(()))),
        Err(e) => error_response(e),
    }
}

/// Assign or replace the employee's login
pub async fn set_employee_credentials(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Path(id): Path<i64>,
    meta: RequestMeta,
    Json(input): Json<SetCredentials>,
) -> impl IntoResponse {
    match state
        .engine
        .set_credentials(admin.id, id, &input.username, &input.password, &meta)
        .await
    {
        Ok(record) => (StatusCode::OK, Json(ApiResponse::success(record.into_response()))),
        Err(e) => error_response(e),
    }
}

/// Get dashboard statistics
pub async fn get_dashboard_stats(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
) -> impl IntoResponse {
    match state.engine.dashboard_stats(admin.id).await {
        Ok(stats) => (StatusCode::OK, Json(ApiResponse::success(stats))),
        Err(e) => error_response(e),
    }
}
