//! File upload handlers
//!
//! An upload only stores the bytes; the returned `file_path` is then sent as
//! a `file_values` entry when creating or updating an employee.

use crate::engine::RequestMeta;
use crate::models::*;
use crate::validation::{validate_file_upload, validate_filename_extensions};
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use super::auth::{check_rate_limit_with_max, record_attempt};
use super::{error_response, AppState};

/// Employee uploads per IP per hour
pub const MAX_EMPLOYEE_UPLOADS: i64 = 30;

type UploadResult = Result<UploadResponse, (StatusCode, Json<ApiResponse<UploadResponse>>)>;

/// Upload a file as an administrator
pub async fn upload_file(State(state): State<AppState>, multipart: Multipart) -> impl IntoResponse {
    match store_upload(&state, multipart).await {
        Ok(upload) => (StatusCode::CREATED, Json(ApiResponse::success(upload))),
        Err(rejection) => rejection,
    }
}

/// Upload a file for the logged-in employee's own record
pub async fn employee_upload_file(
    State(state): State<AppState>,
    meta: RequestMeta,
    multipart: Multipart,
) -> impl IntoResponse {
    let client_ip = meta.ip_address.unwrap_or_default();
    if !check_rate_limit_with_max(&state.pool, &client_ip, "upload", MAX_EMPLOYEE_UPLOADS).await {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiResponse::error("Too many uploads. Please try again later.")),
        );
    }
    record_attempt(&state.pool, &client_ip, "upload").await;

    match store_upload(&state, multipart).await {
        Ok(upload) => (StatusCode::CREATED, Json(ApiResponse::success(upload))),
        Err(rejection) => rejection,
    }
}

/// Read the first multipart field, check it and hand it to file storage
async fn store_upload(state: &AppState, mut multipart: Multipart) -> UploadResult {
    let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => return Err(bad_request("No file provided")),
        Err(e) => {
            tracing::error!("Multipart parsing error: {}", e);
            return Err(bad_request(upload_error_message(&e.to_string(), state.max_upload_size)));
        }
    };

    let original_filename = field.file_name().unwrap_or("unknown").to_string();
    let declared_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();

    let data = match field.bytes().await {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("Failed to read file bytes: {}", e);
            return Err(bad_request(upload_error_message(&e.to_string(), state.max_upload_size)));
        }
    };

    let mime_type = detect_mime_type(&data, &declared_type);

    if let Err(e) = validate_file_upload(&mime_type, data.len(), state.max_upload_size) {
        return Err(bad_request(e.to_string()));
    }
    if let Err(e) = validate_filename_extensions(&original_filename) {
        return Err(bad_request(e.to_string()));
    }

    match state.engine.store_file(&data, &original_filename).await {
        Ok(stored) => {
            tracing::info!(
                "Stored upload {} ({} bytes, {})",
                stored.locator,
                stored.size,
                mime_type
            );
            Ok(UploadResponse {
                file_path: stored.locator,
                file_name: stored.file_name,
                file_size: stored.size as i64,
                mime_type,
            })
        }
        Err(e) => Err(error_response(e)),
    }
}

/// Magic bytes win over the declared content type; plain text has no
/// signature, so the declared type stands in for it.
pub fn detect_mime_type(data: &[u8], declared: &str) -> String {
    match infer::get(data) {
        Some(kind) => kind.mime_type().to_string(),
        None => declared.to_string(),
    }
}

fn upload_error_message(error: &str, max_upload_size: usize) -> String {
    if error.contains("length limit") {
        format!(
            "File too large. Maximum upload size is {}MB.",
            max_upload_size / (1024 * 1024)
        )
    } else if error.contains("content-type") {
        "Invalid upload format. Please use multipart/form-data.".to_string()
    } else {
        "Failed to process upload. Please try again.".to_string()
    }
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ApiResponse<UploadResponse>>) {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message)))
}
