//! Data models for the application

use crate::engine::field_types::FieldType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    View,
}

// =============================================================================
// Form Template
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FormTemplate {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One typed slot within a template.
///
/// Fields iterate by `order`, then by creation; two fields may share an
/// `order` value after a reorder.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FormField {
    pub id: i64,
    pub template_id: i64,
    pub name: String,
    pub label: String,
    pub field_type: FieldType,
    pub is_required: bool,
    pub placeholder: Option<String>,
    pub help_text: Option<String>,
    #[sqlx(rename = "field_order")]
    pub order: i32,
    pub options: Option<JsonValue>,
    pub validation_rules: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FieldSpec {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub label: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub is_required: bool,
    #[validate(length(max = 200))]
    pub placeholder: Option<String>,
    pub help_text: Option<String>,
    pub order: Option<i32>,
    pub options: Option<JsonValue>,
    pub validation_rules: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTemplate {
    #[validate(length(max = 100))]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    #[validate]
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FieldOrder {
    pub id: i64,
    pub order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderFields {
    pub field_orders: Vec<FieldOrder>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateResponse {
    #[serde(flatten)]
    pub template: FormTemplate,
    pub fields: Vec<FormField>,
    pub employee_count: i64,
}

// =============================================================================
// Employee
// =============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct Employee {
    pub id: i64,
    pub employee_uuid: Uuid,
    pub template_id: i64,
    pub owner_id: Option<Uuid>,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub is_login_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored content of one (employee, field) slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldContent {
    Text(String),
    File(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmployeeFieldValue {
    pub id: i64,
    pub employee_id: i64,
    pub field_id: i64,
    pub value: Option<String>,
    pub file_value: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmployeeFieldValue {
    /// The populated column, if any. Text and file columns are never both set.
    pub fn content(&self) -> Option<FieldContent> {
        match (&self.value, &self.file_value) {
            (_, Some(path)) => Some(FieldContent::File(path.clone())),
            (Some(text), None) => Some(FieldContent::Text(text.clone())),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateEmployee {
    pub template_id: i64,
    #[serde(default)]
    pub field_values: HashMap<String, JsonValue>,
    #[serde(default)]
    pub file_values: HashMap<String, String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEmployee {
    #[serde(default)]
    pub field_values: HashMap<String, JsonValue>,
    #[serde(default)]
    pub file_values: HashMap<String, String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldValueResponse {
    pub field_id: i64,
    pub field_name: String,
    pub field_label: String,
    pub field_type: FieldType,
    pub value: Option<String>,
    pub file_value: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmployeeResponse {
    pub id: i64,
    pub employee_uuid: Uuid,
    pub template_id: i64,
    pub template_name: String,
    pub owner_id: Option<Uuid>,
    pub username: Option<String>,
    pub is_active: bool,
    pub is_login_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub display_name: String,
    pub field_values: Vec<FieldValueResponse>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

// =============================================================================
// Employee Realm
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct EmployeeRegistration {
    pub username: String,
    pub password: String,
    pub template_id: i64,
    #[serde(default)]
    pub field_values: HashMap<String, JsonValue>,
    #[serde(default)]
    pub file_values: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, FromRow)]
#[allow(dead_code)]
pub struct EmployeeSession {
    pub id: Uuid,
    pub employee_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmployeeSessionResponse {
    pub employee: EmployeeResponse,
    pub session_expires_at: DateTime<Utc>,
}

// =============================================================================
// Audit Log
// =============================================================================

/// Immutable record of one lifecycle action against an employee.
///
/// `employee_uuid` and `employee_name` are captured at write time so a
/// `delete` entry still reads correctly once the employee row is gone.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditEntry {
    pub id: i64,
    pub employee_id: i64,
    pub employee_uuid: Uuid,
    pub employee_name: String,
    pub owner_id: Option<Uuid>,
    pub action: AuditAction,
    pub performed_by: Option<Uuid>,
    pub changes: JsonValue,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Admin User
// =============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct AdminUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminUserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<AdminUser> for AdminUserResponse {
    fn from(user: AdminUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            is_active: user.is_active,
            last_login_at: user.last_login_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterAdmin {
    #[validate(length(min = 3, max = 150))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    pub password: String,
    #[validate(length(max = 200))]
    pub display_name: Option<String>,
}

// =============================================================================
// Dashboard & Uploads
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DashboardStats {
    pub total_employees: i64,
    pub active_employees: i64,
    pub total_templates: i64,
    pub active_templates: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
}

// =============================================================================
// API Responses
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            details: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            details: Vec::new(),
        }
    }

    pub fn error_with_details(message: impl Into<String>, details: Vec<String>) -> Self {
        Self {
            details,
            ..Self::error(message)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = (total as f64 / per_page as f64).ceil() as i64;
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}
