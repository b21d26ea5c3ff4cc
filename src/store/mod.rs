//! Persistence seam for templates, employees and the audit trail
//!
//! The engine talks to storage only through [`Store`]. Each method is one
//! unit of work: implementations commit everything a call writes, including
//! the audit entry handed to employee mutations, or nothing at all.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use crate::models::{
    AuditAction, AuditEntry, DashboardStats, Employee, EmployeeFieldValue, FieldContent,
    FieldOrder, FormField, FormTemplate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

pub use postgres::PostgresStore;

use crate::engine::field_types::FieldType;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a field named '{0}' already exists in this template")]
    DuplicateFieldName(String),

    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),

    #[error("record not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

// =============================================================================
// Write Types
// =============================================================================

#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewField {
    pub name: String,
    pub label: String,
    pub field_type: FieldType,
    pub is_required: bool,
    pub placeholder: Option<String>,
    pub help_text: Option<String>,
    /// `None` appends after the current last field (order = field count).
    pub order: Option<i32>,
    pub options: Option<JsonValue>,
    pub validation_rules: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub employee_uuid: Uuid,
    pub template_id: i64,
    pub owner_id: Option<Uuid>,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct EmployeePatch {
    pub is_active: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One resolved (field, content) write. Writing a kind clears the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValueWrite {
    pub field_id: i64,
    pub content: FieldContent,
}

impl FieldValueWrite {
    pub fn columns(&self) -> (Option<&str>, Option<&str>) {
        match &self.content {
            FieldContent::Text(text) => (Some(text.as_str()), None),
            FieldContent::File(path) => (None, Some(path.as_str())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    /// Filled in by the store for entries written alongside a new employee.
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
// Query Types
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct EmployeeQuery {
    pub owner_id: Option<Uuid>,
    pub template_id: Option<i64>,
    pub is_active: Option<bool>,
    /// Lowercased terms; an employee matches if any text value contains any term.
    pub terms: Vec<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub owner_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub employee_id: Option<i64>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

// =============================================================================
// Store Trait
// =============================================================================

#[async_trait]
pub trait Store: Send + Sync {
    // Templates

    /// Insert a template together with its initial fields.
    async fn insert_template(
        &self,
        template: NewTemplate,
        fields: Vec<NewField>,
    ) -> Result<(FormTemplate, Vec<FormField>), StoreError>;

    async fn get_template(&self, id: i64) -> Result<Option<FormTemplate>, StoreError>;

    /// Templates newest first, optionally restricted to an owner and/or active ones.
    async fn list_templates(
        &self,
        owner_id: Option<Uuid>,
        active_only: bool,
    ) -> Result<Vec<FormTemplate>, StoreError>;

    async fn set_template_active(
        &self,
        id: i64,
        is_active: bool,
        at: DateTime<Utc>,
    ) -> Result<Option<FormTemplate>, StoreError>;

    /// Hard delete; cascades to fields, employees and their values.
    async fn delete_template(&self, id: i64) -> Result<bool, StoreError>;

    /// Fields of a template in definition order.
    async fn list_fields(&self, template_id: i64) -> Result<Vec<FormField>, StoreError>;

    async fn insert_field(&self, template_id: i64, field: NewField)
        -> Result<FormField, StoreError>;

    /// Apply each pairing whose field belongs to the template; returns how many applied.
    async fn set_field_orders(
        &self,
        template_id: i64,
        orders: &[FieldOrder],
    ) -> Result<usize, StoreError>;

    async fn count_employees(&self, template_id: i64) -> Result<i64, StoreError>;

    // Employees

    async fn insert_employee(
        &self,
        employee: NewEmployee,
        values: Vec<FieldValueWrite>,
        audit: NewAuditEntry,
    ) -> Result<Employee, StoreError>;

    async fn update_employee(
        &self,
        id: i64,
        patch: EmployeePatch,
        values: Vec<FieldValueWrite>,
        audit: NewAuditEntry,
    ) -> Result<Employee, StoreError>;

    /// Remove the employee and its values, purge its earlier audit history and
    /// leave `audit` as the only entry referencing it.
    async fn delete_employee(&self, id: i64, audit: NewAuditEntry) -> Result<bool, StoreError>;

    async fn get_employee(&self, id: i64) -> Result<Option<Employee>, StoreError>;

    async fn get_employee_by_uuid(&self, uuid: Uuid) -> Result<Option<Employee>, StoreError>;

    async fn get_employee_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Employee>, StoreError>;

    async fn list_field_values(
        &self,
        employee_ids: &[i64],
    ) -> Result<Vec<EmployeeFieldValue>, StoreError>;

    /// Assign username and hash; the username constraint is enforced here.
    async fn set_credentials(
        &self,
        id: i64,
        username: &str,
        password_hash: &str,
        audit: NewAuditEntry,
    ) -> Result<Employee, StoreError>;

    async fn set_password_hash(
        &self,
        id: i64,
        password_hash: &str,
        audit: NewAuditEntry,
    ) -> Result<(), StoreError>;

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Matching employees newest first, plus the total before limit/offset.
    async fn search_employees(
        &self,
        query: &EmployeeQuery,
    ) -> Result<(Vec<Employee>, i64), StoreError>;

    // Audit

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError>;

    async fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, StoreError>;

    async fn dashboard_stats(&self, owner_id: Uuid) -> Result<DashboardStats, StoreError>;
}
