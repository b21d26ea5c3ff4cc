//! Entity store operations
//!
//! An employee holds at most one value per template field. Submitted value
//! maps are resolved against the template's fields before anything is
//! written: ids outside the template are dropped, required fields are
//! enforced, and each surviving value becomes a text or file write.

use std::collections::{BTreeMap, HashMap};

use serde_json::{json, Map, Value as JsonValue};
use uuid::Uuid;

use super::audit::RequestMeta;
use super::credentials::check_credentials;
use super::{Engine, EngineError, EngineResult};
use crate::models::{
    AuditAction, CreateEmployee, Employee, EmployeeFieldValue, EmployeeRegistration,
    EmployeeResponse, FieldContent, FieldValueResponse, FormField, FormTemplate, UpdateEmployee,
};
use crate::store::{EmployeePatch, FieldValueWrite, NewEmployee};
use crate::validation::{
    validate_password, validate_username, validate_values, FieldInput, ValueMode,
};

/// Who is acting on an employee record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// An administrator; only sees employees they own.
    Admin(Uuid),
    /// The employee acting on their own record.
    SelfService,
}

impl Actor {
    fn owner_scope(&self) -> Option<Uuid> {
        match self {
            Actor::Admin(id) => Some(*id),
            Actor::SelfService => None,
        }
    }

    fn performed_by(&self) -> Option<Uuid> {
        self.owner_scope()
    }
}

/// An employee together with everything needed to present it.
#[derive(Debug, Clone)]
pub struct EmployeeRecord {
    pub employee: Employee,
    pub template: FormTemplate,
    /// Template fields in definition order.
    pub fields: Vec<FormField>,
    pub values: Vec<EmployeeFieldValue>,
    /// Advisory type mismatches from the write that produced this record.
    pub warnings: Vec<String>,
}

impl EmployeeRecord {
    pub fn display_name(&self) -> String {
        compute_display_name(&self.fields, &self.values, self.employee.employee_uuid)
    }

    pub fn content(&self, field_id: i64) -> Option<FieldContent> {
        self.values
            .iter()
            .find(|v| v.field_id == field_id)
            .and_then(EmployeeFieldValue::content)
    }

    pub fn into_response(self) -> EmployeeResponse {
        let display_name = self.display_name();
        let field_values = self
            .fields
            .iter()
            .filter_map(|field| {
                let value = self.values.iter().find(|v| v.field_id == field.id)?;
                Some(FieldValueResponse {
                    field_id: field.id,
                    field_name: field.name.clone(),
                    field_label: field.label.clone(),
                    field_type: field.field_type,
                    value: value.value.clone(),
                    file_value: value.file_value.clone(),
                })
            })
            .collect();

        let e = self.employee;
        EmployeeResponse {
            id: e.id,
            employee_uuid: e.employee_uuid,
            template_id: e.template_id,
            template_name: self.template.name,
            owner_id: e.owner_id,
            username: e.username,
            is_active: e.is_active,
            is_login_active: e.is_login_active,
            last_login_at: e.last_login_at,
            created_at: e.created_at,
            updated_at: e.updated_at,
            display_name,
            field_values,
            warnings: self.warnings,
        }
    }
}

/// Best-effort display name.
///
/// Takes the text of the first field, in definition order, whose *name*
/// contains "name" in any case. Falls back to `Employee {uuid}` when no such
/// field exists or it holds no text. Which field wins depends only on field
/// order, so two name-like fields make the result order-sensitive.
pub fn compute_display_name(
    fields: &[FormField],
    values: &[EmployeeFieldValue],
    employee_uuid: Uuid,
) -> String {
    display_name_with(fields, employee_uuid, |field_id| {
        values
            .iter()
            .find(|v| v.field_id == field_id)
            .and_then(|v| v.value.clone())
    })
}

fn display_name_with(
    fields: &[FormField],
    employee_uuid: Uuid,
    text_of: impl Fn(i64) -> Option<String>,
) -> String {
    fields
        .iter()
        .find(|f| f.name.to_lowercase().contains("name"))
        .and_then(|f| text_of(f.id))
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| format!("Employee {}", employee_uuid))
}

/// Turn validated input into store writes.
///
/// A `file` field takes its locator from `input.files` when one is present;
/// every other value is stored as text. Ids outside `fields` are dropped.
pub fn resolve_writes(fields: &[FormField], input: &FieldInput) -> Vec<FieldValueWrite> {
    let by_id: HashMap<i64, &FormField> = fields.iter().map(|f| (f.id, f)).collect();
    let mut writes = BTreeMap::new();

    for (field_id, text) in &input.values {
        let Some(field) = by_id.get(field_id) else {
            tracing::debug!("Dropping value for field {} outside the template", field_id);
            continue;
        };
        let content = match input.files.get(field_id) {
            Some(locator) if field.field_type.stores_file() => FieldContent::File(locator.clone()),
            _ => FieldContent::Text(text.clone()),
        };
        writes.insert(*field_id, content);
    }

    for (field_id, locator) in &input.files {
        match by_id.get(field_id) {
            Some(field) if field.field_type.stores_file() => {
                writes.insert(*field_id, FieldContent::File(locator.clone()));
            }
            Some(_) => {
                tracing::debug!("Ignoring file payload for non-file field {}", field_id)
            }
            None => {
                tracing::debug!("Dropping file for field {} outside the template", field_id)
            }
        }
    }

    writes
        .into_iter()
        .map(|(field_id, content)| FieldValueWrite { field_id, content })
        .collect()
}

fn content_json(content: Option<FieldContent>) -> JsonValue {
    match content {
        Some(FieldContent::Text(text)) | Some(FieldContent::File(text)) => JsonValue::String(text),
        None => JsonValue::Null,
    }
}

fn field_names(fields: &[FormField], writes: &[FieldValueWrite]) -> Vec<String> {
    writes
        .iter()
        .filter_map(|w| fields.iter().find(|f| f.id == w.field_id))
        .map(|f| f.name.clone())
        .collect()
}

impl Engine {
    // =========================================================================
    // Creation
    // =========================================================================

    /// Administrator-side creation against one of the owner's templates.
    pub async fn create_employee(
        &self,
        owner_id: Uuid,
        input: CreateEmployee,
        meta: &RequestMeta,
    ) -> EngineResult<EmployeeRecord> {
        let template = self.owned_template(owner_id, input.template_id).await?;
        let values = FieldInput::from_raw(&input.field_values, &input.file_values);

        self.insert_employee(
            template,
            values,
            NewEmployeeParts {
                owner_id: Some(owner_id),
                username: None,
                password_hash: None,
                is_active: input.is_active.unwrap_or(true),
                performed_by: Some(owner_id),
                changes: None,
            },
            meta,
        )
        .await
    }

    /// Employee self-registration against an active template.
    ///
    /// The new record belongs to the template's owner; the audit entry has no
    /// performing user.
    pub async fn register_employee(
        &self,
        input: EmployeeRegistration,
        meta: &RequestMeta,
    ) -> EngineResult<EmployeeRecord> {
        let username = input.username.trim().to_string();
        let problems: Vec<String> = [validate_username(&username), validate_password(&input.password)]
            .into_iter()
            .filter_map(|r| r.err().map(|e| e.to_string()))
            .collect();
        if !problems.is_empty() {
            return Err(EngineError::ValidationFailed(problems));
        }

        let template = self
            .store
            .get_template(input.template_id)
            .await?
            .filter(|t| t.is_active)
            .ok_or(EngineError::NotFound("template"))?;
        let values = FieldInput::from_raw(&input.field_values, &input.file_values);
        let password_hash = self.hasher.hash(&input.password)?;

        self.insert_employee(
            template.clone(),
            values,
            NewEmployeeParts {
                owner_id: Some(template.owner_id),
                username: Some(username),
                password_hash: Some(password_hash),
                is_active: true,
                performed_by: None,
                changes: Some(json!({"registration": true})),
            },
            meta,
        )
        .await
    }

    async fn insert_employee(
        &self,
        template: FormTemplate,
        input: FieldInput,
        parts: NewEmployeeParts,
        meta: &RequestMeta,
    ) -> EngineResult<EmployeeRecord> {
        let fields = self.store.list_fields(template.id).await?;
        let warnings = validate_values(&fields, &input, ValueMode::Create)
            .map_err(EngineError::ValidationFailed)?;
        let writes = resolve_writes(&fields, &input);

        let employee_uuid = Uuid::new_v4();
        let display_name = display_name_with(&fields, employee_uuid, |id| {
            input.values.get(&id).cloned()
        });
        let changes = parts.changes.unwrap_or_else(|| {
            json!({"created": true, "fields": field_names(&fields, &writes)})
        });

        let now = self.now();
        let draft = Employee {
            id: 0,
            employee_uuid,
            template_id: template.id,
            owner_id: parts.owner_id,
            username: parts.username.clone(),
            password_hash: None,
            is_login_active: true,
            last_login_at: None,
            is_active: parts.is_active,
            created_at: now,
            updated_at: now,
        };
        let audit = self.audit_entry(
            &draft,
            display_name,
            AuditAction::Create,
            parts.performed_by,
            changes,
            meta,
        );

        let employee = self
            .store
            .insert_employee(
                NewEmployee {
                    employee_uuid,
                    template_id: template.id,
                    owner_id: parts.owner_id,
                    username: parts.username,
                    password_hash: parts.password_hash,
                    is_active: parts.is_active,
                    created_at: now,
                },
                writes,
                audit,
            )
            .await?;

        tracing::info!(
            "Employee {} ({}) created from template {}",
            employee.id,
            employee.employee_uuid,
            template.id
        );

        let values = self.store.list_field_values(&[employee.id]).await?;
        Ok(EmployeeRecord {
            employee,
            template,
            fields,
            values,
            warnings,
        })
    }

    // =========================================================================
    // Update & Delete
    // =========================================================================

    /// Upsert the supplied field values; absent fields keep what they hold.
    ///
    /// Concurrent writers to the same field race and the later commit wins.
    pub async fn update_employee(
        &self,
        actor: Actor,
        employee_id: i64,
        input: UpdateEmployee,
        meta: &RequestMeta,
    ) -> EngineResult<EmployeeRecord> {
        let current = self.load(actor, employee_id).await?;
        let values = FieldInput::from_raw(&input.field_values, &input.file_values);

        let warnings = validate_values(&current.fields, &values, ValueMode::Update)
            .map_err(EngineError::ValidationFailed)?;
        let writes = resolve_writes(&current.fields, &values);

        let mut old_values = Map::new();
        for write in &writes {
            if let Some(field) = current.fields.iter().find(|f| f.id == write.field_id) {
                old_values.insert(field.name.clone(), content_json(current.content(field.id)));
            }
        }

        // Employees can edit their values but not their own active flag
        let is_active = match actor {
            Actor::Admin(_) => input.is_active,
            Actor::SelfService => None,
        };
        let mut changes = json!({
            "old_values": old_values,
            "updated_fields": field_names(&current.fields, &writes),
        });
        if let Some(active) = is_active.filter(|a| *a != current.employee.is_active) {
            changes["is_active"] = json!({"old": current.employee.is_active, "new": active});
        }

        let display_name = display_name_with(&current.fields, current.employee.employee_uuid, |id| {
            match writes.iter().find(|w| w.field_id == id) {
                Some(FieldValueWrite {
                    content: FieldContent::Text(text),
                    ..
                }) => Some(text.clone()),
                Some(_) => None,
                None => current.values.iter().find(|v| v.field_id == id)?.value.clone(),
            }
        });

        let audit = self.audit_entry(
            &current.employee,
            display_name,
            AuditAction::Update,
            actor.performed_by(),
            changes,
            meta,
        );
        let employee = self
            .store
            .update_employee(
                employee_id,
                EmployeePatch {
                    is_active,
                    updated_at: Some(self.now()),
                },
                writes,
                audit,
            )
            .await?;

        tracing::info!("Employee {} updated", employee_id);

        let values = self.store.list_field_values(&[employee.id]).await?;
        Ok(EmployeeRecord {
            employee,
            values,
            warnings,
            ..current
        })
    }

    /// Remove the employee and its values; one `delete` entry is all that
    /// remains of its audit history.
    pub async fn delete_employee(
        &self,
        owner_id: Uuid,
        employee_id: i64,
        meta: &RequestMeta,
    ) -> EngineResult<()> {
        let current = self.load(Actor::Admin(owner_id), employee_id).await?;
        let audit = self.audit_entry(
            &current.employee,
            current.display_name(),
            AuditAction::Delete,
            Some(owner_id),
            json!({"deleted": true, "employee_uuid": current.employee.employee_uuid}),
            meta,
        );

        if !self.store.delete_employee(employee_id, audit).await? {
            return Err(EngineError::NotFound("employee"));
        }
        tracing::info!("Employee {} deleted by {}", employee_id, owner_id);
        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub async fn get_employee(&self, actor: Actor, employee_id: i64) -> EngineResult<EmployeeRecord> {
        self.load(actor, employee_id).await
    }

    pub async fn get_employee_by_uuid(
        &self,
        actor: Actor,
        employee_uuid: Uuid,
    ) -> EngineResult<EmployeeRecord> {
        let employee = self
            .store
            .get_employee_by_uuid(employee_uuid)
            .await?
            .ok_or(EngineError::NotFound("employee"))?;
        self.load(actor, employee.id).await
    }

    /// Fetch and record a `view` entry. The read succeeds even if the entry
    /// cannot be written.
    pub async fn view_employee(
        &self,
        actor: Actor,
        employee_id: i64,
        meta: &RequestMeta,
    ) -> EngineResult<EmployeeRecord> {
        let record = self.get_employee(actor, employee_id).await?;
        let entry = self.audit_entry(
            &record.employee,
            record.display_name(),
            AuditAction::View,
            actor.performed_by(),
            json!({}),
            meta,
        );
        self.record(entry).await;
        Ok(record)
    }

    pub(crate) async fn load(&self, actor: Actor, employee_id: i64) -> EngineResult<EmployeeRecord> {
        let employee = self
            .store
            .get_employee(employee_id)
            .await?
            .filter(|e| match actor.owner_scope() {
                Some(owner) => e.owner_id == Some(owner),
                None => true,
            })
            .ok_or(EngineError::NotFound("employee"))?;

        let mut records = self.hydrate(vec![employee]).await?;
        records.pop().ok_or(EngineError::NotFound("employee"))
    }

    /// Attach templates, fields and values to a batch of employees.
    pub(crate) async fn hydrate(&self, employees: Vec<Employee>) -> EngineResult<Vec<EmployeeRecord>> {
        let ids: Vec<i64> = employees.iter().map(|e| e.id).collect();
        let mut values = self.store.list_field_values(&ids).await?;
        let mut templates: HashMap<i64, (FormTemplate, Vec<FormField>)> = HashMap::new();
        let mut records = Vec::with_capacity(employees.len());

        for employee in employees {
            if !templates.contains_key(&employee.template_id) {
                let template = self
                    .store
                    .get_template(employee.template_id)
                    .await?
                    .ok_or(EngineError::NotFound("template"))?;
                let fields = self.store.list_fields(template.id).await?;
                templates.insert(template.id, (template, fields));
            }
            let Some((template, fields)) = templates.get(&employee.template_id) else {
                return Err(EngineError::NotFound("template"));
            };

            let (own, rest): (Vec<_>, Vec<_>) =
                values.into_iter().partition(|v| v.employee_id == employee.id);
            values = rest;

            records.push(EmployeeRecord {
                employee,
                template: template.clone(),
                fields: fields.clone(),
                values: own,
                warnings: Vec::new(),
            });
        }

        Ok(records)
    }

    // =========================================================================
    // Credentials
    // =========================================================================

    /// Assign a login. The store's uniqueness constraint decides races: of two
    /// concurrent calls with the same username exactly one succeeds.
    pub async fn set_credentials(
        &self,
        owner_id: Uuid,
        employee_id: i64,
        username: &str,
        password: &str,
        meta: &RequestMeta,
    ) -> EngineResult<EmployeeRecord> {
        let username = username.trim();
        let problems: Vec<String> = [validate_username(username), validate_password(password)]
            .into_iter()
            .filter_map(|r| r.err().map(|e| e.to_string()))
            .collect();
        if !problems.is_empty() {
            return Err(EngineError::ValidationFailed(problems));
        }

        let current = self.load(Actor::Admin(owner_id), employee_id).await?;
        let password_hash = self.hasher.hash(password)?;
        let audit = self.audit_entry(
            &current.employee,
            current.display_name(),
            AuditAction::Update,
            Some(owner_id),
            json!({"credentials_set": true, "username": username}),
            meta,
        );

        let employee = self
            .store
            .set_credentials(employee_id, username, &password_hash, audit)
            .await?;
        tracing::info!("Credentials set for employee {}", employee_id);

        Ok(EmployeeRecord { employee, ..current })
    }

    pub fn verify_credentials(&self, employee: &Employee, password: &str) -> EngineResult<bool> {
        match employee.password_hash.as_deref() {
            Some(hash) => self.hasher.verify(password, hash),
            None => Ok(false),
        }
    }

    /// Employee login. Unknown usernames and wrong passwords fail alike.
    pub async fn authenticate_employee(
        &self,
        username: &str,
        password: &str,
        meta: &RequestMeta,
    ) -> EngineResult<EmployeeRecord> {
        let employee = self.store.get_employee_by_username(username.trim()).await?;
        check_credentials(self.hasher.as_ref(), employee.as_ref(), password)?;
        let Some(employee) = employee else {
            return Err(EngineError::InvalidCredentials);
        };

        let now = self.now();
        self.store.record_login(employee.id, now).await?;

        let mut record = self.load(Actor::SelfService, employee.id).await?;
        record.employee.last_login_at = Some(now);
        let entry = self.audit_entry(
            &record.employee,
            record.display_name(),
            AuditAction::View,
            None,
            json!({"login": true}),
            meta,
        );
        self.record(entry).await;

        tracing::info!("Employee {} logged in", employee.id);
        Ok(record)
    }

    pub async fn change_password(
        &self,
        employee_id: i64,
        current_password: &str,
        new_password: &str,
        meta: &RequestMeta,
    ) -> EngineResult<()> {
        let current = self.load(Actor::SelfService, employee_id).await?;
        if !self.verify_credentials(&current.employee, current_password)? {
            return Err(EngineError::InvalidCredentials);
        }
        validate_password(new_password).map_err(|e| EngineError::validation(e.to_string()))?;

        let password_hash = self.hasher.hash(new_password)?;
        let audit = self.audit_entry(
            &current.employee,
            current.display_name(),
            AuditAction::Update,
            None,
            json!({"password_changed": true}),
            meta,
        );
        self.store
            .set_password_hash(employee_id, &password_hash, audit)
            .await?;
        tracing::info!("Employee {} changed their password", employee_id);
        Ok(())
    }
}

struct NewEmployeeParts {
    owner_id: Option<Uuid>,
    username: Option<String>,
    password_hash: Option<String>,
    is_active: bool,
    performed_by: Option<Uuid>,
    /// Overrides the default `{"created": true, "fields": [...]}` payload.
    changes: Option<JsonValue>,
}
