//! In-memory store used by the test suite.
//!
//! One write lock per call gives every method the same all-or-nothing
//! behaviour the Postgres store gets from a transaction.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::*;

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    templates: Vec<FormTemplate>,
    fields: Vec<FormField>,
    employees: Vec<Employee>,
    values: Vec<EmployeeFieldValue>,
    audit: Vec<AuditEntry>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn field(&mut self, template_id: i64, field: NewField) -> Result<FormField, StoreError> {
        if self
            .fields
            .iter()
            .any(|f| f.template_id == template_id && f.name == field.name)
        {
            return Err(StoreError::DuplicateFieldName(field.name));
        }

        let order = match field.order {
            Some(order) => order,
            None => self.fields.iter().filter(|f| f.template_id == template_id).count() as i32,
        };

        let row = FormField {
            id: self.next_id(),
            template_id,
            name: field.name,
            label: field.label,
            field_type: field.field_type,
            is_required: field.is_required,
            placeholder: field.placeholder,
            help_text: field.help_text,
            order,
            options: field.options,
            validation_rules: field.validation_rules,
            created_at: field.created_at,
        };
        self.fields.push(row.clone());
        Ok(row)
    }

    fn username_taken(&self, username: &str, except: Option<i64>) -> bool {
        self.employees
            .iter()
            .any(|e| e.username.as_deref() == Some(username) && Some(e.id) != except)
    }

    fn upsert_values(&mut self, employee_id: i64, values: Vec<FieldValueWrite>, at: DateTime<Utc>) {
        for write in values {
            let (text, file) = write.columns();
            let (text, file) = (text.map(str::to_string), file.map(str::to_string));

            if let Some(existing) = self
                .values
                .iter_mut()
                .find(|v| v.employee_id == employee_id && v.field_id == write.field_id)
            {
                existing.value = text;
                existing.file_value = file;
                existing.updated_at = at;
                continue;
            }

            let id = self.next_id();
            self.values.push(EmployeeFieldValue {
                id,
                employee_id,
                field_id: write.field_id,
                value: text,
                file_value: file,
                created_at: at,
                updated_at: at,
            });
        }
    }

    fn audit(&mut self, entry: NewAuditEntry) -> AuditEntry {
        let row = AuditEntry {
            id: self.next_id(),
            employee_id: entry.employee_id,
            employee_uuid: entry.employee_uuid,
            employee_name: entry.employee_name,
            owner_id: entry.owner_id,
            action: entry.action,
            performed_by: entry.performed_by,
            changes: entry.changes,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            created_at: entry.created_at,
        };
        self.audit.push(row.clone());
        row
    }

    fn employee_mut(&mut self, id: i64) -> Result<&mut Employee, StoreError> {
        self.employees
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::NotFound)
    }
}

/// In-memory implementation of [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, i64)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_template(
        &self,
        template: NewTemplate,
        fields: Vec<NewField>,
    ) -> Result<(FormTemplate, Vec<FormField>), StoreError> {
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = fields.iter().find(|f| !seen.insert(f.name.as_str())) {
            return Err(StoreError::DuplicateFieldName(dup.name.clone()));
        }

        let mut state = self.write()?;
        let row = FormTemplate {
            id: state.next_id(),
            name: template.name,
            description: template.description,
            owner_id: template.owner_id,
            is_active: true,
            created_at: template.created_at,
            updated_at: template.created_at,
        };
        state.templates.push(row.clone());

        let created = fields
            .into_iter()
            .map(|field| state.field(row.id, field))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((row, created))
    }

    async fn get_template(&self, id: i64) -> Result<Option<FormTemplate>, StoreError> {
        Ok(self.read()?.templates.iter().find(|t| t.id == id).cloned())
    }

    async fn list_templates(
        &self,
        owner_id: Option<Uuid>,
        active_only: bool,
    ) -> Result<Vec<FormTemplate>, StoreError> {
        let mut templates: Vec<FormTemplate> = self
            .read()?
            .templates
            .iter()
            .filter(|t| owner_id.map_or(true, |o| t.owner_id == o))
            .filter(|t| !active_only || t.is_active)
            .cloned()
            .collect();
        newest_first(&mut templates, |t| (t.created_at, t.id));
        Ok(templates)
    }

    async fn set_template_active(
        &self,
        id: i64,
        is_active: bool,
        at: DateTime<Utc>,
    ) -> Result<Option<FormTemplate>, StoreError> {
        let mut state = self.write()?;
        Ok(state.templates.iter_mut().find(|t| t.id == id).map(|t| {
            t.is_active = is_active;
            t.updated_at = at;
            t.clone()
        }))
    }

    async fn delete_template(&self, id: i64) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        let before = state.templates.len();
        state.templates.retain(|t| t.id != id);
        if state.templates.len() == before {
            return Ok(false);
        }

        state.fields.retain(|f| f.template_id != id);
        let doomed: Vec<i64> = state
            .employees
            .iter()
            .filter(|e| e.template_id == id)
            .map(|e| e.id)
            .collect();
        state.employees.retain(|e| e.template_id != id);
        state.values.retain(|v| !doomed.contains(&v.employee_id));
        state.audit.retain(|a| !doomed.contains(&a.employee_id));
        Ok(true)
    }

    async fn list_fields(&self, template_id: i64) -> Result<Vec<FormField>, StoreError> {
        let mut fields: Vec<FormField> = self
            .read()?
            .fields
            .iter()
            .filter(|f| f.template_id == template_id)
            .cloned()
            .collect();
        fields.sort_by_key(|f| (f.order, f.created_at, f.id));
        Ok(fields)
    }

    async fn insert_field(
        &self,
        template_id: i64,
        field: NewField,
    ) -> Result<FormField, StoreError> {
        let mut state = self.write()?;
        if !state.templates.iter().any(|t| t.id == template_id) {
            return Err(StoreError::NotFound);
        }
        state.field(template_id, field)
    }

    async fn set_field_orders(
        &self,
        template_id: i64,
        orders: &[FieldOrder],
    ) -> Result<usize, StoreError> {
        let mut state = self.write()?;
        let mut applied = 0;
        for pairing in orders {
            if let Some(field) = state
                .fields
                .iter_mut()
                .find(|f| f.id == pairing.id && f.template_id == template_id)
            {
                field.order = pairing.order;
                applied += 1;
            }
        }
        Ok(applied)
    }

    async fn count_employees(&self, template_id: i64) -> Result<i64, StoreError> {
        Ok(self
            .read()?
            .employees
            .iter()
            .filter(|e| e.template_id == template_id)
            .count() as i64)
    }

    async fn insert_employee(
        &self,
        employee: NewEmployee,
        values: Vec<FieldValueWrite>,
        mut audit: NewAuditEntry,
    ) -> Result<Employee, StoreError> {
        let mut state = self.write()?;

        if !state.templates.iter().any(|t| t.id == employee.template_id) {
            return Err(StoreError::NotFound);
        }
        if let Some(username) = &employee.username {
            if state.username_taken(username, None) {
                return Err(StoreError::DuplicateUsername(username.clone()));
            }
        }

        let row = Employee {
            id: state.next_id(),
            employee_uuid: employee.employee_uuid,
            template_id: employee.template_id,
            owner_id: employee.owner_id,
            username: employee.username,
            password_hash: employee.password_hash,
            is_login_active: true,
            last_login_at: None,
            is_active: employee.is_active,
            created_at: employee.created_at,
            updated_at: employee.created_at,
        };
        state.employees.push(row.clone());
        state.upsert_values(row.id, values, employee.created_at);

        audit.employee_id = row.id;
        state.audit(audit);
        Ok(row)
    }

    async fn update_employee(
        &self,
        id: i64,
        patch: EmployeePatch,
        values: Vec<FieldValueWrite>,
        audit: NewAuditEntry,
    ) -> Result<Employee, StoreError> {
        let mut state = self.write()?;
        let at = patch.updated_at.unwrap_or(audit.created_at);

        let employee = state.employee_mut(id)?;
        if let Some(active) = patch.is_active {
            employee.is_active = active;
        }
        employee.updated_at = at;
        let updated = employee.clone();

        state.upsert_values(id, values, at);
        state.audit(audit);
        Ok(updated)
    }

    async fn delete_employee(&self, id: i64, audit: NewAuditEntry) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        if !state.employees.iter().any(|e| e.id == id) {
            return Ok(false);
        }

        state.values.retain(|v| v.employee_id != id);
        state.audit.retain(|a| a.employee_id != id);
        state.employees.retain(|e| e.id != id);
        state.audit(audit);
        Ok(true)
    }

    async fn get_employee(&self, id: i64) -> Result<Option<Employee>, StoreError> {
        Ok(self.read()?.employees.iter().find(|e| e.id == id).cloned())
    }

    async fn get_employee_by_uuid(&self, uuid: Uuid) -> Result<Option<Employee>, StoreError> {
        Ok(self
            .read()?
            .employees
            .iter()
            .find(|e| e.employee_uuid == uuid)
            .cloned())
    }

    async fn get_employee_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Employee>, StoreError> {
        Ok(self
            .read()?
            .employees
            .iter()
            .find(|e| e.username.as_deref() == Some(username))
            .cloned())
    }

    async fn list_field_values(
        &self,
        employee_ids: &[i64],
    ) -> Result<Vec<EmployeeFieldValue>, StoreError> {
        Ok(self
            .read()?
            .values
            .iter()
            .filter(|v| employee_ids.contains(&v.employee_id))
            .cloned()
            .collect())
    }

    async fn set_credentials(
        &self,
        id: i64,
        username: &str,
        password_hash: &str,
        audit: NewAuditEntry,
    ) -> Result<Employee, StoreError> {
        let mut state = self.write()?;
        if state.username_taken(username, Some(id)) {
            return Err(StoreError::DuplicateUsername(username.to_string()));
        }

        let employee = state.employee_mut(id)?;
        employee.username = Some(username.to_string());
        employee.password_hash = Some(password_hash.to_string());
        employee.updated_at = audit.created_at;
        let updated = employee.clone();

        state.audit(audit);
        Ok(updated)
    }

    async fn set_password_hash(
        &self,
        id: i64,
        password_hash: &str,
        audit: NewAuditEntry,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let employee = state.employee_mut(id)?;
        employee.password_hash = Some(password_hash.to_string());
        employee.updated_at = audit.created_at;
        state.audit(audit);
        Ok(())
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.employee_mut(id)?.last_login_at = Some(at);
        Ok(())
    }

    async fn search_employees(
        &self,
        query: &EmployeeQuery,
    ) -> Result<(Vec<Employee>, i64), StoreError> {
        let state = self.read()?;

        let mut matches: Vec<Employee> = state
            .employees
            .iter()
            .filter(|e| query.owner_id.map_or(true, |o| e.owner_id == Some(o)))
            .filter(|e| query.template_id.map_or(true, |t| e.template_id == t))
            .filter(|e| query.is_active.map_or(true, |a| e.is_active == a))
            .filter(|e| {
                query.terms.is_empty()
                    || state.values.iter().any(|v| {
                        v.employee_id == e.id
                            && v.value.as_deref().is_some_and(|text| {
                                let text = text.to_lowercase();
                                query.terms.iter().any(|term| text.contains(term.as_str()))
                            })
                    })
            })
            .cloned()
            .collect();
        newest_first(&mut matches, |e| (e.created_at, e.id));

        let total = matches.len() as i64;
        let page = matches
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        Ok(self.write()?.audit(entry))
    }

    async fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, StoreError> {
        let mut entries: Vec<AuditEntry> = self
            .read()?
            .audit
            .iter()
            .filter(|a| query.owner_id.map_or(true, |o| a.owner_id == Some(o)))
            .filter(|a| query.action.map_or(true, |act| a.action == act))
            .filter(|a| query.employee_id.map_or(true, |id| a.employee_id == id))
            .filter(|a| query.from.map_or(true, |from| a.created_at >= from))
            .filter(|a| query.to.map_or(true, |to| a.created_at <= to))
            .cloned()
            .collect();
        newest_first(&mut entries, |a| (a.created_at, a.id));

        Ok(entries
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect())
    }

    async fn dashboard_stats(&self, owner_id: Uuid) -> Result<DashboardStats, StoreError> {
        let state = self.read()?;
        let employees = state.employees.iter().filter(|e| e.owner_id == Some(owner_id));
        let templates = state.templates.iter().filter(|t| t.owner_id == owner_id);

        Ok(DashboardStats {
            total_employees: employees.clone().count() as i64,
            active_employees: employees.filter(|e| e.is_active).count() as i64,
            total_templates: templates.clone().count() as i64,
            active_templates: templates.filter(|t| t.is_active).count() as i64,
        })
    }
}
