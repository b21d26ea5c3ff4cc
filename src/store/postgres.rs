//! Postgres-backed store.
//!
//! Every mutating method runs inside one transaction, so field values, the
//! employee row and its audit entry commit together. Uniqueness is left to
//! the database constraints; SQLSTATE `23505` is mapped by constraint name:
//!
//! | Constraint | StoreError |
//! |------------|------------|
//! | `form_fields_template_name_key` | `DuplicateFieldName` |
//! | `employees_username_key` | `DuplicateUsername` |
//!
//! A foreign key violation (`23503`) on insert means the parent row is gone
//! and surfaces as `NotFound`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::instrument;
use uuid::Uuid;

use super::*;

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_db_error(err: sqlx::Error, subject: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        match (db.code().as_deref(), db.constraint()) {
            (Some("23505"), Some("form_fields_template_name_key")) => {
                return StoreError::DuplicateFieldName(subject.to_string());
            }
            (Some("23505"), Some("employees_username_key")) => {
                return StoreError::DuplicateUsername(subject.to_string());
            }
            (Some("23503"), _) => return StoreError::NotFound,
            _ => {}
        }
    }
    StoreError::Database(err)
}

/// Escape LIKE metacharacters and wrap for a substring match.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

async fn insert_field(
    conn: &mut PgConnection,
    template_id: i64,
    field: &NewField,
) -> Result<FormField, StoreError> {
    sqlx::query_as::<_, FormField>(
        r#"
        INSERT INTO form_fields (
            template_id, name, label, field_type, is_required,
            placeholder, help_text, field_order, options, validation_rules, created_at
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7,
            COALESCE($8, (SELECT COUNT(*)::int FROM form_fields WHERE template_id = $1)),
            $9, $10, $11
        )
        RETURNING *
        "#,
    )
    .bind(template_id)
    .bind(&field.name)
    .bind(&field.label)
    .bind(field.field_type)
    .bind(field.is_required)
    .bind(&field.placeholder)
    .bind(&field.help_text)
    .bind(field.order)
    .bind(&field.options)
    .bind(&field.validation_rules)
    .bind(field.created_at)
    .fetch_one(conn)
    .await
    .map_err(|e| map_db_error(e, &field.name))
}

async fn upsert_values(
    conn: &mut PgConnection,
    employee_id: i64,
    values: &[FieldValueWrite],
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    for write in values {
        let (text, file) = write.columns();
        sqlx::query(
            r#"
            INSERT INTO employee_field_values (employee_id, field_id, value, file_value, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (employee_id, field_id) DO UPDATE SET
                value = EXCLUDED.value,
                file_value = EXCLUDED.file_value,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(employee_id)
        .bind(write.field_id)
        .bind(text)
        .bind(file)
        .bind(at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_db_error(e, "field value"))?;
    }
    Ok(())
}

async fn insert_audit(
    conn: &mut PgConnection,
    entry: &NewAuditEntry,
) -> Result<AuditEntry, StoreError> {
    let row = sqlx::query_as::<_, AuditEntry>(
        r#"
        INSERT INTO audit_log (
            employee_id, employee_uuid, employee_name, owner_id, action,
            performed_by, changes, ip_address, user_agent, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(entry.employee_id)
    .bind(entry.employee_uuid)
    .bind(&entry.employee_name)
    .bind(entry.owner_id)
    .bind(entry.action)
    .bind(entry.performed_by)
    .bind(&entry.changes)
    .bind(&entry.ip_address)
    .bind(&entry.user_agent)
    .bind(entry.created_at)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_template(
        &self,
        template: NewTemplate,
        fields: Vec<NewField>,
    ) -> Result<(FormTemplate, Vec<FormField>), StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, FormTemplate>(
            r#"
            INSERT INTO form_templates (name, description, owner_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING *
            "#,
        )
        .bind(&template.name)
        .bind(&template.description)
        .bind(template.owner_id)
        .bind(template.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_error(e, &template.name))?;

        let mut created = Vec::with_capacity(fields.len());
        for field in &fields {
            created.push(insert_field(&mut tx, row.id, field).await?);
        }

        tx.commit().await?;
        Ok((row, created))
    }

    async fn get_template(&self, id: i64) -> Result<Option<FormTemplate>, StoreError> {
        Ok(
            sqlx::query_as::<_, FormTemplate>("SELECT * FROM form_templates WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_templates(
        &self,
        owner_id: Option<Uuid>,
        active_only: bool,
    ) -> Result<Vec<FormTemplate>, StoreError> {
        Ok(sqlx::query_as::<_, FormTemplate>(
            r#"
            SELECT * FROM form_templates
            WHERE ($1::uuid IS NULL OR owner_id = $1)
              AND (NOT $2 OR is_active = true)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(owner_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn set_template_active(
        &self,
        id: i64,
        is_active: bool,
        at: DateTime<Utc>,
    ) -> Result<Option<FormTemplate>, StoreError> {
        Ok(sqlx::query_as::<_, FormTemplate>(
            "UPDATE form_templates SET is_active = $1, updated_at = $2 WHERE id = $3 RETURNING *",
        )
        .bind(is_active)
        .bind(at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn delete_template(&self, id: i64) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Bound employees cascade with the template, so their history goes too
        sqlx::query("SELECT set_config('hr_forms.purging_audit', 'on', true)")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM audit_log WHERE employee_id IN \
             (SELECT id FROM employees WHERE template_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("SELECT set_config('hr_forms.purging_audit', 'off', true)")
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM form_templates WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn list_fields(&self, template_id: i64) -> Result<Vec<FormField>, StoreError> {
        Ok(sqlx::query_as::<_, FormField>(
            "SELECT * FROM form_fields WHERE template_id = $1 ORDER BY field_order, created_at, id",
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_field(
        &self,
        template_id: i64,
        field: NewField,
    ) -> Result<FormField, StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_field(&mut conn, template_id, &field).await
    }

    async fn set_field_orders(
        &self,
        template_id: i64,
        orders: &[FieldOrder],
    ) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut applied = 0;

        for pairing in orders {
            let result = sqlx::query(
                "UPDATE form_fields SET field_order = $1 WHERE id = $2 AND template_id = $3",
            )
            .bind(pairing.order)
            .bind(pairing.id)
            .bind(template_id)
            .execute(&mut *tx)
            .await?;
            applied += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(applied)
    }

    async fn count_employees(&self, template_id: i64) -> Result<i64, StoreError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM employees WHERE template_id = $1")
                .bind(template_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    #[instrument(skip_all, fields(template_id = employee.template_id))]
    async fn insert_employee(
        &self,
        employee: NewEmployee,
        values: Vec<FieldValueWrite>,
        mut audit: NewAuditEntry,
    ) -> Result<Employee, StoreError> {
        let mut tx = self.pool.begin().await?;
        let username = employee.username.clone().unwrap_or_default();

        let row = sqlx::query_as::<_, Employee>(
            r#"
            INSERT INTO employees (
                employee_uuid, template_id, owner_id, username, password_hash,
                is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *
            "#,
        )
        .bind(employee.employee_uuid)
        .bind(employee.template_id)
        .bind(employee.owner_id)
        .bind(&employee.username)
        .bind(&employee.password_hash)
        .bind(employee.is_active)
        .bind(employee.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_error(e, &username))?;

        upsert_values(&mut tx, row.id, &values, employee.created_at).await?;

        audit.employee_id = row.id;
        insert_audit(&mut tx, &audit).await?;

        tx.commit().await?;
        Ok(row)
    }

    #[instrument(skip(self, patch, values, audit))]
    async fn update_employee(
        &self,
        id: i64,
        patch: EmployeePatch,
        values: Vec<FieldValueWrite>,
        audit: NewAuditEntry,
    ) -> Result<Employee, StoreError> {
        let at = patch.updated_at.unwrap_or(audit.created_at);
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, Employee>(
            r#"
            UPDATE employees
            SET is_active = COALESCE($1, is_active), updated_at = $2
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(patch.is_active)
        .bind(at)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        upsert_values(&mut tx, id, &values, at).await?;
        insert_audit(&mut tx, &audit).await?;

        tx.commit().await?;
        Ok(row)
    }

    #[instrument(skip(self, audit))]
    async fn delete_employee(&self, id: i64, audit: NewAuditEntry) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The append-only trigger lets this transaction purge earlier history
        sqlx::query("SELECT set_config('hr_forms.purging_audit', 'on', true)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM audit_log WHERE employee_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("SELECT set_config('hr_forms.purging_audit', 'off', true)")
            .execute(&mut *tx)
            .await?;

        // Values and sessions go with the row via ON DELETE CASCADE
        let deleted = sqlx::query("DELETE FROM employees WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Ok(false);
        }

        insert_audit(&mut tx, &audit).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn get_employee(&self, id: i64) -> Result<Option<Employee>, StoreError> {
        Ok(
            sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn get_employee_by_uuid(&self, uuid: Uuid) -> Result<Option<Employee>, StoreError> {
        Ok(
            sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE employee_uuid = $1")
                .bind(uuid)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn get_employee_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Employee>, StoreError> {
        Ok(
            sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_field_values(
        &self,
        employee_ids: &[i64],
    ) -> Result<Vec<EmployeeFieldValue>, StoreError> {
        if employee_ids.is_empty() {
            return Ok(vec![]);
        }
        Ok(sqlx::query_as::<_, EmployeeFieldValue>(
            "SELECT * FROM employee_field_values WHERE employee_id = ANY($1) ORDER BY id",
        )
        .bind(employee_ids)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn set_credentials(
        &self,
        id: i64,
        username: &str,
        password_hash: &str,
        audit: NewAuditEntry,
    ) -> Result<Employee, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, Employee>(
            r#"
            UPDATE employees
            SET username = $1, password_hash = $2, updated_at = $3
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(audit.created_at)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_db_error(e, username))?
        .ok_or(StoreError::NotFound)?;

        insert_audit(&mut tx, &audit).await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn set_password_hash(
        &self,
        id: i64,
        password_hash: &str,
        audit: NewAuditEntry,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE employees SET password_hash = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(password_hash)
        .bind(audit.created_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        insert_audit(&mut tx, &audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE employees SET last_login_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn search_employees(
        &self,
        query: &EmployeeQuery,
    ) -> Result<(Vec<Employee>, i64), StoreError> {
        const FILTER: &str = r#"
            WHERE ($1::uuid IS NULL OR e.owner_id = $1)
              AND ($2::bigint IS NULL OR e.template_id = $2)
              AND ($3::bool IS NULL OR e.is_active = $3)
              AND (
                cardinality($4::text[]) = 0
                OR EXISTS (
                    SELECT 1 FROM employee_field_values v
                    WHERE v.employee_id = e.id AND v.value ILIKE ANY($4)
                )
              )
        "#;

        let patterns: Vec<String> = query.terms.iter().map(|t| like_pattern(t)).collect();

        let rows = sqlx::query_as::<_, Employee>(&format!(
            "SELECT e.* FROM employees e {} ORDER BY e.created_at DESC, e.id DESC LIMIT $5 OFFSET $6",
            FILTER
        ))
        .bind(query.owner_id)
        .bind(query.template_id)
        .bind(query.is_active)
        .bind(&patterns)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM employees e {}", FILTER))
            .bind(query.owner_id)
            .bind(query.template_id)
            .bind(query.is_active)
            .bind(&patterns)
            .fetch_one(&self.pool)
            .await?;

        Ok((rows, total))
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_audit(&mut conn, &entry).await
    }

    async fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT * FROM audit_log
            WHERE ($1::uuid IS NULL OR owner_id = $1)
              AND ($2::audit_action IS NULL OR action = $2)
              AND ($3::bigint IS NULL OR employee_id = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
            ORDER BY created_at DESC, id DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(query.owner_id)
        .bind(query.action)
        .bind(query.employee_id)
        .bind(query.from)
        .bind(query.to)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn dashboard_stats(&self, owner_id: Uuid) -> Result<DashboardStats, StoreError> {
        let (total_employees, active_employees, total_templates, active_templates) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM employees WHERE owner_id = $1),
                    (SELECT COUNT(*) FROM employees WHERE owner_id = $1 AND is_active),
                    (SELECT COUNT(*) FROM form_templates WHERE owner_id = $1),
                    (SELECT COUNT(*) FROM form_templates WHERE owner_id = $1 AND is_active)
                "#,
            )
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(DashboardStats {
            total_employees,
            active_employees,
            total_templates,
            active_templates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("smith"), "%smith%");
        assert_eq!(like_pattern("50%"), "%50\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
    }
}
