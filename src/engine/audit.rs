//! Audit recorder
//!
//! Mutations hand their entry to the store so it commits with the rows it
//! describes; a failed audit write fails the mutation. `view` entries are not
//! tied to any write and are recorded best-effort: failures are logged and
//! the read still succeeds.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{Engine, EngineResult};
use crate::models::{AuditAction, AuditEntry, Employee};
use crate::store::{AuditQuery, NewAuditEntry};

pub const DEFAULT_AUDIT_LIMIT: i64 = 100;
pub const MAX_AUDIT_LIMIT: i64 = 100;

/// Request metadata copied onto audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    pub employee_id: Option<i64>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Engine {
    pub(crate) fn audit_entry(
        &self,
        employee: &Employee,
        employee_name: String,
        action: AuditAction,
        performed_by: Option<Uuid>,
        changes: JsonValue,
        meta: &RequestMeta,
    ) -> NewAuditEntry {
        NewAuditEntry {
            employee_id: employee.id,
            employee_uuid: employee.employee_uuid,
            employee_name,
            owner_id: employee.owner_id,
            action,
            performed_by,
            changes,
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
            created_at: self.now(),
        }
    }

    /// Append an entry outside any mutation. Never fails the caller.
    pub(crate) async fn record(&self, entry: NewAuditEntry) {
        let (employee_id, action) = (entry.employee_id, entry.action);
        if let Err(e) = self.store.append_audit(entry).await {
            tracing::warn!(
                "Failed to record {:?} audit entry for employee {}: {}",
                action,
                employee_id,
                e
            );
        }
    }

    /// Audit history of the owner's employees, newest first.
    pub async fn list_audit(&self, owner_id: Uuid, filter: AuditFilter) -> EngineResult<Vec<AuditEntry>> {
        let query = AuditQuery {
            owner_id: Some(owner_id),
            action: filter.action,
            employee_id: filter.employee_id,
            from: filter.from,
            to: filter.to,
            limit: filter
                .limit
                .unwrap_or(DEFAULT_AUDIT_LIMIT)
                .clamp(1, MAX_AUDIT_LIMIT),
            offset: filter.offset.unwrap_or(0).max(0),
        };
        Ok(self.store.list_audit(&query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{engine, onboarding};
    use crate::engine::Actor;
    use crate::models::{CreateEmployee, UpdateEmployee};
    use serde_json::json;
    use std::collections::HashMap;

    fn meta() -> RequestMeta {
        RequestMeta {
            ip_address: Some("10.0.0.7".to_string()),
            user_agent: Some("curl/8".to_string()),
        }
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_filtered() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let template = onboarding(&engine, owner).await;
        let name_id = template.fields[0].id;

        let created = engine
            .create_employee(
                owner,
                CreateEmployee {
                    template_id: template.template.id,
                    field_values: HashMap::from([(name_id.to_string(), json!("Jane Doe"))]),
                    ..Default::default()
                },
                &meta(),
            )
            .await
            .unwrap();
        let id = created.employee.id;

        engine
            .update_employee(
                Actor::Admin(owner),
                id,
                UpdateEmployee {
                    field_values: HashMap::from([(name_id.to_string(), json!("Jane Smith"))]),
                    ..Default::default()
                },
                &meta(),
            )
            .await
            .unwrap();
        engine.view_employee(Actor::Admin(owner), id, &meta()).await.unwrap();

        let all = engine.list_audit(owner, AuditFilter::default()).await.unwrap();
        let actions: Vec<_> = all.iter().map(|a| a.action).collect();
        assert_eq!(
            actions,
            vec![AuditAction::View, AuditAction::Update, AuditAction::Create]
        );
        assert_eq!(all[0].ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(all[1].changes["old_values"]["full_name"], json!("Jane Doe"));

        let updates = engine
            .list_audit(
                owner,
                AuditFilter {
                    action: Some(AuditAction::Update),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updates.len(), 1);

        let window = engine
            .list_audit(
                owner,
                AuditFilter {
                    from: Some(all[1].created_at),
                    to: Some(all[1].created_at),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].action, AuditAction::Update);

        let limited = engine
            .list_audit(
                owner,
                AuditFilter {
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].action, AuditAction::View);
    }

    #[tokio::test]
    async fn test_history_is_scoped_to_owner() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let template = onboarding(&engine, owner).await;
        engine
            .create_employee(
                owner,
                CreateEmployee {
                    template_id: template.template.id,
                    field_values: HashMap::from([(
                        template.fields[0].id.to_string(),
                        json!("Jane Doe"),
                    )]),
                    ..Default::default()
                },
                &RequestMeta::default(),
            )
            .await
            .unwrap();

        let other = engine
            .list_audit(Uuid::new_v4(), AuditFilter::default())
            .await
            .unwrap();
        assert!(other.is_empty());
    }
}
