//! Template store operations
//!
//! Every administrator operation is scoped to the calling owner: a template
//! owned by someone else is reported as not found.

use uuid::Uuid;
use validator::Validate;

use super::{Engine, EngineError, EngineResult};
use crate::models::{
    CreateTemplate, FieldOrder, FieldSpec, FormField, FormTemplate, TemplateResponse,
};
use crate::store::{NewField, NewTemplate};
use crate::validation::{describe_errors, validate_field_name};

impl Engine {
    /// Create a template, together with any initial fields, in one unit.
    pub async fn create_template(
        &self,
        owner_id: Uuid,
        input: CreateTemplate,
    ) -> EngineResult<TemplateResponse> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::validation("Name is required"));
        }
        input
            .validate()
            .map_err(|e| EngineError::ValidationFailed(describe_errors(&e)))?;

        let now = self.now();
        let fields = input
            .fields
            .into_iter()
            .map(|spec| self.new_field(spec))
            .collect::<EngineResult<Vec<_>>>()?;

        let (template, fields) = self
            .store
            .insert_template(
                NewTemplate {
                    name,
                    description: input.description.filter(|d| !d.trim().is_empty()),
                    owner_id,
                    created_at: now,
                },
                fields,
            )
            .await?;

        tracing::info!(
            "Template {} '{}' created by {} with {} fields",
            template.id,
            template.name,
            owner_id,
            fields.len()
        );

        Ok(TemplateResponse {
            template,
            fields,
            employee_count: 0,
        })
    }

    /// Append a field. Without an explicit order it goes after the last one.
    pub async fn add_field(
        &self,
        owner_id: Uuid,
        template_id: i64,
        spec: FieldSpec,
    ) -> EngineResult<FormField> {
        self.owned_template(owner_id, template_id).await?;
        spec.validate()
            .map_err(|e| EngineError::ValidationFailed(describe_errors(&e)))?;

        let field = self
            .store
            .insert_field(template_id, self.new_field(spec)?)
            .await?;
        tracing::info!(
            "Field {} '{}' added to template {} at order {}",
            field.id,
            field.name,
            template_id,
            field.order
        );
        Ok(field)
    }

    /// Apply each (field, order) pairing independently.
    ///
    /// Pairings naming a field outside the template are skipped. Siblings are
    /// not renumbered, so two fields may end up sharing an order; they then
    /// list in creation order.
    pub async fn reorder_fields(
        &self,
        owner_id: Uuid,
        template_id: i64,
        orders: &[FieldOrder],
    ) -> EngineResult<Vec<FormField>> {
        self.owned_template(owner_id, template_id).await?;

        let applied = self.store.set_field_orders(template_id, orders).await?;
        if applied < orders.len() {
            tracing::debug!(
                "Skipped {} unknown field ids while reordering template {}",
                orders.len() - applied,
                template_id
            );
        }

        Ok(self.store.list_fields(template_id).await?)
    }

    /// Soft delete. Employees bound to the template are untouched.
    pub async fn deactivate_template(
        &self,
        owner_id: Uuid,
        template_id: i64,
    ) -> EngineResult<FormTemplate> {
        self.owned_template(owner_id, template_id).await?;
        let template = self
            .store
            .set_template_active(template_id, false, self.now())
            .await?
            .ok_or(EngineError::NotFound("template"))?;
        tracing::info!("Template {} deactivated", template_id);
        Ok(template)
    }

    /// Hard delete; every bound employee goes with it, values and audit history included.
    pub async fn delete_template(&self, owner_id: Uuid, template_id: i64) -> EngineResult<()> {
        self.owned_template(owner_id, template_id).await?;
        let bound = self.store.count_employees(template_id).await?;

        if !self.store.delete_template(template_id).await? {
            return Err(EngineError::NotFound("template"));
        }
        if bound > 0 {
            tracing::warn!(
                "Template {} deleted together with {} employees",
                template_id,
                bound
            );
        } else {
            tracing::info!("Template {} deleted", template_id);
        }
        Ok(())
    }

    /// Active templates, newest first. `None` lists every owner's templates,
    /// which is what employee self-registration offers.
    pub async fn list_active_templates(
        &self,
        owner_id: Option<Uuid>,
    ) -> EngineResult<Vec<FormTemplate>> {
        Ok(self.store.list_templates(owner_id, true).await?)
    }

    /// All of an owner's templates, inactive ones included.
    pub async fn list_templates(&self, owner_id: Uuid) -> EngineResult<Vec<FormTemplate>> {
        Ok(self.store.list_templates(Some(owner_id), false).await?)
    }

    pub async fn get_template_detail(
        &self,
        owner_id: Uuid,
        template_id: i64,
    ) -> EngineResult<TemplateResponse> {
        let template = self.owned_template(owner_id, template_id).await?;
        self.detail(template).await
    }

    /// Detail of an active template, for self-registration forms.
    pub async fn get_public_template(&self, template_id: i64) -> EngineResult<TemplateResponse> {
        let template = self
            .store
            .get_template(template_id)
            .await?
            .filter(|t| t.is_active)
            .ok_or(EngineError::NotFound("template"))?;
        let mut detail = self.detail(template).await?;
        detail.employee_count = 0;
        Ok(detail)
    }

    async fn detail(&self, template: FormTemplate) -> EngineResult<TemplateResponse> {
        let fields = self.store.list_fields(template.id).await?;
        let employee_count = self.store.count_employees(template.id).await?;
        Ok(TemplateResponse {
            template,
            fields,
            employee_count,
        })
    }

    pub(crate) async fn owned_template(
        &self,
        owner_id: Uuid,
        template_id: i64,
    ) -> EngineResult<FormTemplate> {
        self.store
            .get_template(template_id)
            .await?
            .filter(|t| t.owner_id == owner_id)
            .ok_or(EngineError::NotFound("template"))
    }

    fn new_field(&self, spec: FieldSpec) -> EngineResult<NewField> {
        let name = spec.name.trim().to_string();
        validate_field_name(&name).map_err(|e| EngineError::validation(e.to_string()))?;
        if spec.label.trim().is_empty() {
            return Err(EngineError::validation("Label is required"));
        }

        Ok(NewField {
            name,
            label: spec.label.trim().to_string(),
            field_type: spec.field_type,
            is_required: spec.is_required,
            placeholder: spec.placeholder,
            help_text: spec.help_text,
            order: spec.order,
            options: spec.options,
            validation_rules: spec.validation_rules,
            created_at: self.now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::field_types::FieldType;
    use crate::engine::test_support::{engine, field, onboarding};
    use crate::engine::{Actor, AuditFilter, RequestMeta};
    use crate::models::{CreateEmployee, FieldOrder};
    use serde_json::json;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_create_template_with_fields() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let created = onboarding(&engine, owner).await;

        assert_eq!(created.template.name, "Onboarding");
        assert!(created.template.is_active);
        let orders: Vec<_> = created.fields.iter().map(|f| (f.name.as_str(), f.order)).collect();
        assert_eq!(orders, vec![("full_name", 0), ("photo", 1)]);
    }

    #[tokio::test]
    async fn test_blank_template_name_is_rejected() {
        let engine = engine();
        let err = engine
            .create_template(
                Uuid::new_v4(),
                CreateTemplate {
                    name: "   ".to_string(),
                    description: None,
                    fields: vec![],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ValidationFailed(ref m) if m == &vec!["Name is required".to_string()]));
    }

    #[tokio::test]
    async fn test_template_names_need_not_be_unique() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let a = onboarding(&engine, owner).await;
        let b = onboarding(&engine, owner).await;
        assert_ne!(a.template.id, b.template.id);
    }

    #[tokio::test]
    async fn test_duplicate_field_name_is_rejected() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let template = onboarding(&engine, owner).await;

        let err = engine
            .add_field(
                owner,
                template.template.id,
                field("full_name", "Legal Name", FieldType::Text, false),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateFieldName(ref n) if n == "full_name"));

        // Same name in a different template is fine
        let other = onboarding(&engine, owner).await;
        assert!(engine
            .add_field(
                owner,
                other.template.id,
                field("start_date", "Start Date", FieldType::Date, false),
            )
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_names_within_initial_fields() {
        let engine = engine();
        let err = engine
            .create_template(
                Uuid::new_v4(),
                CreateTemplate {
                    name: "Dupes".to_string(),
                    description: None,
                    fields: vec![
                        field("email", "Email", FieldType::Email, false),
                        field("email", "Work Email", FieldType::Email, false),
                    ],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateFieldName(_)));
    }

    #[tokio::test]
    async fn test_add_field_defaults_to_field_count() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let template = onboarding(&engine, owner).await;

        let added = engine
            .add_field(
                owner,
                template.template.id,
                field("department", "Department", FieldType::Select, false),
            )
            .await
            .unwrap();
        assert_eq!(added.order, 2);

        let mut explicit = field("badge", "Badge", FieldType::Text, false);
        explicit.order = Some(10);
        let added = engine.add_field(owner, template.template.id, explicit).await.unwrap();
        assert_eq!(added.order, 10);
    }

    #[tokio::test]
    async fn test_add_field_rejects_bad_name() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let template = onboarding(&engine, owner).await;
        let err = engine
            .add_field(
                owner,
                template.template.id,
                field("full name", "Full Name", FieldType::Text, false),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_reorder_skips_unknown_ids() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let template = onboarding(&engine, owner).await;
        let (name, photo) = (template.fields[0].id, template.fields[1].id);

        let fields = engine
            .reorder_fields(
                owner,
                template.template.id,
                &[
                    FieldOrder { id: photo, order: 0 },
                    FieldOrder { id: 999_999, order: 5 },
                    FieldOrder { id: name, order: 1 },
                ],
            )
            .await
            .unwrap();

        let ids: Vec<_> = fields.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![photo, name]);
    }

    #[tokio::test]
    async fn test_reorder_ignores_fields_of_other_templates() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let a = onboarding(&engine, owner).await;
        let b = onboarding(&engine, owner).await;

        engine
            .reorder_fields(
                owner,
                a.template.id,
                &[FieldOrder {
                    id: b.fields[0].id,
                    order: 42,
                }],
            )
            .await
            .unwrap();

        let b_fields = engine.get_template_detail(owner, b.template.id).await.unwrap().fields;
        assert_eq!(b_fields[0].order, 0);
    }

    #[tokio::test]
    async fn test_reorder_allows_duplicate_orders() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let template = onboarding(&engine, owner).await;
        let (name, photo) = (template.fields[0].id, template.fields[1].id);

        let fields = engine
            .reorder_fields(
                owner,
                template.template.id,
                &[
                    FieldOrder { id: photo, order: 3 },
                    FieldOrder { id: name, order: 3 },
                ],
            )
            .await
            .unwrap();

        // Shared order; creation order breaks the tie
        assert!(fields.iter().all(|f| f.order == 3));
        let ids: Vec<_> = fields.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![name, photo]);
    }

    #[tokio::test]
    async fn test_deactivate_hides_from_active_list() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let first = onboarding(&engine, owner).await;
        let second = onboarding(&engine, owner).await;

        let active = engine.list_active_templates(Some(owner)).await.unwrap();
        let ids: Vec<_> = active.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second.template.id, first.template.id]);

        let deactivated = engine.deactivate_template(owner, first.template.id).await.unwrap();
        assert!(!deactivated.is_active);

        let active = engine.list_active_templates(Some(owner)).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(engine.list_templates(owner).await.unwrap().len(), 2);
        assert!(matches!(
            engine.get_public_template(first.template.id).await,
            Err(EngineError::NotFound("template"))
        ));
    }

    #[tokio::test]
    async fn test_other_owners_templates_are_not_found() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let template = onboarding(&engine, owner).await;

        let stranger = Uuid::new_v4();
        assert!(matches!(
            engine.get_template_detail(stranger, template.template.id).await,
            Err(EngineError::NotFound("template"))
        ));
        assert!(matches!(
            engine.deactivate_template(stranger, template.template.id).await,
            Err(EngineError::NotFound("template"))
        ));
        assert!(engine.list_active_templates(Some(stranger)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_template() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let template = onboarding(&engine, owner).await;

        engine.delete_template(owner, template.template.id).await.unwrap();
        assert!(matches!(
            engine.get_template_detail(owner, template.template.id).await,
            Err(EngineError::NotFound("template"))
        ));
    }

    #[tokio::test]
    async fn test_delete_template_removes_bound_employee_history() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let template = onboarding(&engine, owner).await;
        let kept = onboarding(&engine, owner).await;

        let hire = |t: &TemplateResponse| CreateEmployee {
            template_id: t.template.id,
            field_values: HashMap::from([(t.fields[0].id.to_string(), json!("Jane Smith"))]),
            ..Default::default()
        };
        let doomed = engine
            .create_employee(owner, hire(&template), &RequestMeta::default())
            .await
            .unwrap()
            .employee
            .id;
        let survivor = engine
            .create_employee(owner, hire(&kept), &RequestMeta::default())
            .await
            .unwrap()
            .employee
            .id;

        engine.delete_template(owner, template.template.id).await.unwrap();

        assert!(matches!(
            engine.get_employee(Actor::Admin(owner), doomed).await,
            Err(EngineError::NotFound(_))
        ));
        let history = engine
            .list_audit(
                owner,
                AuditFilter {
                    employee_id: Some(doomed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(history.is_empty());

        let entries = engine.list_audit(owner, AuditFilter::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].employee_id, survivor);
    }
}
