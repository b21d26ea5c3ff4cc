//! Search index query
//!
//! Terms are matched case-insensitively as substrings of an employee's text
//! values. Any term in any value is a hit; there is no ranking, results keep
//! the newest-first order of the employee listing.

use serde::Deserialize;
use uuid::Uuid;

use super::{Engine, EmployeeRecord, EngineResult};
use crate::store::EmployeeQuery;

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    /// One free-text term.
    pub search: Option<String>,
    /// Comma-separated terms, OR'd together.
    pub search_terms: Option<String>,
    pub template_id: Option<i64>,
    pub is_active: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl SearchParams {
    /// Trimmed, lowercased, de-duplicated terms from both parameters.
    pub fn terms(&self) -> Vec<String> {
        let single = self.search.iter().map(String::as_str);
        let listed = self
            .search_terms
            .iter()
            .flat_map(|terms| terms.split(','));

        let mut terms: Vec<String> = Vec::new();
        for term in single.chain(listed) {
            let term = term.trim().to_lowercase();
            if !term.is_empty() && !terms.contains(&term) {
                terms.push(term);
            }
        }
        terms
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }

    /// Rows to skip; a page past `i64::MAX` rows just comes back empty.
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.per_page())
    }
}

impl Engine {
    /// One page of the owner's employees matching `params`, plus the total.
    pub async fn search_employees(
        &self,
        owner_id: Uuid,
        params: &SearchParams,
    ) -> EngineResult<(Vec<EmployeeRecord>, i64)> {
        let query = EmployeeQuery {
            owner_id: Some(owner_id),
            template_id: params.template_id,
            is_active: params.is_active,
            terms: params.terms(),
            limit: params.per_page(),
            offset: params.offset(),
        };

        let (employees, total) = self.store.search_employees(&query).await?;
        tracing::debug!(
            "Search by {} with {} terms matched {} employees",
            owner_id,
            query.terms.len(),
            total
        );

        Ok((self.hydrate(employees).await?, total))
    }

    pub async fn dashboard_stats(&self, owner_id: Uuid) -> EngineResult<crate::models::DashboardStats> {
        Ok(self.store.dashboard_stats(owner_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{engine, onboarding};
    use crate::engine::RequestMeta;
    use crate::models::{CreateEmployee, DashboardStats};
    use serde_json::json;
    use std::collections::HashMap;

    async fn hire(engine: &Engine, owner: Uuid, template_id: i64, field_id: i64, name: &str) -> i64 {
        engine
            .create_employee(
                owner,
                CreateEmployee {
                    template_id,
                    field_values: HashMap::from([(field_id.to_string(), json!(name))]),
                    ..Default::default()
                },
                &RequestMeta::default(),
            )
            .await
            .unwrap()
            .employee
            .id
    }

    fn search(term: &str) -> SearchParams {
        SearchParams {
            search: Some(term.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_terms_parsing() {
        let params = SearchParams {
            search: Some("  Smith ".to_string()),
            search_terms: Some("doe, ,SMITH,jones".to_string()),
            ..Default::default()
        };
        assert_eq!(params.terms(), vec!["smith", "doe", "jones"]);
        assert!(SearchParams::default().terms().is_empty());
    }

    #[test]
    fn test_paging_is_clamped() {
        let params = SearchParams {
            page: Some(0),
            per_page: Some(1000),
            ..Default::default()
        };
        assert_eq!(params.page(), 1);
        assert_eq!(params.per_page(), MAX_PER_PAGE);
        assert_eq!(SearchParams::default().per_page(), DEFAULT_PER_PAGE);
    }

    #[tokio::test]
    async fn test_huge_page_is_empty_not_an_error() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let template = onboarding(&engine, owner).await;
        hire(&engine, owner, template.template.id, template.fields[0].id, "Jane").await;

        let params = SearchParams {
            page: Some(i64::MAX),
            per_page: Some(MAX_PER_PAGE),
            ..Default::default()
        };
        assert_eq!(params.offset(), i64::MAX);

        let (found, total) = engine.search_employees(owner, &params).await.unwrap();
        assert!(found.is_empty());
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_owner_scoped() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let template = onboarding(&engine, owner).await;
        let (t, f) = (template.template.id, template.fields[0].id);

        let jane = hire(&engine, owner, t, f, "Jane Smith").await;
        let john = hire(&engine, owner, t, f, "JOHN SMITHERS").await;
        hire(&engine, owner, t, f, "Mary Jones").await;

        let rival = Uuid::new_v4();
        let rival_template = onboarding(&engine, rival).await;
        hire(
            &engine,
            rival,
            rival_template.template.id,
            rival_template.fields[0].id,
            "Sam Smith",
        )
        .await;

        let (found, total) = engine.search_employees(owner, &search("smith")).await.unwrap();
        let ids: Vec<_> = found.iter().map(|r| r.employee.id).collect();
        assert_eq!(total, 2);
        assert_eq!(ids, vec![john, jane]);
        assert!(found
            .iter()
            .all(|r| r.display_name().to_lowercase().contains("smith")));
    }

    #[tokio::test]
    async fn test_terms_are_ored_and_filters_apply() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let a = onboarding(&engine, owner).await;
        let b = onboarding(&engine, owner).await;

        hire(&engine, owner, a.template.id, a.fields[0].id, "Jane Smith").await;
        let jones = hire(&engine, owner, b.template.id, b.fields[0].id, "Mary Jones").await;
        hire(&engine, owner, a.template.id, a.fields[0].id, "Ann Brown").await;

        let either = SearchParams {
            search_terms: Some("smith,jones".to_string()),
            ..Default::default()
        };
        let (_, total) = engine.search_employees(owner, &either).await.unwrap();
        assert_eq!(total, 2);

        let in_b = SearchParams {
            template_id: Some(b.template.id),
            ..either
        };
        let (found, total) = engine.search_employees(owner, &in_b).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].employee.id, jones);

        let inactive = SearchParams {
            is_active: Some(false),
            ..Default::default()
        };
        let (_, total) = engine.search_employees(owner, &inactive).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_search_pages() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let template = onboarding(&engine, owner).await;
        for i in 0..5 {
            hire(
                &engine,
                owner,
                template.template.id,
                template.fields[0].id,
                &format!("Smith {}", i),
            )
            .await;
        }

        let params = SearchParams {
            search: Some("smith".to_string()),
            page: Some(2),
            per_page: Some(2),
            ..Default::default()
        };
        let (found, total) = engine.search_employees(owner, &params).await.unwrap();
        assert_eq!(total, 5);
        let names: Vec<_> = found.iter().map(|r| r.display_name()).collect();
        assert_eq!(names, vec!["Smith 2", "Smith 1"]);
    }

    #[tokio::test]
    async fn test_dashboard_stats() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let template = onboarding(&engine, owner).await;
        let spare = onboarding(&engine, owner).await;
        hire(&engine, owner, template.template.id, template.fields[0].id, "Jane").await;
        engine.deactivate_template(owner, spare.template.id).await.unwrap();

        assert_eq!(
            engine.dashboard_stats(owner).await.unwrap(),
            DashboardStats {
                total_employees: 1,
                active_employees: 1,
                total_templates: 2,
                active_templates: 1,
            }
        );
    }
}
