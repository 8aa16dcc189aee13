//! Harvest jobs.
//!
//! A job is one `[[jobs]]` entry of the configuration. Planning expands it
//! into the cycles that actually run: every cycle owns one destination table
//! and the collections feeding it.

mod endpoint;
mod locations;
mod page_metrics;
mod permissions;
mod reviews;

pub use endpoint::{render_template, Endpoint, EndpointConfig, EndpointMethod};
pub use locations::LocationsJob;
pub use page_metrics::{report_months, PageMetricsJob, ReportMonth};
pub use permissions::{DriveFile, PermissionsJob};
pub use reviews::ReviewsJob;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HarvestError, Result};
use crate::harvest::CyclePlan;
use crate::sink::TableStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    Locations(LocationsJob),
    Reviews(ReviewsJob),
    PageMetrics(PageMetricsJob),
    Permissions(PermissionsJob),
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Locations(_) => "locations",
            JobKind::Reviews(_) => "reviews",
            JobKind::PageMetrics(_) => "page_metrics",
            JobKind::Permissions(_) => "permissions",
        }
    }
}

/// One `[[jobs]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: JobKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointConfig>,
}

/// What planning may consult besides the job itself.
#[derive(Clone)]
pub struct PlanEnv {
    pub store: Arc<dyn TableStore>,
    /// Reference date for month ranges.
    pub today: NaiveDate,
}

impl JobConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(HarvestError::Config("job without a name".into()));
        }
        match self.kind {
            JobKind::Locations(ref job) => job.validate(),
            JobKind::Reviews(_) => Ok(()),
            JobKind::PageMetrics(ref job) => job.validate(),
            JobKind::Permissions(ref job) => job.validate(),
        }
        .map_err(|e| match e {
            HarvestError::Config(msg) => HarvestError::Config(format!("job '{}': {}", self.name, msg)),
            other => other,
        })
    }

    /// Expand into cycles.
    pub async fn plan(&self, env: &PlanEnv) -> Result<Vec<CyclePlan>> {
        let overrides = self.endpoint.as_ref();
        let plans = match self.kind {
            JobKind::Locations(ref job) => job.plan(&self.name, overrides)?,
            JobKind::Reviews(ref job) => job.plan(&self.name, overrides, env.store.as_ref()).await?,
            JobKind::PageMetrics(ref job) => job.plan(&self.name, overrides, env.today)?,
            JobKind::Permissions(ref job) => job.plan(&self.name, overrides)?,
        };
        debug!("job '{}' expands to {} cycle(s)", self.name, plans.len());
        Ok(plans)
    }
}

/// Reject duplicate job names and invalid jobs.
pub fn validate_jobs(jobs: &[JobConfig]) -> Result<()> {
    let mut seen = HashSet::new();
    for job in jobs {
        job.validate()?;
        if !seen.insert(job.name.as_str()) {
            return Err(HarvestError::Config(format!("duplicate job name '{}'", job.name)));
        }
    }
    Ok(())
}

/// Pick jobs by name, or all of them.
pub fn select_jobs<'a>(jobs: &'a [JobConfig], names: &[String]) -> Result<Vec<&'a JobConfig>> {
    if names.is_empty() {
        return Ok(jobs.iter().collect());
    }
    names
        .iter()
        .map(|name| {
            jobs.iter()
                .find(|j| &j.name == name)
                .ok_or_else(|| HarvestError::Config(format!("no job named '{}'", name)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::TokenPlacement;
    use crate::sink::{MemoryTableStore, ReplaceScope, Table};

    fn parse(toml_src: &str) -> Vec<JobConfig> {
        #[derive(Deserialize)]
        struct Jobs {
            jobs: Vec<JobConfig>,
        }
        toml::from_str::<Jobs>(toml_src).unwrap().jobs
    }

    fn env(store: Arc<MemoryTableStore>) -> PlanEnv {
        PlanEnv {
            store,
            today: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        }
    }

    #[test]
    fn test_parse_jobs() {
        let jobs = parse(
            r#"
            [[jobs]]
            name = "stores"
            kind = "locations"
            accounts = ["accounts/1"]

            [[jobs]]
            name = "fanpage"
            kind = "page_metrics"
            page_id = "42"
            months_back = 2
            months = 2

            [[jobs]]
            name = "sheets"
            kind = "permissions"
            files = [{ id = "abc", name = "budget" }]

            [jobs.endpoint]
            page_size = 10
            "#,
        );

        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].kind.as_str(), "locations");
        match jobs[1].kind {
            JobKind::PageMetrics(ref job) => {
                assert_eq!(job.months_back, 2);
                assert_eq!(job.table_pattern, "{year}_monthly");
            }
            ref other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(jobs[2].endpoint.as_ref().unwrap().page_size, Some(10));
        validate_jobs(&jobs).unwrap();
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        #[derive(Deserialize)]
        #[allow(dead_code)]
        struct Jobs {
            jobs: Vec<JobConfig>,
        }
        let parsed = toml::from_str::<Jobs>(
            r#"
            [[jobs]]
            name = "x"
            kind = "tweets"
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_empty() {
        let jobs = parse(
            r#"
            [[jobs]]
            name = "a"
            kind = "reviews"

            [[jobs]]
            name = "a"
            kind = "reviews"
            "#,
        );
        assert!(matches!(validate_jobs(&jobs), Err(HarvestError::Config(_))));

        let empty = parse(
            r#"
            [[jobs]]
            name = "stores"
            kind = "locations"
            accounts = []
            "#,
        );
        assert!(matches!(validate_jobs(&empty), Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_select_jobs() {
        let jobs = parse(
            r#"
            [[jobs]]
            name = "a"
            kind = "reviews"

            [[jobs]]
            name = "b"
            kind = "reviews"
            "#,
        );
        assert_eq!(select_jobs(&jobs, &[]).unwrap().len(), 2);
        let picked = select_jobs(&jobs, &["b".to_string()]).unwrap();
        assert_eq!(picked[0].name, "b");
        assert!(select_jobs(&jobs, &["c".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_plan_locations() {
        let jobs = parse(
            r#"
            [[jobs]]
            name = "stores"
            kind = "locations"
            accounts = ["accounts/1", "accounts/2"]
            "#,
        );
        let plans = jobs[0].plan(&env(Arc::new(MemoryTableStore::new()))).await.unwrap();

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].table.name, "locations");
        assert_eq!(plans[0].table.key_column, "storeCode");
        assert_eq!(plans[0].tasks.len(), 2);
        assert_eq!(
            plans[0].tasks[1].collection.request.url,
            "https://mybusinessbusinessinformation.googleapis.com/v1/accounts/2/locations"
        );
        assert_eq!(plans[0].tasks[1].context.get("account"), Some("accounts/2"));
    }

    #[tokio::test]
    async fn test_plan_reviews_reads_locations_table() {
        let store = Arc::new(MemoryTableStore::new());
        store
            .insert(
                "locations",
                Table {
                    columns: vec!["account".into(), "name".into(), "storeCode".into()],
                    rows: vec![
                        vec!["accounts/1".into(), "locations/10".into(), "S1".into()],
                        vec!["accounts/1".into(), "".into(), "S2".into()],
                    ],
                },
            )
            .await;
        let jobs = parse(
            r#"
            [[jobs]]
            name = "reviews"
            kind = "reviews"
            "#,
        );
        let plans = jobs[0].plan(&env(store)).await.unwrap();

        let tables: Vec<&str> = plans.iter().map(|p| p.table.name.as_str()).collect();
        assert_eq!(tables, vec!["reviews_detail", "reviews_summ"]);
        assert_eq!(plans[0].tasks.len(), 1);
        let task = &plans[0].tasks[0];
        assert_eq!(
            task.collection.request.url,
            "https://mybusiness.googleapis.com/v4/accounts/1/locations/10/reviews"
        );
        assert_eq!(task.context.get("storeCode"), Some("S1"));

        let summary = &plans[1].tasks[0];
        assert_eq!(summary.collection.request.url, task.collection.request.url);
        assert_eq!(plans[1].table.key_column, "storeCode");
        assert_eq!(summary.collection.paging.records_path, "");
        assert_eq!(summary.collection.paging.cursor_path, "");
        assert!(summary
            .collection
            .request
            .query
            .contains(&("pageSize".to_string(), "1".to_string())));
    }

    #[tokio::test]
    async fn test_plan_reviews_one_cycle_per_store() {
        let store = Arc::new(MemoryTableStore::new());
        store
            .insert(
                "locations",
                Table {
                    columns: vec!["account".into(), "name".into(), "storeCode".into()],
                    rows: vec![
                        vec!["accounts/1".into(), "locations/10".into(), "S1".into()],
                        vec!["accounts/1".into(), "locations/11".into(), "S2".into()],
                    ],
                },
            )
            .await;
        let jobs = parse(
            r#"
            [[jobs]]
            name = "reviews"
            kind = "reviews"
            summary_table = ""
            "#,
        );
        let plans = jobs[0].plan(&env(store)).await.unwrap();

        assert_eq!(plans.len(), 2);
        assert!(plans.iter().all(|p| p.table.name == "reviews_detail"));
        assert_eq!(plans[0].tasks[0].context.get("storeCode"), Some("S1"));
        assert_eq!(plans[1].tasks[0].context.get("storeCode"), Some("S2"));
    }

    #[tokio::test]
    async fn test_plan_reviews_without_locations_is_empty() {
        let jobs = parse(
            r#"
            [[jobs]]
            name = "reviews"
            kind = "reviews"
            "#,
        );
        let plans = jobs[0]
            .plan(&env(Arc::new(MemoryTableStore::new())))
            .await
            .unwrap();
        assert!(plans.is_empty());
    }

    #[tokio::test]
    async fn test_plan_page_metrics_groups_by_year() {
        let jobs = parse(
            r#"
            [[jobs]]
            name = "fanpage"
            kind = "page_metrics"
            page_id = "42"
            months_back = 2
            months = 3
            "#,
        );
        let plans = jobs[0]
            .plan(&env(Arc::new(MemoryTableStore::new())))
            .await
            .unwrap();

        let tables: Vec<&str> = plans.iter().map(|p| p.table.name.as_str()).collect();
        assert_eq!(tables, vec!["2023_monthly", "2024_monthly"]);
        assert_eq!(plans[0].table.key_column, "month");

        let request = &plans[0].tasks[0].collection.request;
        assert_eq!(request.url, "https://graph.facebook.com/42/insights");
        assert!(request
            .query
            .contains(&("since".to_string(), "2023-11-01".to_string())));
        assert!(request
            .query
            .contains(&("until".to_string(), "2023-12-01".to_string())));
        assert_eq!(
            plans[0].tasks[0].collection.paging.token_placement,
            TokenPlacement::Query("access_token".into())
        );
        assert_eq!(plans[0].tasks[1].context.get("month"), Some("202312"));
        assert_eq!(plans[1].tasks[0].context.get("month"), Some("202401"));
    }

    #[tokio::test]
    async fn test_plan_permissions_one_cycle_per_file() {
        let jobs = parse(
            r#"
            [[jobs]]
            name = "sheets"
            kind = "permissions"
            files = [
                { id = "abc", name = "budget" },
                { id = "def", name = "roster", table = "roster_acl" },
            ]
            "#,
        );
        let plans = jobs[0]
            .plan(&env(Arc::new(MemoryTableStore::new())))
            .await
            .unwrap();

        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].table.name, "budget_permissions");
        assert_eq!(plans[1].table.name, "roster_acl");
        assert_eq!(
            plans[1].replace_scope,
            Some(ReplaceScope::new("fileId", "def"))
        );
        assert_eq!(
            plans[0].tasks[0].collection.request.url,
            "https://www.googleapis.com/drive/v3/files/abc/permissions"
        );
    }

    #[tokio::test]
    async fn test_unresolved_override_placeholder() {
        let jobs = parse(
            r#"
            [[jobs]]
            name = "stores"
            kind = "locations"
            accounts = ["accounts/1"]

            [jobs.endpoint]
            url = "https://example.com/{tenant}/locations"
            "#,
        );
        let err = jobs[0]
            .plan(&env(Arc::new(MemoryTableStore::new())))
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }
}
