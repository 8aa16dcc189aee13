//! Monthly fan page insights, one table per calendar year.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use super::endpoint::{render_template, Endpoint, EndpointConfig};
use crate::error::{HarvestError, Result};
use crate::harvest::{CollectionTask, CyclePlan, PagingRules};
use crate::http_client::TokenPlacement;
use crate::normalize::{MonthlyMetricNormalizer, NormalizeContext, RecordNormalizer};

pub const INSIGHTS_URL: &str = "https://graph.facebook.com/{page_id}/insights";

fn default_metrics() -> Vec<String> {
    vec![
        "page_impressions".to_string(),
        "page_impressions_unique".to_string(),
    ]
}

fn default_months_back() -> u32 {
    1
}

fn default_months() -> u32 {
    1
}

fn default_table_pattern() -> String {
    "{year}_monthly".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetricsJob {
    pub page_id: String,
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,
    /// First month to fetch, counted back from the current month.
    #[serde(default = "default_months_back")]
    pub months_back: u32,
    /// Number of consecutive months to fetch.
    #[serde(default = "default_months")]
    pub months: u32,
    #[serde(default = "default_table_pattern")]
    pub table_pattern: String,
}

/// One reporting month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportMonth {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportMonth {
    /// `YYYYMM`
    pub fn key(&self) -> String {
        self.start.format("%Y%m").to_string()
    }
}

/// Months `[today - back, today - back + count)`, oldest first.
pub fn report_months(today: NaiveDate, back: u32, count: u32) -> Result<Vec<ReportMonth>> {
    let out_of_range = || HarvestError::Config(format!("month range out of bounds ({} back)", back));
    let this_month = today.with_day(1).ok_or_else(out_of_range)?;
    let first = this_month
        .checked_sub_months(Months::new(back))
        .ok_or_else(out_of_range)?;

    (0..count)
        .map(|i| {
            let start = first
                .checked_add_months(Months::new(i))
                .ok_or_else(out_of_range)?;
            let end = start
                .checked_add_months(Months::new(1))
                .ok_or_else(out_of_range)?;
            Ok(ReportMonth { start, end })
        })
        .collect()
}

impl PageMetricsJob {
    pub fn validate(&self) -> Result<()> {
        if self.page_id.trim().is_empty() {
            return Err(HarvestError::Config("page_metrics job needs a page_id".into()));
        }
        if self.metrics.is_empty() {
            return Err(HarvestError::Config("page_metrics job needs at least one metric".into()));
        }
        Ok(())
    }

    /// Single-request endpoint: the whole insights body is one record.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            url: INSIGHTS_URL.to_string(),
            method: Default::default(),
            params: BTreeMap::new(),
            body: None,
            page_size: None,
            page_size_param: String::new(),
            paging: PagingRules {
                cursor_param: String::new(),
                cursor_path: String::new(),
                records_path: String::new(),
                token_placement: TokenPlacement::Query("access_token".to_string()),
            },
        }
        .param("metric", &self.metrics.join(","))
        .param("since", "{since}")
        .param("until", "{until}")
        .param("period", "total_over_range")
    }

    pub fn plan(
        &self,
        job: &str,
        overrides: Option<&EndpointConfig>,
        today: NaiveDate,
    ) -> Result<Vec<CyclePlan>> {
        let endpoint = self.endpoint().with_overrides(overrides)?;
        let normalizer: Arc<dyn RecordNormalizer> =
            Arc::new(MonthlyMetricNormalizer::new(self.metrics.clone()));

        let mut by_year: BTreeMap<i32, Vec<CollectionTask>> = BTreeMap::new();
        for month in report_months(today, self.months_back, self.months)? {
            let context = NormalizeContext::new()
                .with("page_id", self.page_id.as_str())
                .with("month", month.key())
                .with("year", month.start.year().to_string())
                .with("since", month.start.format("%Y-%m-%d").to_string())
                .with("until", month.end.format("%Y-%m-%d").to_string());
            let collection =
                endpoint.collection(&format!("insights {} {}", self.page_id, month.key()), &context)?;
            by_year
                .entry(month.start.year())
                .or_default()
                .push(CollectionTask {
                    collection,
                    context,
                });
        }

        by_year
            .into_iter()
            .map(|(year, tasks)| {
                let table = render_template(
                    &self.table_pattern,
                    &NormalizeContext::new().with("year", year.to_string()),
                )?;
                Ok(CyclePlan::new(job, table, normalizer.clone(), tasks))
            })
            .collect()
    }
}
