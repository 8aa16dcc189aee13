//! Reviews for every stored location.
//!
//! Each store gets its own cycles, so one closed or failing location never
//! costs the other stores their reviews.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::endpoint::{Endpoint, EndpointConfig};
use crate::error::Result;
use crate::harvest::{CollectionTask, CyclePlan};
use crate::normalize::{
    LocationNormalizer, NormalizeContext, RecordNormalizer, ReviewNormalizer,
    ReviewSummaryNormalizer,
};
use crate::sink::{TableRef, TableStore};

pub const REVIEWS_URL: &str = "https://mybusiness.googleapis.com/v4/{account}/{location}/reviews";

fn default_table() -> String {
    "reviews_detail".to_string()
}

fn default_locations_table() -> String {
    "locations".to_string()
}

fn default_summary_table() -> String {
    "reviews_summ".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewsJob {
    #[serde(default = "default_table")]
    pub table: String,
    /// Table written by a `locations` job.
    #[serde(default = "default_locations_table")]
    pub locations_table: String,
    /// Per-store rating summary; empty to skip it.
    #[serde(default = "default_summary_table")]
    pub summary_table: String,
}

impl Default for ReviewsJob {
    fn default() -> Self {
        Self {
            table: default_table(),
            locations_table: default_locations_table(),
            summary_table: default_summary_table(),
        }
    }
}

impl ReviewsJob {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::google(REVIEWS_URL, "reviews").page_size(50)
    }

    /// First page only, kept whole: its top-level fields are the summary.
    fn summary_endpoint(detail: &Endpoint) -> Endpoint {
        let mut endpoint = detail.clone().page_size(1);
        endpoint.paging.records_path = String::new();
        endpoint.paging.cursor_path = String::new();
        endpoint
    }

    pub async fn plan(
        &self,
        job: &str,
        overrides: Option<&EndpointConfig>,
        store: &dyn TableStore,
    ) -> Result<Vec<CyclePlan>> {
        let endpoint = self.endpoint().with_overrides(overrides)?;

        let locations = LocationNormalizer;
        let source = TableRef::new(
            self.locations_table.as_str(),
            locations.key_column(),
            locations.columns(),
        );
        let Some(table) = store.read(&source).await? else {
            warn!(
                "[{}] no '{}' table in {}; run a locations job first",
                job,
                source,
                store.describe()
            );
            return Ok(Vec::new());
        };
        let (rows, _) = table.to_records(&source.name, &source.key_column)?;

        let detail: Arc<dyn RecordNormalizer> = Arc::new(ReviewNormalizer);
        let summary: Arc<dyn RecordNormalizer> = Arc::new(ReviewSummaryNormalizer);
        let summary_endpoint = Self::summary_endpoint(&endpoint);

        let mut plans = Vec::with_capacity(rows.len() * 2);
        for row in &rows {
            let account = row.get("account").unwrap_or_default();
            let location = row.get("name").unwrap_or_default();
            if account.is_empty() || location.is_empty() {
                warn!("[{}] location {} has no account or name, skipping", job, row.key());
                continue;
            }
            let context = NormalizeContext::new()
                .with("account", account)
                .with("location", location)
                .with("storeCode", row.key());

            plans.push(CyclePlan::new(
                job,
                self.table.as_str(),
                detail.clone(),
                vec![CollectionTask {
                    collection: endpoint.collection(&format!("reviews {}", row.key()), &context)?,
                    context: context.clone(),
                }],
            ));
            if !self.summary_table.is_empty() {
                plans.push(CyclePlan::new(
                    job,
                    self.summary_table.as_str(),
                    summary.clone(),
                    vec![CollectionTask {
                        collection: summary_endpoint
                            .collection(&format!("review summary {}", row.key()), &context)?,
                        context,
                    }],
                ));
            }
        }

        Ok(plans)
    }
}
