//! Monthly page-metric rows.

use serde_json::Value;

use super::{cell_text, NormalizeContext, NormalizedRecord, RecordNormalizer};
use crate::error::{HarvestError, Result};

/// Context key holding the reporting period (`YYYYMM`).
pub const PERIOD_KEY: &str = "month";

/// One row per reporting period with a column per metric.
///
/// The raw record is a whole insights response:
/// `{"data": [{"name": "page_impressions", "values": [{"value": 10}]}]}`.
#[derive(Debug, Clone)]
pub struct MonthlyMetricNormalizer {
    metrics: Vec<String>,
}

impl MonthlyMetricNormalizer {
    pub fn new(metrics: Vec<String>) -> Self {
        Self { metrics }
    }

    fn metric_value<'a>(data: &'a [Value], metric: &str) -> Option<&'a Value> {
        data.iter()
            .find(|entry| entry["name"].as_str() == Some(metric))
            .and_then(|entry| entry["values"].as_array())
            .and_then(|values| values.last())
            .map(|v| &v["value"])
    }
}

impl RecordNormalizer for MonthlyMetricNormalizer {
    fn key_column(&self) -> &str {
        PERIOD_KEY
    }

    fn columns(&self) -> Vec<String> {
        std::iter::once(PERIOD_KEY.to_string())
            .chain(self.metrics.iter().cloned())
            .collect()
    }

    fn normalize(&self, raw: &Value, context: &NormalizeContext) -> Result<NormalizedRecord> {
        let period = context.require(PERIOD_KEY)?;
        let data = raw["data"].as_array().map(|d| d.as_slice()).unwrap_or(&[]);

        let mut found = 0;
        let mut cells = vec![(PERIOD_KEY.to_string(), period.to_string())];
        for metric in &self.metrics {
            let value = Self::metric_value(data, metric);
            if value.is_some() {
                found += 1;
            }
            cells.push((metric.clone(), value.map(cell_text).unwrap_or_default()));
        }

        // A period with no values at all must not blank out a stored row.
        if found == 0 {
            return Err(HarvestError::Normalization(format!(
                "no metric values for period {}",
                period
            )));
        }

        NormalizedRecord::new(self.key_column(), cells)
    }
}
