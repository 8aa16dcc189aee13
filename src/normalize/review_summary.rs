//! Per-store review summary rows.

use serde_json::Value;

use super::{cell_text, NormalizeContext, NormalizedRecord, RecordNormalizer};
use crate::error::{HarvestError, Result};

const COLUMNS: [&str; 3] = ["storeCode", "averageRating", "totalReviewCount"];

/// Page fields that are not part of the summary.
const PAGE_FIELDS: [&str; 2] = ["reviews", "nextPageToken"];

/// Summary rows keyed by `storeCode`, built from the top-level fields of a
/// review listing page (`averageRating`, `totalReviewCount`, ...).
///
/// Other scalar fields on the page are carried as extra columns; lists and
/// objects are not.
#[derive(Debug, Default, Clone)]
pub struct ReviewSummaryNormalizer;

impl RecordNormalizer for ReviewSummaryNormalizer {
    fn key_column(&self) -> &str {
        "storeCode"
    }

    fn columns(&self) -> Vec<String> {
        COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn normalize(&self, raw: &Value, context: &NormalizeContext) -> Result<NormalizedRecord> {
        let store_code = context.require("storeCode")?;
        let Some(page) = raw.as_object() else {
            return Err(HarvestError::Normalization(
                "review summary page is not an object".into(),
            ));
        };

        let mut cells = vec![
            ("storeCode".to_string(), store_code.to_string()),
            ("averageRating".to_string(), cell_text(&raw["averageRating"])),
            (
                "totalReviewCount".to_string(),
                cell_text(&raw["totalReviewCount"]),
            ),
        ];
        for (field, value) in page {
            let field = field.as_str();
            if COLUMNS.contains(&field) || PAGE_FIELDS.contains(&field) {
                continue;
            }
            if value.is_array() || value.is_object() {
                continue;
            }
            cells.push((field.to_string(), cell_text(value)));
        }
        NormalizedRecord::new(self.key_column(), cells)
    }
}
