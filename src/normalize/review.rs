//! Business Profile review rows.

use serde_json::Value;

use super::{cell_text, extract_path, required_key, NormalizeContext, NormalizedRecord, RecordNormalizer};
use crate::error::Result;

const COLUMNS: [&str; 8] = [
    "reviewId",
    "storeCode",
    "starRating",
    "comment",
    "createTime",
    "updateTime",
    "replyComment",
    "replyUpdateTime",
];

/// Review rows keyed by `reviewId`. The store code comes from the location
/// being walked; reviewer identity is not persisted.
#[derive(Debug, Default, Clone)]
pub struct ReviewNormalizer;

impl RecordNormalizer for ReviewNormalizer {
    fn key_column(&self) -> &str {
        "reviewId"
    }

    fn columns(&self) -> Vec<String> {
        COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn normalize(&self, raw: &Value, context: &NormalizeContext) -> Result<NormalizedRecord> {
        let review_id = required_key(raw, "reviewId")?;

        let cells = vec![
            ("reviewId".to_string(), review_id.to_string()),
            ("storeCode".to_string(), context.get_or_empty("storeCode")),
            ("starRating".to_string(), cell_text(&raw["starRating"])),
            ("comment".to_string(), cell_text(&raw["comment"])),
            ("createTime".to_string(), cell_text(&raw["createTime"])),
            ("updateTime".to_string(), cell_text(&raw["updateTime"])),
            (
                "replyComment".to_string(),
                cell_text(extract_path(raw, "reviewReply.comment")),
            ),
            (
                "replyUpdateTime".to_string(),
                cell_text(extract_path(raw, "reviewReply.updateTime")),
            ),
        ];
        NormalizedRecord::new(self.key_column(), cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarvestError;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "reviewId": "AbFvOq",
            "name": "accounts/1/locations/2/reviews/AbFvOq",
            "reviewer": {"displayName": "Someone", "profilePhotoUrl": "https://x"},
            "starRating": "FIVE",
            "comment": "Great\nservice",
            "createTime": "2024-03-01T10:00:00Z",
            "updateTime": "2024-03-02T10:00:00Z",
            "reviewReply": {"comment": "Thanks!", "updateTime": "2024-03-03T00:00:00Z"}
        })
    }

    #[test]
    fn test_normalize_review() {
        let ctx = NormalizeContext::new().with("storeCode", "TP001");
        let record = ReviewNormalizer.normalize(&sample(), &ctx).unwrap();

        assert_eq!(record.key(), "AbFvOq");
        assert_eq!(record.get("storeCode"), Some("TP001"));
        assert_eq!(record.get("starRating"), Some("FIVE"));
        assert_eq!(record.get("comment"), Some("Great service"));
        assert_eq!(record.get("replyComment"), Some("Thanks!"));
        assert_eq!(record.get("reviewer"), None);
        assert_eq!(
            record.columns().collect::<Vec<_>>(),
            COLUMNS.to_vec(),
            "column set must be stable"
        );
    }

    #[test]
    fn test_missing_optional_fields_are_empty() {
        let raw = json!({"reviewId": "r2", "starRating": "ONE"});
        let record = ReviewNormalizer
            .normalize(&raw, &NormalizeContext::new())
            .unwrap();
        assert_eq!(record.get("comment"), Some(""));
        assert_eq!(record.get("replyComment"), Some(""));
        assert_eq!(record.get("storeCode"), Some(""));
        assert_eq!(record.cells().len(), COLUMNS.len());
    }

    #[test]
    fn test_missing_review_id_fails() {
        let raw = json!({"starRating": "ONE"});
        assert!(matches!(
            ReviewNormalizer.normalize(&raw, &NormalizeContext::new()),
            Err(HarvestError::Normalization(_))
        ));
    }

    #[test]
    fn test_normalize_is_stable() {
        let ctx = NormalizeContext::new().with("storeCode", "TP001");
        let first = ReviewNormalizer.normalize(&sample(), &ctx).unwrap();
        let second = ReviewNormalizer.normalize(&sample(), &ctx).unwrap();
        assert_eq!(first, second);
    }
}
