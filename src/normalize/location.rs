//! Business Profile location rows.

use serde_json::Value;

use super::{cell_text, flatten_whitespace, required_key, NormalizeContext, NormalizedRecord, RecordNormalizer};
use crate::error::Result;

const COLUMNS: [&str; 6] = ["account", "name", "storeCode", "title", "postalCode", "address"];

/// Location rows keyed by `storeCode`, tagged with the owning account.
#[derive(Debug, Default, Clone)]
pub struct LocationNormalizer;

/// Administrative area, locality and street lines run together, the way the
/// addresses are written locally.
fn format_address(address: &Value) -> String {
    let lines = address["addressLines"]
        .as_array()
        .map(|lines| {
            lines
                .iter()
                .filter_map(|l| l.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    let combined = format!(
        "{}{}{}",
        address["administrativeArea"].as_str().unwrap_or_default(),
        address["locality"].as_str().unwrap_or_default(),
        lines
    );
    flatten_whitespace(&combined)
}

impl RecordNormalizer for LocationNormalizer {
    fn key_column(&self) -> &str {
        "storeCode"
    }

    fn columns(&self) -> Vec<String> {
        COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn normalize(&self, raw: &Value, context: &NormalizeContext) -> Result<NormalizedRecord> {
        let store_code = required_key(raw, "storeCode")?;
        let address = &raw["storefrontAddress"];

        let cells = vec![
            ("account".to_string(), context.get_or_empty("account")),
            ("name".to_string(), cell_text(&raw["name"])),
            ("storeCode".to_string(), store_code.to_string()),
            ("title".to_string(), cell_text(&raw["title"])),
            ("postalCode".to_string(), cell_text(&address["postalCode"])),
            ("address".to_string(), format_address(address)),
        ];
        NormalizedRecord::new(self.key_column(), cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_location() {
        let raw = json!({
            "name": "locations/1234",
            "title": "Main Street Store",
            "storeCode": "TP001",
            "storefrontAddress": {
                "postalCode": "110",
                "administrativeArea": "Taipei City",
                "locality": "Xinyi",
                "addressLines": ["No. 7", "Section 5"]
            }
        });
        let ctx = NormalizeContext::new().with("account", "accounts/99");
        let record = LocationNormalizer.normalize(&raw, &ctx).unwrap();

        assert_eq!(record.key(), "TP001");
        assert_eq!(record.get("account"), Some("accounts/99"));
        assert_eq!(record.get("name"), Some("locations/1234"));
        assert_eq!(record.get("postalCode"), Some("110"));
        assert_eq!(record.get("address"), Some("Taipei CityXinyiNo. 7 Section 5"));
    }

    #[test]
    fn test_location_without_address() {
        let raw = json!({"name": "locations/1", "storeCode": "S1"});
        let record = LocationNormalizer
            .normalize(&raw, &NormalizeContext::new())
            .unwrap();
        assert_eq!(record.get("address"), Some(""));
        assert_eq!(record.get("postalCode"), Some(""));
        assert_eq!(record.get("title"), Some(""));
    }

    #[test]
    fn test_location_without_store_code_fails() {
        let raw = json!({"name": "locations/1", "title": "No code"});
        assert!(LocationNormalizer
            .normalize(&raw, &NormalizeContext::new())
            .is_err());
    }
}
