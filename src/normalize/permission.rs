//! Drive file permission rows.

use serde_json::Value;

use super::{cell_text, NormalizeContext, NormalizedRecord, RecordNormalizer};
use crate::error::{HarvestError, Result};

const COLUMNS: [&str; 7] = [
    "permissionKey",
    "file",
    "fileId",
    "displayName",
    "emailAddress",
    "role",
    "type",
];

/// Permission rows keyed by `{fileId}/{permission id}`.
///
/// Older permission listings may omit `id`; the grantee's email address is
/// used instead.
#[derive(Debug, Default, Clone)]
pub struct PermissionNormalizer;

impl RecordNormalizer for PermissionNormalizer {
    fn key_column(&self) -> &str {
        "permissionKey"
    }

    fn columns(&self) -> Vec<String> {
        COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn normalize(&self, raw: &Value, context: &NormalizeContext) -> Result<NormalizedRecord> {
        let file_id = context.require("file_id")?;
        let grantee = raw["id"]
            .as_str()
            .or_else(|| raw["emailAddress"].as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                HarvestError::Normalization("permission has neither id nor emailAddress".into())
            })?;

        let cells = vec![
            ("permissionKey".to_string(), format!("{}/{}", file_id, grantee)),
            ("file".to_string(), context.get_or_empty("file_name")),
            ("fileId".to_string(), file_id.to_string()),
            ("displayName".to_string(), cell_text(&raw["displayName"])),
            ("emailAddress".to_string(), cell_text(&raw["emailAddress"])),
            ("role".to_string(), cell_text(&raw["role"])),
            ("type".to_string(), cell_text(&raw["type"])),
        ];
        NormalizedRecord::new(self.key_column(), cells)
    }
}
