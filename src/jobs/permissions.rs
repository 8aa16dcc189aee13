//! Drive file permissions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::endpoint::{Endpoint, EndpointConfig};
use crate::error::{HarvestError, Result};
use crate::harvest::{CollectionTask, CyclePlan};
use crate::normalize::{NormalizeContext, PermissionNormalizer, RecordNormalizer};
use crate::sink::ReplaceScope;

pub const PERMISSIONS_URL: &str = "https://www.googleapis.com/drive/v3/files/{file_id}/permissions";
pub const PERMISSION_FIELDS: &str = "nextPageToken,permissions(id,displayName,emailAddress,role,type)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Destination table; defaults to `<name or id>_permissions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl DriveFile {
    pub fn table_name(&self) -> String {
        match self.table {
            Some(ref t) => t.clone(),
            None if !self.name.is_empty() => format!("{}_permissions", self.name),
            None => format!("{}_permissions", self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionsJob {
    pub files: Vec<DriveFile>,
}

impl PermissionsJob {
    pub fn validate(&self) -> Result<()> {
        if self.files.is_empty() {
            return Err(HarvestError::Config("permissions job needs at least one file".into()));
        }
        if let Some(file) = self.files.iter().find(|f| f.id.trim().is_empty()) {
            return Err(HarvestError::Config(format!(
                "permissions file '{}' has no id",
                file.name
            )));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::google(PERMISSIONS_URL, "permissions").param("fields", PERMISSION_FIELDS)
    }

    /// One cycle per file.
    ///
    /// Each run replaces the file's stored permissions with the current
    /// listing, so revoked grants disappear. Files may share a table.
    pub fn plan(&self, job: &str, overrides: Option<&EndpointConfig>) -> Result<Vec<CyclePlan>> {
        let endpoint = self.endpoint().with_overrides(overrides)?;
        let normalizer: Arc<dyn RecordNormalizer> = Arc::new(PermissionNormalizer);

        self.files
            .iter()
            .map(|file| {
                let context = NormalizeContext::new()
                    .with("file_id", file.id.as_str())
                    .with("file_name", file.name.as_str());
                let collection = endpoint.collection(&format!("permissions {}", file.id), &context)?;
                Ok(CyclePlan::new(
                    job,
                    file.table_name(),
                    normalizer.clone(),
                    vec![CollectionTask {
                        collection,
                        context,
                    }],
                )
                .with_replace_scope(ReplaceScope::new("fileId", file.id.as_str())))
            })
            .collect()
    }
}
