//! Record normalization.
//!
//! Maps raw upstream JSON records into flat rows with a fixed column set and a
//! single natural key column. Normalizers are pure: the same raw record and
//! context always produce the same row.

mod location;
mod metric;
mod permission;
mod record;
mod review;
mod review_summary;

pub use location::LocationNormalizer;
pub use metric::MonthlyMetricNormalizer;
pub use permission::PermissionNormalizer;
pub use record::NormalizedRecord;
pub use review::ReviewNormalizer;
pub use review_summary::ReviewSummaryNormalizer;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{HarvestError, Result};

/// Contextual fields injected from the enclosing loop (account, store code,
/// reporting period, ...). Also used to fill request URL templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeContext {
    values: BTreeMap<String, String>,
}

impl NormalizeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Value for `key`, empty string when absent.
    pub fn get_or_empty(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    /// Value for `key`, failing normalization when absent or empty.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| HarvestError::Normalization(format!("context is missing '{}'", key)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Maps one raw record shape into persisted rows.
pub trait RecordNormalizer: Send + Sync {
    /// Column holding the natural key.
    fn key_column(&self) -> &str;

    /// Fixed output column set, in output order.
    fn columns(&self) -> Vec<String>;

    fn normalize(&self, raw: &Value, context: &NormalizeContext) -> Result<NormalizedRecord>;
}

/// Render a JSON value as a single spreadsheet cell.
///
/// Missing and null values become the empty string; tabs and line breaks are
/// flattened to spaces so one record always occupies one line.
pub fn cell_text(value: &Value) -> String {
    let raw = match value {
        Value::Null => return String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    };
    flatten_whitespace(&raw)
}

pub(crate) fn flatten_whitespace(s: &str) -> String {
    s.replace("\r\n", " ").replace(['\n', '\r', '\t'], " ")
}

/// Walk a dotted path (`a.b.0.c`) through a JSON value.
///
/// Missing segments resolve to `Value::Null`. An empty path returns the
/// value itself.
pub fn extract_path<'a>(data: &'a Value, path: &str) -> &'a Value {
    if path.is_empty() {
        return data;
    }

    let mut current = data;
    for key in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(key).unwrap_or(&Value::Null),
            Value::Array(arr) => match key.parse::<usize>() {
                Ok(idx) => arr.get(idx).unwrap_or(&Value::Null),
                Err(_) => &Value::Null,
            },
            _ => &Value::Null,
        };
    }

    current
}

/// Required string field used as (part of) a natural key.
pub(crate) fn required_key<'a>(raw: &'a Value, field: &str) -> Result<&'a str> {
    match extract_path(raw, field) {
        Value::String(s) if !s.trim().is_empty() => Ok(s.as_str()),
        Value::Null => Err(HarvestError::Normalization(format!(
            "record has no '{}'",
            field
        ))),
        other => Err(HarvestError::Normalization(format!(
            "'{}' is not a non-empty string: {}",
            field, other
        ))),
    }
}
