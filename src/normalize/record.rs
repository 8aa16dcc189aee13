use crate::error::{HarvestError, Result};

/// A flat row with exactly one natural key column.
///
/// Two records with the same key describe the same logical entity regardless
/// of their other cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    key_column: String,
    cells: Vec<(String, String)>,
}

impl NormalizedRecord {
    /// Build a record, checking that the key column is present and non-empty.
    pub fn new(key_column: &str, cells: Vec<(String, String)>) -> Result<Self> {
        let key = cells
            .iter()
            .find(|(column, _)| column == key_column)
            .map(|(_, value)| value.as_str());
        match key {
            Some(value) if !value.trim().is_empty() => Ok(Self {
                key_column: key_column.to_string(),
                cells,
            }),
            _ => Err(HarvestError::Normalization(format!(
                "natural key '{}' is missing or empty",
                key_column
            ))),
        }
    }

    /// Build a record from `(column, value)` pairs given as string slices.
    pub fn from_pairs(key_column: &str, pairs: &[(&str, &str)]) -> Result<Self> {
        Self::new(
            key_column,
            pairs
                .iter()
                .map(|(c, v)| (c.to_string(), v.to_string()))
                .collect(),
        )
    }

    pub fn key(&self) -> &str {
        self.get(&self.key_column).unwrap_or_default()
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn cells(&self) -> &[(String, String)] {
        &self.cells
    }
}
