//! In-memory tabular representation shared by all stores.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{HarvestError, Result};
use crate::normalize::NormalizedRecord;

/// Header plus rows of string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Build a table from records.
    ///
    /// Column order is `base_columns` followed by any other column in
    /// first-seen order. Cells a record lacks are written empty.
    pub fn from_records(base_columns: &[String], records: &[NormalizedRecord]) -> Self {
        let mut columns: Vec<String> = base_columns.to_vec();
        for record in records {
            for column in record.columns() {
                if !columns.iter().any(|c| c == column) {
                    columns.push(column.to_string());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).unwrap_or_default().to_string())
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    /// Convert rows back to keyed records.
    ///
    /// Rows with an empty key cannot take part in deduplication; they are
    /// dropped, logged and counted.
    pub fn to_records(&self, table: &str, key_column: &str) -> Result<(Vec<NormalizedRecord>, usize)> {
        if self.rows.is_empty() {
            return Ok((Vec::new(), 0));
        }
        if !self.columns.iter().any(|c| c == key_column) {
            return Err(HarvestError::read(
                table,
                format!("existing table has no '{}' column", key_column),
            ));
        }

        let mut records = Vec::with_capacity(self.rows.len());
        let mut dropped = 0;
        for (idx, row) in self.rows.iter().enumerate() {
            let cells = self
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| (c.clone(), row.get(i).cloned().unwrap_or_default()))
                .collect();
            match NormalizedRecord::new(key_column, cells) {
                Ok(record) => records.push(record),
                Err(_) => {
                    warn!("{}: dropping stored row {} with empty '{}'", table, idx + 1, key_column);
                    dropped += 1;
                }
            }
        }
        Ok((records, dropped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pairs: &[(&str, &str)]) -> NormalizedRecord {
        NormalizedRecord::from_pairs("key", pairs).unwrap()
    }

    #[test]
    fn test_from_records_unions_columns() {
        let base = vec!["key".to_string(), "old".to_string()];
        let table = Table::from_records(
            &base,
            &[rec(&[("key", "A"), ("val", "1")]), rec(&[("key", "B"), ("extra", "x")])],
        );
        assert_eq!(table.columns, vec!["key", "old", "val", "extra"]);
        assert_eq!(table.rows[0], vec!["A", "", "1", ""]);
        assert_eq!(table.rows[1], vec!["B", "", "", "x"]);
    }

    #[test]
    fn test_to_records_drops_unkeyed_rows() {
        let table = Table {
            columns: vec!["key".into(), "val".into()],
            rows: vec![
                vec!["A".into(), "1".into()],
                vec!["".into(), "2".into()],
                vec!["C".into()],
            ],
        };
        let (records, dropped) = table.to_records("t", "key").unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("val"), Some(""));
    }

    #[test]
    fn test_to_records_requires_key_column() {
        let table = Table {
            columns: vec!["other".into()],
            rows: vec![vec!["x".into()]],
        };
        assert!(matches!(
            table.to_records("t", "key"),
            Err(HarvestError::PersistenceRead { .. })
        ));
    }
}
