//! Tab-separated table files.
//!
//! One `<table>.tsv` per destination, UTF-8 with a byte-order mark so the
//! files open cleanly in Excel. Cells never contain tabs or line breaks;
//! they are flattened to spaces on write.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::{Table, TableRef, TableStore};
use crate::error::{HarvestError, Result};
use crate::normalize::flatten_whitespace;
use crate::utils::{read_optional, replace_file, replace_file_within};

const BOM: &str = "\u{feff}";

#[derive(Debug, Clone)]
pub struct TsvTableStore {
    dir: PathBuf,
    write_timeout: Option<Duration>,
}

impl TsvTableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_timeout: None,
        }
    }

    /// Give up on writes that have not committed within `timeout`.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a table; path separators in the name are neutralized.
    pub fn path_for(&self, table: &TableRef) -> PathBuf {
        let stem: String = table
            .name
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        self.dir.join(format!("{}.tsv", stem))
    }
}

fn encode(table: &Table) -> String {
    let mut out = String::from(BOM);
    let line = |cells: &[String]| {
        cells
            .iter()
            .map(|c| flatten_whitespace(c))
            .collect::<Vec<_>>()
            .join("\t")
    };
    out.push_str(&line(table.columns.as_slice()));
    out.push('\n');
    for row in &table.rows {
        out.push_str(&line(row.as_slice()));
        out.push('\n');
    }
    out
}

fn decode(text: &str) -> Table {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let mut lines = text.lines().filter(|l| !l.is_empty());

    let columns: Vec<String> = match lines.next() {
        Some(header) => header.split('\t').map(|s| s.to_string()).collect(),
        None => return Table::default(),
    };
    let rows = lines
        .map(|l| l.split('\t').map(|s| s.to_string()).collect())
        .collect();

    Table { columns, rows }
}

#[async_trait]
impl TableStore for TsvTableStore {
    async fn read(&self, table: &TableRef) -> Result<Option<Table>> {
        let path = self.path_for(table);
        let bytes = read_optional(&path)
            .await
            .map_err(|e| HarvestError::read(&table.name, format!("{}: {}", path.display(), e)))?;
        let Some(bytes) = bytes else {
            return Ok(None);
        };
        let text = String::from_utf8(bytes).map_err(|e| {
            HarvestError::read(&table.name, format!("{} is not UTF-8: {}", path.display(), e))
        })?;
        Ok(Some(decode(&text)))
    }

    async fn write(&self, table: &TableRef, contents: &Table) -> Result<()> {
        let path = self.path_for(table);
        let bytes = encode(contents).into_bytes();
        match self.write_timeout {
            Some(timeout) => replace_file_within(path.clone(), bytes, timeout).await,
            None => replace_file(path.clone(), bytes).await,
        }
        .map_err(|e| HarvestError::write(&table.name, format!("{}: {}", path.display(), e)))
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}
