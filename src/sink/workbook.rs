//! Workbook-style store: many named sheets in one JSON file.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{Table, TableRef, TableStore};
use crate::error::{HarvestError, Result};
use crate::utils::{read_optional, replace_file, replace_file_within};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Workbook {
    #[serde(default)]
    sheets: BTreeMap<String, Table>,
}

/// Sheets addressed by name inside a single workbook file.
///
/// Writing one sheet rewrites the whole workbook, so writes are serialized
/// in-process and each replaces the file atomically.
#[derive(Debug)]
pub struct WorkbookStore {
    path: PathBuf,
    lock: Mutex<()>,
    write_timeout: Option<Duration>,
}

impl WorkbookStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            write_timeout: None,
        }
    }

    /// Give up on writes that have not committed within `timeout`.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    async fn load(&self, table: &str) -> Result<Workbook> {
        let bytes = read_optional(&self.path)
            .await
            .map_err(|e| HarvestError::read(table, format!("{}: {}", self.path.display(), e)))?;
        match bytes {
            None => Ok(Workbook::default()),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                HarvestError::read(table, format!("{} is not a workbook: {}", self.path.display(), e))
            }),
        }
    }
}

#[async_trait]
impl TableStore for WorkbookStore {
    async fn read(&self, table: &TableRef) -> Result<Option<Table>> {
        let _guard = self.lock.lock().await;
        let mut workbook = self.load(&table.name).await?;
        Ok(workbook.sheets.remove(&table.name))
    }

    async fn write(&self, table: &TableRef, contents: &Table) -> Result<()> {
        let _guard = self.lock.lock().await;
        // Fails rather than clobbering other sheets when the file is unreadable.
        let mut workbook = self
            .load(&table.name)
            .await
            .map_err(|e| HarvestError::write(&table.name, e))?;
        if !workbook.sheets.contains_key(&table.name) {
            debug!("Adding sheet '{}' to {}", table.name, self.path.display());
        }
        workbook.sheets.insert(table.name.clone(), contents.clone());

        let bytes = serde_json::to_vec_pretty(&workbook)
            .map_err(|e| HarvestError::write(&table.name, e))?;
        match self.write_timeout {
            Some(timeout) => replace_file_within(self.path.clone(), bytes, timeout).await,
            None => replace_file(self.path.clone(), bytes).await,
        }
        .map_err(|e| HarvestError::write(&table.name, format!("{}: {}", self.path.display(), e)))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
