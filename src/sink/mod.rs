//! Merge-on-write persistence.
//!
//! [`MergeSink`] loads a destination table, appends freshly normalized
//! records, keeps the last occurrence of every natural key and writes the
//! whole table back through a [`TableStore`]. Stores must replace the
//! destination atomically so a failed write leaves the previous table intact.
//! Cycles writing the same table are serialized per table name.

mod memory;
mod table;
mod tsv;
mod workbook;

pub use memory::{MemoryTableStore, ScratchStore};
pub use table::Table;
pub use tsv::TsvTableStore;
pub use workbook::WorkbookStore;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{HarvestError, Result};
use crate::normalize::NormalizedRecord;

/// Address of a destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    /// File stem or sheet name.
    pub name: String,
    pub key_column: String,
    /// Preferred column order for a freshly created table.
    pub columns: Vec<String>,
}

impl TableRef {
    pub fn new(name: impl Into<String>, key_column: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            key_column: key_column.into(),
            columns,
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Stored rows a cycle replaces wholesale instead of merging into.
///
/// Rows whose `column` equals `value` are dropped before the merge, so the
/// cycle's fresh records become the complete set for that value (a file's
/// current permission list, for example).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceScope {
    pub column: String,
    pub value: String,
}

impl ReplaceScope {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    fn covers(&self, record: &NormalizedRecord) -> bool {
        record.get(&self.column) == Some(self.value.as_str())
    }
}

/// Durable table storage.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Read a table. `None` when the table does not exist yet.
    async fn read(&self, table: &TableRef) -> Result<Option<Table>>;

    /// Replace the table's contents in full. Must be atomic, and a write
    /// reported as failed must never land later.
    async fn write(&self, table: &TableRef, contents: &Table) -> Result<()>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Phases of one load-merge-persist cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Init,
    LoadingExisting,
    Merging,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CycleState::Init => "INIT",
            CycleState::LoadingExisting => "LOADING_EXISTING",
            CycleState::Merging => "MERGING",
            CycleState::Persisting => "PERSISTING",
            CycleState::Done => "DONE",
            CycleState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Counts from one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub existing_rows: usize,
    pub incoming_rows: usize,
    pub persisted_rows: usize,
    /// Incoming rows whose key already existed (stored or earlier in the batch).
    pub superseded_rows: usize,
    /// Stored rows dropped for lacking a key.
    pub dropped_rows: usize,
    /// Stored rows removed by a [`ReplaceScope`].
    pub replaced_rows: usize,
}

/// Concatenate `existing` and `incoming` and keep the last occurrence of each key.
///
/// Surviving rows keep the position of their last occurrence, so untouched
/// stored rows stay ahead of new ones and an overwritten key moves to where
/// its newest version appeared.
pub fn merge_records(
    existing: Vec<NormalizedRecord>,
    incoming: Vec<NormalizedRecord>,
) -> Vec<NormalizedRecord> {
    let combined: Vec<NormalizedRecord> = existing.into_iter().chain(incoming).collect();

    let mut last_index: HashMap<&str, usize> = HashMap::with_capacity(combined.len());
    for (idx, record) in combined.iter().enumerate() {
        last_index.insert(record.key(), idx);
    }
    let keep: Vec<bool> = combined
        .iter()
        .enumerate()
        .map(|(idx, record)| last_index.get(record.key()) == Some(&idx))
        .collect();

    combined
        .into_iter()
        .zip(keep)
        .filter_map(|(record, keep)| keep.then_some(record))
        .collect()
}

/// Reconciles new records with a stored table and persists the result.
///
/// `timeout` bounds loading the stored table. Writes are bounded by the
/// store itself, which alone knows whether its replace already committed.
#[derive(Clone)]
pub struct MergeSink {
    store: Arc<dyn TableStore>,
    timeout: Duration,
    table_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl MergeSink {
    pub fn new(store: Arc<dyn TableStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            table_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn table_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.table_locks
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    fn transition(table: &TableRef, state: CycleState) {
        debug!("{}: {}", table, state);
    }

    pub async fn merge_and_persist(
        &self,
        table: &TableRef,
        new_records: Vec<NormalizedRecord>,
    ) -> Result<MergeOutcome> {
        self.merge_and_persist_scoped(table, None, new_records).await
    }

    /// Like [`merge_and_persist`](Self::merge_and_persist), first dropping
    /// the stored rows covered by `scope`.
    pub async fn merge_and_persist_scoped(
        &self,
        table: &TableRef,
        scope: Option<&ReplaceScope>,
        new_records: Vec<NormalizedRecord>,
    ) -> Result<MergeOutcome> {
        // Held from load to persist so concurrent cycles cannot lose each other's rows.
        let lock = self.table_lock(&table.name).await;
        let _guard = lock.lock().await;
        Self::transition(table, CycleState::Init);

        Self::transition(table, CycleState::LoadingExisting);
        let existing = match tokio::time::timeout(self.timeout, self.store.read(table)).await {
            Ok(Ok(existing)) => existing.unwrap_or_default(),
            Ok(Err(e)) => {
                Self::transition(table, CycleState::Failed);
                return Err(e);
            }
            Err(_) => {
                Self::transition(table, CycleState::Failed);
                return Err(HarvestError::read(
                    &table.name,
                    format!("timed out after {:?}", self.timeout),
                ));
            }
        };

        Self::transition(table, CycleState::Merging);
        let (existing_records, dropped_rows) =
            match existing.to_records(&table.name, &table.key_column) {
                Ok(v) => v,
                Err(e) => {
                    Self::transition(table, CycleState::Failed);
                    return Err(e);
                }
            };
        let existing_rows = existing_records.len();
        let existing_records: Vec<NormalizedRecord> = match scope {
            Some(scope) => existing_records
                .into_iter()
                .filter(|r| !scope.covers(r))
                .collect(),
            None => existing_records,
        };
        let replaced_rows = existing_rows - existing_records.len();
        if replaced_rows > 0 {
            debug!(
                "{}: replacing {} stored row(s) where {} = {}",
                table,
                replaced_rows,
                scope.map(|s| s.column.as_str()).unwrap_or_default(),
                scope.map(|s| s.value.as_str()).unwrap_or_default()
            );
        }
        let incoming_rows = new_records.len();
        let kept_rows = existing_records.len();
        let merged = merge_records(existing_records, new_records);
        let superseded_rows = kept_rows + incoming_rows - merged.len();

        let mut base_columns = existing.columns.clone();
        for column in &table.columns {
            if !base_columns.contains(column) {
                base_columns.push(column.clone());
            }
        }
        let contents = Table::from_records(&base_columns, &merged);

        Self::transition(table, CycleState::Persisting);
        if let Err(e) = self.store.write(table, &contents).await {
            Self::transition(table, CycleState::Failed);
            return Err(e);
        }
        Self::transition(table, CycleState::Done);

        info!(
            "{}: {} stored + {} new -> {} rows ({})",
            table,
            existing_rows,
            incoming_rows,
            merged.len(),
            self.store.describe()
        );

        Ok(MergeOutcome {
            existing_rows,
            incoming_rows,
            persisted_rows: merged.len(),
            superseded_rows,
            dropped_rows,
            replaced_rows,
        })
    }
}
