//! In-process table stores for dry runs and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Table, TableRef, TableStore};
use crate::error::{HarvestError, Result};

#[derive(Debug, Default)]
pub struct MemoryTableStore {
    tables: RwLock<HashMap<String, Table>>,
    fail_writes: AtomicBool,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table.
    pub async fn insert(&self, name: &str, table: Table) {
        self.tables.write().await.insert(name.to_string(), table);
    }

    pub async fn get(&self, name: &str) -> Option<Table> {
        self.tables.read().await.get(name).cloned()
    }

    pub async fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn read(&self, table: &TableRef) -> Result<Option<Table>> {
        Ok(self.get(&table.name).await)
    }

    async fn write(&self, table: &TableRef, contents: &Table) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HarvestError::write(&table.name, "store is read-only"));
        }
        self.tables
            .write()
            .await
            .insert(table.name.clone(), contents.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Reads through to a real store, keeps every write in memory.
///
/// Used for dry runs: merges see the stored tables but nothing is persisted.
pub struct ScratchStore {
    inner: Arc<dyn TableStore>,
    scratch: MemoryTableStore,
}

impl ScratchStore {
    pub fn new(inner: Arc<dyn TableStore>) -> Self {
        Self {
            inner,
            scratch: MemoryTableStore::new(),
        }
    }

    /// Table as it would have been written.
    pub async fn written(&self, name: &str) -> Option<Table> {
        self.scratch.get(name).await
    }
}

#[async_trait]
impl TableStore for ScratchStore {
    async fn read(&self, table: &TableRef) -> Result<Option<Table>> {
        match self.scratch.get(&table.name).await {
            Some(t) => Ok(Some(t)),
            None => self.inner.read(table).await,
        }
    }

    async fn write(&self, table: &TableRef, contents: &Table) -> Result<()> {
        self.scratch.write(table, contents).await
    }

    fn describe(&self) -> String {
        format!("{} (dry run)", self.inner.describe())
    }
}
