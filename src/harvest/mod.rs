//! Incremental harvesting: pagination, normalization and merge cycles.

mod cycle;
mod fetcher;
mod paginator;

pub use cycle::{CollectionTask, CyclePlan, CycleReport, Harvester};
pub use fetcher::{CollectionRef, Cursor, HttpPageFetcher, PageFetcher, PagingRules, RawPage};
pub use paginator::{Paginator, PassResult, DEFAULT_MAX_PAGES};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{HarvestError, Result};

/// Cooperative cancellation flag shared across a run.
///
/// Checked between page fetches and between collections, never while a
/// table is being written.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(HarvestError::Cancelled)
        } else {
            Ok(())
        }
    }
}
