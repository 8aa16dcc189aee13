//! Harvest cycles: paginate, normalize, merge.

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use super::fetcher::CollectionRef;
use super::paginator::Paginator;
use super::CancelToken;
use crate::error::{HarvestError, Result};
use crate::normalize::{NormalizeContext, NormalizedRecord, RecordNormalizer};
use crate::sink::{MergeOutcome, MergeSink, ReplaceScope, TableRef};

/// Skipped-record reasons kept per cycle report.
const MAX_SKIP_REASONS: usize = 10;

/// One collection to walk plus the context its records are normalized with.
#[derive(Debug, Clone)]
pub struct CollectionTask {
    pub collection: CollectionRef,
    pub context: NormalizeContext,
}

/// Everything that ends up in one destination table.
#[derive(Clone)]
pub struct CyclePlan {
    pub job: String,
    pub table: TableRef,
    pub normalizer: Arc<dyn RecordNormalizer>,
    pub tasks: Vec<CollectionTask>,
    /// Stored rows this cycle replaces rather than merges into.
    pub replace_scope: Option<ReplaceScope>,
}

impl fmt::Debug for CyclePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CyclePlan")
            .field("job", &self.job)
            .field("table", &self.table)
            .field("tasks", &self.tasks)
            .field("replace_scope", &self.replace_scope)
            .finish_non_exhaustive()
    }
}

impl CyclePlan {
    /// Plan a cycle whose table takes its key and columns from `normalizer`.
    pub fn new(
        job: &str,
        table_name: impl Into<String>,
        normalizer: Arc<dyn RecordNormalizer>,
        tasks: Vec<CollectionTask>,
    ) -> Self {
        let table = TableRef::new(table_name, normalizer.key_column(), normalizer.columns());
        Self {
            job: job.to_string(),
            table,
            normalizer,
            tasks,
            replace_scope: None,
        }
    }

    pub fn with_replace_scope(mut self, scope: ReplaceScope) -> Self {
        self.replace_scope = Some(scope);
        self
    }
}

/// Outcome of one cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub job: String,
    pub table: String,
    pub collections: usize,
    pub pages: usize,
    pub fetched: usize,
    pub normalized: usize,
    /// Records skipped because they could not be normalized.
    pub skipped: usize,
    pub skip_reasons: Vec<String>,
    pub result: Result<MergeOutcome>,
}

impl CycleReport {
    fn new(plan: &CyclePlan) -> Self {
        Self {
            job: plan.job.clone(),
            table: plan.table.name.clone(),
            collections: 0,
            pages: 0,
            fetched: 0,
            normalized: 0,
            skipped: 0,
            skip_reasons: Vec::new(),
            result: Ok(MergeOutcome::default()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs cycles against one paginator and one sink.
#[derive(Clone)]
pub struct Harvester {
    paginator: Paginator,
    sink: MergeSink,
    cancel: CancelToken,
}

impl Harvester {
    pub fn new(paginator: Paginator, sink: MergeSink, cancel: CancelToken) -> Self {
        Self {
            paginator,
            sink,
            cancel,
        }
    }

    /// Run one cycle. Failures are captured in the report, never propagated.
    pub async fn run_cycle(&self, plan: &CyclePlan) -> CycleReport {
        let mut report = CycleReport::new(plan);
        info!(
            "[{}] harvesting {} collection(s) into {}",
            plan.job,
            plan.tasks.len(),
            plan.table
        );

        report.result = match self.collect(plan, &mut report).await {
            Ok(records) => {
                // Cancellation is honoured up to here; a started write runs to completion.
                match self.cancel.check() {
                    Ok(()) => {
                        self.sink
                            .merge_and_persist_scoped(
                                &plan.table,
                                plan.replace_scope.as_ref(),
                                records,
                            )
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };

        if report.skipped > 0 {
            warn!(
                "[{}] {}: skipped {} record(s) that could not be normalized",
                plan.job, plan.table, report.skipped
            );
        }
        if let Err(ref e) = report.result {
            error!("[{}] {}: cycle failed: {}", plan.job, plan.table, e);
        }
        report
    }

    async fn collect(
        &self,
        plan: &CyclePlan,
        report: &mut CycleReport,
    ) -> Result<Vec<NormalizedRecord>> {
        let mut records = Vec::new();

        for task in &plan.tasks {
            self.cancel.check()?;
            let pass = self.paginator.run(&task.collection).await?;
            report.collections += 1;
            report.pages += pass.pages;
            report.fetched += pass.records.len();

            for raw in &pass.records {
                match plan.normalizer.normalize(raw, &task.context) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        debug!("{}: skipping record: {}", task.collection.label, e);
                        report.skipped += 1;
                        if report.skip_reasons.len() < MAX_SKIP_REASONS {
                            report
                                .skip_reasons
                                .push(format!("{}: {}", task.collection.label, e));
                        }
                    }
                }
            }
        }

        report.normalized = records.len();
        Ok(records)
    }

    /// Run independent cycles with bounded concurrency.
    ///
    /// A failed cycle never stops its siblings. Reports come back in
    /// completion order.
    pub async fn run_all(&self, plans: Vec<CyclePlan>, concurrency: usize) -> Vec<CycleReport> {
        stream::iter(plans)
            .map(|plan| async move {
                if self.cancel.is_cancelled() {
                    let mut report = CycleReport::new(&plan);
                    report.result = Err(HarvestError::Cancelled);
                    return report;
                }
                self.run_cycle(&plan).await
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }
}
