//! Cursor pagination with one-shot credential recovery.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::fetcher::{CollectionRef, Cursor, PageFetcher};
use super::CancelToken;
use crate::credentials::CredentialStore;
use crate::error::{HarvestError, Result};

/// Default safety valve against upstreams that never stop paging.
pub const DEFAULT_MAX_PAGES: usize = 1000;

/// Records gathered by one pass over a collection, in page-arrival order.
#[derive(Debug, Clone, Default)]
pub struct PassResult {
    pub records: Vec<Value>,
    pub pages: usize,
    pub refreshes: usize,
}

/// Walks a collection from the first page to a terminal cursor.
#[derive(Clone)]
pub struct Paginator {
    fetcher: Arc<dyn PageFetcher>,
    credentials: CredentialStore,
    max_pages: usize,
    cancel: CancelToken,
}

impl Paginator {
    pub fn new(fetcher: Arc<dyn PageFetcher>, credentials: CredentialStore) -> Self {
        Self {
            fetcher,
            credentials,
            max_pages: DEFAULT_MAX_PAGES,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Exhaust `collection`.
    ///
    /// The first `Auth` failure of the pass refreshes the credential and
    /// retries the same cursor; a second one aborts the pass. Every other
    /// failure aborts immediately.
    pub async fn run(&self, collection: &CollectionRef) -> Result<PassResult> {
        let mut result = PassResult::default();
        let mut cursor: Option<Cursor> = None;

        loop {
            self.cancel.check()?;

            let seen_generation = self.credentials.snapshot().await.generation;
            match self.fetcher.fetch(collection, cursor.as_ref()).await {
                Ok(page) => {
                    result.pages += 1;
                    debug!(
                        "{}: page {} with {} records",
                        collection.label,
                        result.pages,
                        page.records.len()
                    );
                    result.records.extend(page.records);

                    match page.next_cursor {
                        None => break,
                        Some(next) => {
                            if result.pages >= self.max_pages {
                                return Err(HarvestError::PaginationLimitExceeded {
                                    collection: collection.label.clone(),
                                    limit: self.max_pages,
                                });
                            }
                            cursor = Some(next);
                        }
                    }
                }
                Err(e) if e.is_auth() => {
                    if result.refreshes > 0 {
                        warn!(
                            "{}: credential rejected again after refresh, aborting pass",
                            collection.label
                        );
                        return Err(e);
                    }
                    info!("{}: credential rejected, refreshing", collection.label);
                    self.credentials.refresh_since(seen_generation).await?;
                    result.refreshes += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "{}: {} records over {} pages",
            collection.label,
            result.records.len(),
            result.pages
        );
        Ok(result)
    }
}
