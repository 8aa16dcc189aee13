//! Scripted fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use harvester::credentials::{Credential, CredentialBackend, CredentialStore, TokenExchange};
use harvester::harvest::{CancelToken, CollectionRef, Cursor, PageFetcher, PagingRules, RawPage};
use harvester::http_client::{ApiRequest, TokenPlacement};
use harvester::{HarvestError, Result};

/// One scripted response.
pub enum Step {
    Page(Vec<Value>, Option<&'static str>),
    Auth,
    Transient,
    Malformed,
    /// Trip the cancel token, then serve the page.
    CancelThen(Vec<Value>, Option<&'static str>),
}

/// Serves scripted pages per collection label and records every call.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
    cancel: Mutex<Option<CancelToken>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, label: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(label.to_string(), steps.into());
        self
    }

    pub fn cancelling(self, cancel: CancelToken) -> Self {
        *self.cancel.lock().unwrap() = Some(cancel);
        self
    }

    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn cursors(&self, label: &str) -> Vec<Option<String>> {
        self.calls()
            .into_iter()
            .filter(|(l, _)| l == label)
            .map(|(_, c)| c)
            .collect()
    }
}

fn page(records: Vec<Value>, cursor: Option<&str>) -> RawPage {
    RawPage {
        records,
        next_cursor: cursor.map(|c| Cursor(c.to_string())),
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, collection: &CollectionRef, cursor: Option<&Cursor>) -> Result<RawPage> {
        self.calls.lock().unwrap().push((
            collection.label.clone(),
            cursor.map(|c| c.as_str().to_string()),
        ));
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&collection.label)
            .and_then(|s| s.pop_front());

        match step {
            Some(Step::Page(records, next)) => Ok(page(records, next)),
            Some(Step::CancelThen(records, next)) => {
                if let Some(ref cancel) = *self.cancel.lock().unwrap() {
                    cancel.cancel();
                }
                Ok(page(records, next))
            }
            Some(Step::Auth) => Err(HarvestError::Auth("HTTP 401".into())),
            Some(Step::Transient) => Err(HarvestError::TransientNetwork("HTTP 503".into())),
            Some(Step::Malformed) => Err(HarvestError::malformed("invalid JSON", "<html>")),
            None => Err(HarvestError::Rejected {
                status: 404,
                body: format!("script exhausted for {}", collection.label),
            }),
        }
    }
}

/// Counts exchanges; hands out `fresh-<n>` tokens.
#[derive(Default)]
pub struct CountingExchange {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl CountingExchange {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenExchange for CountingExchange {
    async fn exchange(&self, _refresh_token: &str) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(HarvestError::AuthRefresh("invalid_grant".into()));
        }
        Ok(format!("fresh-{}", n))
    }
}

/// Keeps saved tokens in memory.
#[derive(Default)]
pub struct MemoryBackend {
    pub saved: Mutex<Vec<String>>,
}

#[async_trait]
impl CredentialBackend for MemoryBackend {
    async fn load(&self) -> Result<Credential> {
        Ok(Credential {
            access_token: "stale".into(),
            refresh_token: "refresh".into(),
        })
    }

    async fn save_access_token(&self, token: &str) -> Result<()> {
        self.saved.lock().unwrap().push(token.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}

pub fn credentials(exchange: Arc<CountingExchange>) -> (CredentialStore, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::default());
    let store = CredentialStore::with_credential(
        Credential {
            access_token: "stale".into(),
            refresh_token: "refresh".into(),
        },
        backend.clone(),
        exchange,
    );
    (store, backend)
}

/// A GET collection with Google-style paging.
pub fn collection(label: &str) -> CollectionRef {
    CollectionRef {
        label: label.to_string(),
        request: ApiRequest::get(format!("https://example.com/{}", label)),
        paging: PagingRules {
            cursor_param: "pageToken".into(),
            cursor_path: "nextPageToken".into(),
            records_path: "reviews".into(),
            token_placement: TokenPlacement::Bearer,
        },
    }
}

pub fn review(id: &str, comment: &str) -> Value {
    json!({"reviewId": id, "starRating": "FIVE", "comment": comment})
}
