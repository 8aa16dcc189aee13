//! Bearer credential lifecycle.
//!
//! [`CredentialStore`] owns the in-memory credential for a run, hands out the
//! current access token, and is the only component that refreshes and
//! persists it. Refreshes are serialized: callers that saw an older token
//! generation reuse a refresh that already completed instead of exchanging
//! the refresh secret again.

mod exchange;
mod file;

pub use exchange::{ClientSecrets, DisabledExchange, OAuthTokenExchange, TokenExchange, GOOGLE_TOKEN_URL};
pub use file::{CredentialBackend, TokenFiles};

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{HarvestError, Result};

/// Bearer credential and its refresh secret.
#[derive(Clone)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
struct TokenState {
    credential: Credential,
    /// Bumped on every successful refresh.
    generation: u64,
}

/// Current access token plus the generation it belongs to.
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    pub token: String,
    pub generation: u64,
}

/// Shared credential store. Cloning shares state.
#[derive(Clone)]
pub struct CredentialStore {
    state: Arc<RwLock<TokenState>>,
    refresh_gate: Arc<Mutex<()>>,
    exchange: Arc<dyn TokenExchange>,
    backend: Arc<dyn CredentialBackend>,
}

impl CredentialStore {
    /// Load the credential from durable storage.
    pub async fn open(
        backend: Arc<dyn CredentialBackend>,
        exchange: Arc<dyn TokenExchange>,
    ) -> Result<Self> {
        let credential = backend.load().await?;
        debug!("Loaded credential from {}", backend.describe());
        Ok(Self::with_credential(credential, backend, exchange))
    }

    /// Build a store around an already-loaded credential.
    pub fn with_credential(
        credential: Credential,
        backend: Arc<dyn CredentialBackend>,
        exchange: Arc<dyn TokenExchange>,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(TokenState {
                credential,
                generation: 0,
            })),
            refresh_gate: Arc::new(Mutex::new(())),
            exchange,
            backend,
        }
    }

    /// Current access token. No network call.
    pub async fn current(&self) -> String {
        self.state.read().await.credential.access_token.clone()
    }

    /// Current access token together with its generation.
    pub async fn snapshot(&self) -> TokenSnapshot {
        let state = self.state.read().await;
        TokenSnapshot {
            token: state.credential.access_token.clone(),
            generation: state.generation,
        }
    }

    /// Unconditionally exchange the refresh secret for a new access token.
    pub async fn refresh(&self) -> Result<()> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    /// Refresh unless another caller already refreshed past `seen_generation`.
    ///
    /// Concurrent callers that observed the same rejected token wait on the
    /// gate; the first one exchanges, the rest find a newer generation and
    /// return without a second exchange.
    pub async fn refresh_since(&self, seen_generation: u64) -> Result<()> {
        let _gate = self.refresh_gate.lock().await;
        let generation = self.state.read().await.generation;
        if generation > seen_generation {
            debug!(
                "Credential already refreshed (generation {} > {}), reusing",
                generation, seen_generation
            );
            return Ok(());
        }
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<()> {
        let refresh_token = self.state.read().await.credential.refresh_token.clone();
        if refresh_token.trim().is_empty() {
            return Err(HarvestError::AuthRefresh(
                "no refresh token available".to_string(),
            ));
        }

        let access_token = self
            .exchange
            .exchange(&refresh_token)
            .await
            .map_err(|e| match e {
                HarvestError::AuthRefresh(_) => e,
                other => HarvestError::AuthRefresh(other.to_string()),
            })?;
        if access_token.is_empty() {
            return Err(HarvestError::AuthRefresh(
                "token endpoint returned an empty access token".to_string(),
            ));
        }

        // Persist before publishing so a crash never leaves memory ahead of disk.
        if let Err(e) = self.backend.save_access_token(&access_token).await {
            warn!("Refreshed token could not be persisted: {}", e);
            return Err(HarvestError::AuthRefresh(format!(
                "cannot persist refreshed token: {}",
                e
            )));
        }

        let mut state = self.state.write().await;
        state.credential.access_token = access_token;
        state.generation += 1;
        info!("Access token refreshed (generation {})", state.generation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExchange {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TokenExchange for CountingExchange {
        async fn exchange(&self, refresh_token: &str) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            // Give concurrent callers a chance to pile up on the gate.
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if self.fail {
                return Err(HarvestError::AuthRefresh("invalid_grant".into()));
            }
            Ok(format!("{}-access-{}", refresh_token, n))
        }
    }

    #[derive(Default)]
    struct RecordingBackend {
        saved: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CredentialBackend for RecordingBackend {
        async fn load(&self) -> Result<Credential> {
            Ok(Credential {
                access_token: "stale".into(),
                refresh_token: "r".into(),
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

    fn store(fail: bool) -> (CredentialStore, Arc<CountingExchange>, Arc<RecordingBackend>) {
        let exchange = Arc::new(CountingExchange {
            calls: AtomicUsize::new(0),
            fail,
        });
        let backend = Arc::new(RecordingBackend::default());
        let store = CredentialStore::with_credential(
            Credential {
                access_token: "stale".into(),
                refresh_token: "r".into(),
            },
            backend.clone(),
            exchange.clone(),
        );
        (store, exchange, backend)
    }

    #[tokio::test]
    async fn test_refresh_updates_and_persists() {
        let (store, exchange, backend) = store(false);
        assert_eq!(store.current().await, "stale");

        store.refresh().await.unwrap();

        assert_eq!(store.current().await, "r-access-1");
        assert_eq!(store.snapshot().await.generation, 1);
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*backend.saved.lock().unwrap(), vec!["r-access-1".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_old_token() {
        let (store, _, backend) = store(true);
        let err = store.refresh().await.unwrap_err();
        assert!(matches!(err, HarvestError::AuthRefresh(_)));
        assert_eq!(store.current().await, "stale");
        assert!(backend.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_are_coalesced() {
        let (store, exchange, _) = store(false);
        let seen = store.snapshot().await.generation;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.refresh_since(seen).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.current().await, "r-access-1");
    }

    #[tokio::test]
    async fn test_missing_refresh_token() {
        let exchange = Arc::new(CountingExchange {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let store = CredentialStore::with_credential(
            Credential {
                access_token: "a".into(),
                refresh_token: "  ".into(),
            },
            Arc::new(RecordingBackend::default()),
            exchange.clone(),
        );
        assert!(matches!(
            store.refresh().await,
            Err(HarvestError::AuthRefresh(_))
        ));
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 0);
    }
}
