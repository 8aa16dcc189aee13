//! Configuration loading.
//!
//! Settings come from a TOML file (`harvest.toml` unless `--config` or
//! `HARVEST_CONFIG` names another) with a few environment overrides for
//! secrets. Relative paths resolve against the config file's directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::{ClientSecrets, GOOGLE_TOKEN_URL};
use crate::error::{HarvestError, Result};
use crate::harvest::DEFAULT_MAX_PAGES;
use crate::jobs::{validate_jobs, JobConfig};
use crate::rate_limit::ThrottleConfig;

/// Config file used when none is named.
pub const DEFAULT_CONFIG_FILE: &str = "harvest.toml";

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "HARVEST_CONFIG";

/// Token files, one token per file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_access_token_file")]
    pub access_token_file: String,
    #[serde(default = "default_refresh_token_file")]
    pub refresh_token_file: String,
}

fn default_access_token_file() -> String {
    "access_token.txt".to_string()
}

fn default_refresh_token_file() -> String {
    "refresh_token.txt".to_string()
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            access_token_file: default_access_token_file(),
            refresh_token_file: default_refresh_token_file(),
        }
    }
}

/// OAuth client used for the refresh-token grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Google Cloud client secrets JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secrets_file: Option<String>,
}

fn default_token_url() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            client_id: None,
            client_secret: None,
            client_secrets_file: None,
        }
    }
}

impl OAuthConfig {
    /// `HARVEST_CLIENT_ID` / `HARVEST_CLIENT_SECRET` win over the file.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(id) = env_var("HARVEST_CLIENT_ID") {
            debug!("Using HARVEST_CLIENT_ID from environment");
            self.client_id = Some(id);
        }
        if let Some(secret) = env_var("HARVEST_CLIENT_SECRET") {
            debug!("Using HARVEST_CLIENT_SECRET from environment");
            self.client_secret = Some(secret);
        }
        self
    }

    /// Resolve the client secrets. `None` when no OAuth client is configured.
    pub async fn secrets(&self, base_dir: &Path) -> Result<Option<ClientSecrets>> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => {
                return Ok(Some(ClientSecrets {
                    client_id: id.clone(),
                    client_secret: secret.clone(),
                }))
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(HarvestError::Config(
                    "oauth needs both client_id and client_secret".into(),
                ))
            }
            (None, None) => {}
        }
        match self.client_secrets_file {
            Some(ref file) => ClientSecrets::from_file(&resolve_path(base_dir, file))
                .await
                .map(Some),
            None => Ok(None),
        }
    }
}

/// Request pacing and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum spacing between requests.
    #[serde(default)]
    pub request_delay_ms: u64,
    /// Pause after this many requests (0 disables).
    #[serde(default = "default_pause_every")]
    pub pause_every: u64,
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Cycles in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_storage_timeout_secs")]
    pub storage_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_pause_every() -> u64 {
    30
}
fn default_pause_secs() -> u64 {
    10
}
fn default_max_pages() -> usize {
    DEFAULT_MAX_PAGES
}
fn default_concurrency() -> usize {
    1
}
fn default_storage_timeout_secs() -> u64 {
    60
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout_secs: default_timeout_secs(),
            request_delay_ms: 0,
            pause_every: default_pause_every(),
            pause_secs: default_pause_secs(),
            max_pages: default_max_pages(),
            concurrency: default_concurrency(),
            storage_timeout_secs: default_storage_timeout_secs(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }

    pub fn throttle(&self) -> ThrottleConfig {
        ThrottleConfig {
            min_delay: Duration::from_millis(self.request_delay_ms),
            pause_every: self.pause_every,
            pause: Duration::from_secs(self.pause_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One TSV file per table.
    #[default]
    Tsv,
    /// All tables as sheets of one workbook file.
    Workbook,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Directory for the TSV backend.
    #[serde(default = "default_storage_dir")]
    pub dir: String,
    /// Workbook file for the workbook backend.
    #[serde(default = "default_workbook_path")]
    pub path: String,
}

fn default_storage_dir() -> String {
    "data".to_string()
}

fn default_workbook_path() -> String {
    "harvest.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            dir: default_storage_dir(),
            path: default_workbook_path(),
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jobs: Vec<JobConfig>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load from `path`, or from `harvest.toml` in the working directory.
    ///
    /// A named file must exist; a missing default file yields the defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path).await,
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    Self::load_from_path(&path).await
                } else {
                    debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    let mut config = Self::default();
                    config.oauth = config.oauth.with_env_overrides();
                    Ok(config)
                }
            }
        }
    }

    pub async fn load_from_path(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            HarvestError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml(&contents)
            .map_err(|e| HarvestError::Config(format!("{}: {}", path.display(), e)))?;
        config.source_path = Some(path.to_path_buf());
        config.oauth = config.oauth.with_env_overrides();
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| HarvestError::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.http.concurrency == 0 {
            return Err(HarvestError::Config("http.concurrency must be at least 1".into()));
        }
        if self.http.max_pages == 0 {
            return Err(HarvestError::Config("http.max_pages must be at least 1".into()));
        }
        validate_jobs(&self.jobs)
    }

    /// Directory relative paths are resolved against.
    pub fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        resolve_path(&self.base_dir(), path)
    }
}

fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}
