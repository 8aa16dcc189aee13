//! OAuth2 refresh-token exchange.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{HarvestError, Result};
use crate::http_client::HttpClient;

/// Default Google OAuth token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://accounts.google.com/o/oauth2/token";

/// Exchanges a refresh secret for a new access token.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> Result<String>;
}

/// OAuth client identifier and secret.
#[derive(Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    web: Option<ClientSecrets>,
    installed: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parse a Google Cloud client secrets document (`{"web": {...}}` or
    /// `{"installed": {...}}`).
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(json)
            .map_err(|e| HarvestError::Config(format!("invalid client secrets: {}", e)))?;
        file.web.or(file.installed).ok_or_else(|| {
            HarvestError::Config("client secrets has neither 'web' nor 'installed'".to_string())
        })
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            HarvestError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Refresh-token grant against an OAuth2 token endpoint.
pub struct OAuthTokenExchange {
    client: HttpClient,
    token_url: String,
    secrets: ClientSecrets,
}

impl OAuthTokenExchange {
    pub fn new(client: HttpClient, token_url: impl Into<String>, secrets: ClientSecrets) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            secrets,
        }
    }
}

#[async_trait]
impl TokenExchange for OAuthTokenExchange {
    async fn exchange(&self, refresh_token: &str) -> Result<String> {
        debug!("Exchanging refresh token at {}", self.token_url);
        let form = [
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("refresh_token", refresh_token.trim()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post_form(&self.token_url, &form)
            .await
            .map_err(|e| HarvestError::AuthRefresh(format!("token endpoint unreachable: {}", e)))?;

        parse_token_response(response.status, &response.body)
    }
}

/// Stand-in when no OAuth client is configured. Every refresh fails.
pub struct DisabledExchange {
    reason: String,
}

impl DisabledExchange {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TokenExchange for DisabledExchange {
    async fn exchange(&self, _refresh_token: &str) -> Result<String> {
        Err(HarvestError::AuthRefresh(self.reason.clone()))
    }
}

fn parse_token_response(status: u16, body: &str) -> Result<String> {
    let parsed: TokenResponse = serde_json::from_str(body).map_err(|e| {
        HarvestError::AuthRefresh(format!("HTTP {}: unreadable token response: {}", status, e))
    })?;

    match parsed.access_token {
        Some(token) if (200..300).contains(&status) && !token.is_empty() => Ok(token),
        _ => Err(HarvestError::AuthRefresh(format!(
            "HTTP {}: {}{}",
            status,
            parsed.error.as_deref().unwrap_or("no access_token in response"),
            parsed
                .error_description
                .map(|d| format!(" ({})", d))
                .unwrap_or_default()
        ))),
    }
}
