//! Durable credential storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::Credential;
use crate::error::{HarvestError, Result};
use crate::utils::replace_file;

/// Durable home of the credential.
///
/// `CredentialStore` is the only caller of `save_access_token`; nothing in
/// the harvester ever deletes a stored credential.
#[async_trait]
pub trait CredentialBackend: Send + Sync {
    async fn load(&self) -> Result<Credential>;
    async fn save_access_token(&self, token: &str) -> Result<()>;
    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Access and refresh tokens kept in two plain-text files.
#[derive(Debug, Clone)]
pub struct TokenFiles {
    pub access_token_file: PathBuf,
    pub refresh_token_file: PathBuf,
}

impl TokenFiles {
    pub fn new(access_token_file: PathBuf, refresh_token_file: PathBuf) -> Self {
        Self {
            access_token_file,
            refresh_token_file,
        }
    }
}

async fn read_token(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => Ok(s.trim().to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(HarvestError::Config(format!(
            "cannot read token file {}: {}",
            path.display(),
            e
        ))),
    }
}

#[async_trait]
impl CredentialBackend for TokenFiles {
    async fn load(&self) -> Result<Credential> {
        // Either file may be missing: without an access token the first
        // request fails auth and refreshes; without a refresh token the access
        // token is used until it expires.
        let access_token = read_token(&self.access_token_file).await?;
        let refresh_token = read_token(&self.refresh_token_file).await?;
        if access_token.is_empty() && refresh_token.is_empty() {
            return Err(HarvestError::Config(format!(
                "no token in {} or {}",
                self.access_token_file.display(),
                self.refresh_token_file.display()
            )));
        }
        Ok(Credential {
            access_token,
            refresh_token,
        })
    }

    async fn save_access_token(&self, token: &str) -> Result<()> {
        replace_file(self.access_token_file.clone(), token.as_bytes().to_vec())
            .await
            .map_err(|e| {
                HarvestError::write(&self.access_token_file.display().to_string(), e)
            })
    }

    fn describe(&self) -> String {
        self.access_token_file.display().to_string()
    }
}
