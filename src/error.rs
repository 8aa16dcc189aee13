//! Harvest error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarvestError>;

/// Maximum number of payload bytes kept on a malformed-response error.
const PAYLOAD_PREVIEW_BYTES: usize = 2048;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// Upstream rejected the bearer credential. Recoverable once per pass via refresh.
    #[error("Credential rejected: {0}")]
    Auth(String),
    /// Exchanging the refresh secret failed. Fatal to the run.
    #[error("Credential refresh failed: {0}")]
    AuthRefresh(String),
    #[error("Transient network error: {0}")]
    TransientNetwork(String),
    #[error("Malformed response: {reason} (payload: {payload})")]
    MalformedResponse { reason: String, payload: String },
    #[error("Cannot normalize record: {0}")]
    Normalization(String),
    #[error("Pagination limit of {limit} pages exceeded for {collection}")]
    PaginationLimitExceeded { collection: String, limit: usize },
    #[error("Cannot read table {table}: {reason}")]
    PersistenceRead { table: String, reason: String },
    #[error("Cannot write table {table}: {reason}")]
    PersistenceWrite { table: String, reason: String },
    #[error("Upstream rejected request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Harvest cancelled")]
    Cancelled,
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HarvestError {
    /// Build a malformed-response error, truncating the payload kept for diagnosis.
    pub fn malformed(reason: impl Into<String>, payload: &str) -> Self {
        HarvestError::MalformedResponse {
            reason: reason.into(),
            payload: truncate(payload, PAYLOAD_PREVIEW_BYTES),
        }
    }

    pub fn read(table: &str, reason: impl ToString) -> Self {
        HarvestError::PersistenceRead {
            table: table.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn write(table: &str, reason: impl ToString) -> Self {
        HarvestError::PersistenceWrite {
            table: table.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, HarvestError::Auth(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, HarvestError::TransientNetwork(_))
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(e: reqwest::Error) -> Self {
        HarvestError::TransientNetwork(e.to_string())
    }
}

/// Truncate on a char boundary at or below `max` bytes.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
