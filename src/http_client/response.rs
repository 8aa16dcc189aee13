//! API response wrapper and classification.

use serde_json::Value;

use crate::error::{HarvestError, Result};

/// Coarse outcome of an upstream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    /// Credential invalid or expired.
    Unauthorized,
    /// Timeout, throttling or server fault.
    Transient,
    /// Any other client error.
    Rejected,
}

/// Classify by status code alone.
pub fn classify_status(status: u16) -> ResponseClass {
    match status {
        200..=299 => ResponseClass::Success,
        401 => ResponseClass::Unauthorized,
        408 | 429 => ResponseClass::Transient,
        500..=599 => ResponseClass::Transient,
        _ => ResponseClass::Rejected,
    }
}

/// Fully-read API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: String) -> Self {
        Self { status, body }
    }

    /// Classify using both the status and well-known error bodies.
    ///
    /// Google APIs report `error.status = "UNAUTHENTICATED"`; the Graph API
    /// answers expired tokens with HTTP 400 and `error.code = 190`. Graph
    /// tags nearly every error `OAuthException`, so the type alone says
    /// nothing about the token.
    pub fn class(&self) -> ResponseClass {
        let by_status = classify_status(self.status);
        if by_status == ResponseClass::Unauthorized || self.body_signals_auth_failure() {
            return ResponseClass::Unauthorized;
        }
        by_status
    }

    fn body_signals_auth_failure(&self) -> bool {
        let Ok(data) = serde_json::from_str::<Value>(&self.body) else {
            return false;
        };
        let error = &data["error"];
        if !error.is_object() {
            return false;
        }
        error["status"].as_str() == Some("UNAUTHENTICATED") || error["code"].as_i64() == Some(190)
    }

    /// Decode the body as JSON.
    pub fn json(&self) -> Result<Value> {
        serde_json::from_str(&self.body)
            .map_err(|e| HarvestError::malformed(format!("invalid JSON: {}", e), &self.body))
    }

    /// Convert a non-success response into the matching error.
    pub fn into_error(self) -> HarvestError {
        let summary = crate::error::truncate(&self.body, 512);
        match self.class() {
            ResponseClass::Unauthorized => {
                HarvestError::Auth(format!("HTTP {}: {}", self.status, summary))
            }
            ResponseClass::Transient => {
                HarvestError::TransientNetwork(format!("HTTP {}: {}", self.status, summary))
            }
            _ => HarvestError::Rejected {
                status: self.status,
                body: summary,
            },
        }
    }
}
