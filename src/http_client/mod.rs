//! HTTP client for upstream API calls.
//!
//! Wraps `reqwest::Client` with a per-run courtesy throttle and bearer/query
//! token placement. Transport failures and timeouts surface as
//! `HarvestError::TransientNetwork`; classifying the response body is left to
//! the caller.

mod response;

pub use response::{classify_status, ApiResponse, ResponseClass};

use std::time::Duration;

use reqwest::{Client, Method};
use tracing::debug;

use crate::error::{HarvestError, Result};
use crate::rate_limit::{RequestThrottle, ThrottleConfig};

/// Default user agent for API requests.
pub const USER_AGENT: &str = concat!("harvester/", env!("CARGO_PKG_VERSION"));

/// Where the access token travels on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPlacement {
    /// `Authorization: Bearer <token>` header.
    Bearer,
    /// Query parameter, e.g. `access_token=<token>` for the Graph API.
    Query(String),
}

/// One outbound API request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }
}

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    throttle: Option<RequestThrottle>,
}

impl HttpClientBuilder {
    pub fn user_agent(mut self, ua: &str) -> Self {
        self.user_agent = Some(ua.to_string());
        self
    }

    /// Share a throttle with other clients in the same run.
    pub fn throttle(mut self, throttle: RequestThrottle) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn build(self) -> Result<HttpClient> {
        let user_agent = self.user_agent.unwrap_or_else(|| USER_AGENT.to_string());
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(self.timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| HarvestError::Config(format!("cannot build HTTP client: {}", e)))?;

        let throttle = self
            .throttle
            .unwrap_or_else(|| RequestThrottle::new(ThrottleConfig::default()));

        Ok(HttpClient { client, throttle })
    }
}

/// Throttled HTTP client. Cheap to clone.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    throttle: RequestThrottle,
}

impl HttpClient {
    pub fn builder(timeout: Duration) -> HttpClientBuilder {
        HttpClientBuilder {
            timeout,
            user_agent: None,
            throttle: None,
        }
    }

    /// Send a request carrying `token` and read the full body.
    pub async fn send(
        &self,
        request: &ApiRequest,
        token: &str,
        placement: &TokenPlacement,
    ) -> Result<ApiResponse> {
        self.throttle.acquire().await;

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .query(&request.query);
        builder = match placement {
            TokenPlacement::Bearer => builder.bearer_auth(token),
            TokenPlacement::Query(param) => builder.query(&[(param.as_str(), token)]),
        };
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        debug!("{} {}", request.method, request.url);
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(ApiResponse::new(status.as_u16(), body))
    }

    /// POST a form without credentials (token endpoints).
    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<ApiResponse> {
        self.throttle.acquire().await;
        debug!("POST {} (form)", url);
        let response = self.client.post(url).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(ApiResponse::new(status.as_u16(), body))
    }
}
