//! Shared plumbing for the OpenAI-compatible capability clients.

use crate::defaults;
use crate::error::{Result, VoxgateError};
use std::fmt;
use std::time::Duration;

/// Base URL and credential of one remote capability.
#[derive(Clone)]
pub struct ApiEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl ApiEndpoint {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Joins `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Adds bearer auth when a key is configured.
    pub fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) if !key.is_empty() => request.bearer_auth(key),
            _ => request,
        }
    }
}

impl Default for ApiEndpoint {
    fn default() -> Self {
        Self::new(defaults::API_BASE, None)
    }
}

impl fmt::Debug for ApiEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiEndpoint")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Builds a client with a whole-request timeout and the shared connect timeout.
///
/// Every remote call goes through a client built here, so none is unbounded.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    if timeout.is_zero() {
        return Err(VoxgateError::HttpClient {
            message: "request timeout must be greater than zero".to_string(),
        });
    }
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(defaults::CONNECT_TIMEOUT_SECS))
        .user_agent(concat!("voxgate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| VoxgateError::HttpClient {
            message: e.to_string(),
        })
}

/// Describes a non-success response, keeping a bounded slice of the body.
pub async fn describe_failure(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(300).collect();
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    }
}
