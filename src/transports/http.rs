//! HTTP transport implementation using `reqwest`.
//!
//! [`HttpTransport`] joins each request path onto a fixed API base URL, sends
//! JSON bodies, and attaches bearer credentials with the standard
//! `Authorization: Bearer <token>` header.
//!
//! # Feature gate
//!
//! This module is only available when the `transport-http` feature is enabled
//! (it is enabled by default).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AdminClientError, Result};
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A [`Transport`] backed by a shared `reqwest` connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the given API base URL with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AdminClientError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a transport with an explicit per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AdminClientError::Http`] if the HTTP client cannot be built.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdminClientError::Http(e.to_string()))?;
        Ok(Self::from_client(client, base_url))
    }

    /// Wrap an existing `reqwest` client (custom TLS, proxies, headers).
    pub fn from_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// The API base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> AdminClientError {
    if e.is_timeout() {
        AdminClientError::Timeout
    } else {
        AdminClientError::Http(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = self.url_for(&request.path);
        tracing::debug!(method = request.method.as_str(), url = %url, "sending request");

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;

        tracing::debug!(url = %url, status, "response received");
        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let t = HttpTransport::new("http://localhost:4000/api/").unwrap();
        assert_eq!(t.base_url(), "http://localhost:4000/api");
        assert_eq!(t.url_for("/status"), "http://localhost:4000/api/status");
        assert_eq!(t.url_for("vehicles"), "http://localhost:4000/api/vehicles");
    }
}
