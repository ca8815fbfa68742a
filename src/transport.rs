//! Transport abstraction for the administration API.
//!
//! The [`Transport`] trait executes one JSON-over-HTTP exchange. The core
//! components (auth flow, sync engine) only ever talk to this trait, so the
//! same logic runs against a `reqwest` client, a browser `fetch` bridge, or a
//! scripted test double.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use scum_admin_client::error::AdminClientError;
//! use scum_admin_client::transport::{ApiRequest, ApiResponse, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, AdminClientError> {
//!         // Send `request` to `<base>{request.path}` and collect the reply.
//!         Ok(ApiResponse::new(200, "{}"))
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AdminClientError, Result};
use crate::protocol::ErrorBody;

/// HTTP method of an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A single request against the administration API.
///
/// `path` is relative to the API base URL (e.g. `/status`).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    /// Bearer credential, frozen at construction time.
    pub bearer: Option<String>,
    /// JSON body for `POST` requests.
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Build a `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            bearer: None,
            body: None,
        }
    }

    /// Build a `POST` request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`AdminClientError::Serialization`] if `body` cannot be encoded.
    pub fn post_json(path: impl Into<String>, body: &impl Serialize) -> Result<Self> {
        Ok(Self {
            method: Method::Post,
            path: path.into(),
            bearer: None,
            body: Some(serde_json::to_value(body)?),
        })
    }

    /// Attach a bearer token.
    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// Raw reply from the administration API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// `true` for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`AdminClientError::Serialization`] if the body is not valid JSON
    /// for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// The `error` field of the body, if the body is JSON and carries one.
    pub fn error_message(&self) -> Option<String> {
        serde_json::from_str::<ErrorBody>(&self.body)
            .ok()
            .and_then(|b| b.error)
            .filter(|m| !m.trim().is_empty())
    }

    /// Decode a successful body, or turn a non-success reply into
    /// [`AdminClientError::Status`].
    ///
    /// # Errors
    ///
    /// Returns [`AdminClientError::Status`] for a non-2xx status and
    /// [`AdminClientError::Serialization`] for an undecodable body.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T> {
        if !self.is_success() {
            let message = self.error_message().unwrap_or(self.body);
            return Err(AdminClientError::Status {
                status: self.status,
                message,
            });
        }
        self.json()
    }
}

/// Executes requests against the administration API.
///
/// # Object Safety
///
/// This trait is object-safe; the client shares one transport between the
/// auth flow and every poll task as `Arc<dyn Transport>`.
///
/// # Concurrency
///
/// `execute` takes `&self` and may be called concurrently. Status and vehicle
/// fetches of one poll cycle overlap, and a slow response from one cycle may
/// still be pending when the next cycle starts.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Perform one request and return the raw reply.
    ///
    /// A non-2xx status is **not** an error at this layer; it is returned as an
    /// [`ApiResponse`] so callers can read the error body.
    ///
    /// # Errors
    ///
    /// Returns [`AdminClientError::Http`] or [`AdminClientError::Timeout`] when
    /// no reply could be obtained.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        assert!(ApiResponse::new(200, "").is_success());
        assert!(ApiResponse::new(204, "").is_success());
        assert!(!ApiResponse::new(199, "").is_success());
        assert!(!ApiResponse::new(401, "").is_success());
    }

    #[test]
    fn error_message_reads_error_field() {
        let res = ApiResponse::new(401, r#"{"error":"Identifiants invalides"}"#);
        assert_eq!(res.error_message().as_deref(), Some("Identifiants invalides"));
    }

    #[test]
    fn error_message_absent_for_non_json_or_blank() {
        assert!(ApiResponse::new(500, "<html>").error_message().is_none());
        assert!(ApiResponse::new(500, r#"{"error":""}"#).error_message().is_none());
        assert!(ApiResponse::new(500, "{}").error_message().is_none());
    }

    #[test]
    fn into_json_maps_non_success_to_status_error() {
        let err = ApiResponse::new(500, "boom")
            .into_json::<serde_json::Value>()
            .unwrap_err();
        match err {
            AdminClientError::Status { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn with_bearer_sets_token() {
        let req = ApiRequest::get("/status").with_bearer("T1");
        assert_eq!(req.bearer.as_deref(), Some("T1"));
        assert_eq!(req.method, Method::Get);
        assert!(req.body.is_none());
    }
}
