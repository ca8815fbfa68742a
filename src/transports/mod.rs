//! Transport implementations for the administration API.
//!
//! This module provides concrete [`Transport`](crate::Transport) implementations
//! behind feature gates. Enable the corresponding Cargo feature to pull in
//! a transport:
//!
//! | Feature          | Transport         |
//! |------------------|-------------------|
//! | `transport-http` | [`HttpTransport`] |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), scum_admin_client::AdminClientError> {
//! use scum_admin_client::{ApiRequest, HttpTransport, Transport};
//!
//! let http = HttpTransport::new("http://localhost:4000/api")?;
//! let reply = http.execute(ApiRequest::get("/status").with_bearer("T1")).await?;
//! println!("{} {}", reply.status, reply.body);
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-http")]
pub mod http;

#[cfg(feature = "transport-http")]
pub use http::HttpTransport;
