//! # SCUM Admin Client
//!
//! Client-side core of the SCUM server administration dashboard: operator
//! authentication, a persisted session, and a polling engine that mirrors the
//! server's status and vehicle inventory into a live, renderable view.
//!
//! ## Components
//!
//! - **Session store** ([`SessionStore`]): the single owner of the bearer
//!   token and identity, persisted through a [`KeyValueStore`]
//! - **Auth flow** ([`AuthFlow`]): login / registration against the API
//! - **Sync engine** ([`SyncEngine`]): fixed-cadence polling of `/status` and
//!   `/vehicles`, with stale-but-available failure handling and a liveness
//!   epoch that drops replies arriving after logout
//! - **Renderer** ([`render`]): pure projection into a [`View`]
//! - **Transport-agnostic**: implement [`Transport`] for any HTTP stack; the
//!   default `transport-http` feature provides `HttpTransport`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scum_admin_client::{AdminClient, ClientConfig, Credentials};
//!
//! let mut client = AdminClient::from_config(ClientConfig::from_env())?;
//! if !client.resume() {
//!     client.submit(&Credentials::new("ops@example.com", "secret")).await?;
//! }
//! println!("{}", client.view());
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod render;
pub mod session;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use auth::{AuthFlow, AuthMode, Credentials};
pub use client::AdminClient;
pub use config::ClientConfig;
pub use error::AdminClientError;
pub use protocol::{Role, StatusSnapshot, User, VehicleRecord, VehicleState};
pub use render::View;
pub use session::{Session, SessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use sync::{SyncEngine, SyncEvent, SyncState};
pub use transport::{ApiRequest, ApiResponse, Transport};

#[cfg(feature = "transport-http")]
pub use transports::HttpTransport;
