//! Admin client: wires the session store, auth flow, sync engine and renderer.
//!
//! [`AdminClient`] owns one of each component and enforces the lifecycle:
//!
//! - a successful [`submit`](AdminClient::submit) saves the session and starts
//!   polling with the new token;
//! - [`resume`](AdminClient::resume) starts polling for a session restored
//!   from storage;
//! - [`logout`](AdminClient::logout) stops polling, then clears the session;
//! - [`view`](AdminClient::view) renders whatever the current state is.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut client = AdminClient::new(transport, storage, ClientConfig::from_env());
//!
//! if !client.resume() {
//!     client.submit(&Credentials::new("a@b.com", "secret")).await?;
//! }
//!
//! let mut state = client.subscribe_sync().expect("polling");
//! while state.changed().await.is_ok() {
//!     println!("{}", client.view());
//! }
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::auth::{AuthFlow, AuthMode, Credentials};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::render::{self, View};
use crate::session::{Session, SessionStore};
use crate::storage::KeyValueStore;
use crate::sync::{SyncEngine, SyncEvent, SyncState};
use crate::transport::Transport;

/// The client-side application state for one operator.
pub struct AdminClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    session: SessionStore,
    auth: AuthFlow,
    /// Running engine, present only while a session is active.
    sync: Option<SyncEngine>,
    /// Event receiver of the current engine, until taken by the caller.
    events: Option<mpsc::Receiver<SyncEvent>>,
}

impl AdminClient {
    /// Create a client and restore any persisted session.
    ///
    /// Polling does not start until [`resume`](Self::resume) or a successful
    /// [`submit`](Self::submit).
    pub fn new(
        transport: impl Transport,
        storage: Arc<dyn KeyValueStore>,
        config: ClientConfig,
    ) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        Self {
            auth: AuthFlow::new(Arc::clone(&transport)),
            session: SessionStore::load(storage),
            transport,
            config,
            sync: None,
            events: None,
        }
    }

    /// Build a client backed by HTTP and the on-disk session file from
    /// `config` (or an in-memory store when no session path is known).
    ///
    /// # Errors
    ///
    /// Returns [`AdminClientError::Http`](crate::AdminClientError::Http) if the
    /// HTTP client cannot be built.
    #[cfg(feature = "transport-http")]
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        use crate::storage::{FileStore, MemoryStore};
        use crate::transports::HttpTransport;

        let transport = HttpTransport::with_timeout(&config.base_url, config.request_timeout)?;
        let storage: Arc<dyn KeyValueStore> = match &config.session_path {
            Some(path) => Arc::new(FileStore::new(path)),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::new(transport, storage, config))
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Start polling if a session is present and polling is not running.
    ///
    /// Returns `true` when polling is active afterwards. Must be called from
    /// within a tokio runtime.
    pub fn resume(&mut self) -> bool {
        if self.sync.as_ref().is_some_and(SyncEngine::is_active) {
            return true;
        }
        match self.session.current() {
            Some(session) => {
                self.activate(&session);
                true
            }
            None => false,
        }
    }

    /// Submit the auth form in its current mode.
    ///
    /// On success the session is saved and polling (re)starts with the new
    /// token. On failure the error is available from [`auth`](Self::auth) and
    /// nothing else changes.
    ///
    /// # Errors
    ///
    /// Propagates the failure from [`AuthFlow::submit`].
    pub async fn submit(&mut self, credentials: &Credentials) -> Result<Session> {
        let session = self.auth.submit(credentials, &self.session).await?;
        self.activate(&session);
        Ok(session)
    }

    /// Stop polling and forget the session.
    ///
    /// Polling is stopped first, so no reply can repopulate the dashboard.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the persisted session could not be removed.
    /// The client is logged out in memory regardless.
    pub fn logout(&mut self) -> Result<()> {
        self.deactivate();
        info!("logged out");
        self.session.clear()
    }

    fn activate(&mut self, session: &Session) {
        self.deactivate();
        let (engine, events) =
            SyncEngine::start(Arc::clone(&self.transport), session.token.clone(), &self.config);
        debug!(email = %session.user.email, "polling activated");
        self.sync = Some(engine);
        self.events = Some(events);
    }

    fn deactivate(&mut self) {
        if let Some(mut engine) = self.sync.take() {
            engine.stop();
        }
        self.events = None;
    }

    // ── Auth form ───────────────────────────────────────────────────

    pub fn auth(&self) -> &AuthFlow {
        &self.auth
    }

    pub fn toggle_mode(&mut self) -> AuthMode {
        self.auth.toggle_mode()
    }

    pub fn set_mode(&mut self, mode: AuthMode) {
        self.auth.set_mode(mode);
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> Option<Session> {
        self.session.current()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// `true` while the sync engine is running.
    pub fn is_polling(&self) -> bool {
        self.sync.as_ref().is_some_and(SyncEngine::is_active)
    }

    /// A copy of the mirrored state (empty when not polling).
    pub fn sync_state(&self) -> SyncState {
        self.sync.as_ref().map(SyncEngine::state).unwrap_or_default()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }

    /// Subscribe to the current engine's state, if polling.
    pub fn subscribe_sync(&self) -> Option<watch::Receiver<SyncState>> {
        self.sync.as_ref().map(SyncEngine::subscribe)
    }

    /// Take the current engine's event receiver. Each engine's receiver can be
    /// taken once.
    pub fn take_sync_events(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.events.take()
    }

    /// Render the current state.
    pub fn view(&self) -> View {
        let session = self.session.current();
        render::render(session.as_ref(), &self.auth, &self.sync_state())
    }
}

impl std::fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminClient")
            .field("base_url", &self.config.base_url)
            .field("authenticated", &self.is_authenticated())
            .field("polling", &self.is_polling())
            .field("auth", &self.auth)
            .finish()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::transport::{ApiRequest, ApiResponse};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// A backend that accepts any login and reports fixed data.
    struct FixedBackend {
        requests: Arc<StdMutex<Vec<ApiRequest>>>,
    }

    impl FixedBackend {
        fn new() -> (Self, Arc<StdMutex<Vec<ApiRequest>>>) {
            let requests = Arc::new(StdMutex::new(Vec::new()));
            (
                Self {
                    requests: Arc::clone(&requests),
                },
                requests,
            )
        }
    }

    #[async_trait]
    impl Transport for FixedBackend {
        async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
            let path = request.path.clone();
            self.requests.lock().unwrap().push(request);
            let body = match path.as_str() {
                "/auth/login" | "/auth/register" => {
                    r#"{"token":"T1","user":{"email":"a@b.com","role":"admin"}}"#
                }
                "/status" => r#"{"connectedCount":5,"adminConnectedCount":1,"players":[]}"#,
                "/vehicles" => r#"{"vehicles":[{"id":"v1","type":"car","owner":"p1","state":"ok"}]}"#,
                _ => return Ok(ApiResponse::new(404, "{}")),
            };
            Ok(ApiResponse::new(200, body))
        }
    }

    fn count(requests: &StdMutex<Vec<ApiRequest>>, path: &str) -> usize {
        requests.lock().unwrap().iter().filter(|r| r.path == path).count()
    }

    fn persisted_admin() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_entries([
            ("token", "T0"),
            ("user", r#"{"email":"a@b.com","role":"admin"}"#),
        ]))
    }

    #[tokio::test(start_paused = true)]
    async fn new_without_session_shows_login_and_does_not_poll() {
        let (backend, requests) = FixedBackend::new();
        let mut client =
            AdminClient::new(backend, Arc::new(MemoryStore::new()), ClientConfig::default());

        assert!(!client.resume());
        assert!(matches!(client.view(), View::Login(_)));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn resume_polls_with_persisted_token() {
        let (backend, requests) = FixedBackend::new();
        let mut client = AdminClient::new(backend, persisted_admin(), ClientConfig::default());

        assert!(client.resume());
        // Resuming twice does not start a second engine.
        assert!(client.resume());

        let mut rx = client.subscribe_sync().unwrap();
        rx.wait_for(|s| s.vehicles.len() == 1).await.unwrap();

        assert_eq!(count(&requests, "/status"), 1);
        let requests = requests.lock().unwrap();
        assert!(requests.iter().all(|r| r.bearer.as_deref() == Some("T0")));
    }

    #[tokio::test(start_paused = true)]
    async fn submit_starts_polling_with_new_token() {
        let (backend, requests) = FixedBackend::new();
        let mut client =
            AdminClient::new(backend, Arc::new(MemoryStore::new()), ClientConfig::default());

        client.submit(&Credentials::new("a@b.com", "x")).await.unwrap();
        assert!(client.is_polling());

        let mut rx = client.subscribe_sync().unwrap();
        rx.wait_for(|s| s.status.connected_count == 5).await.unwrap();

        match client.view() {
            View::Dashboard(d) => {
                assert_eq!(d.badge, "a@b.com · admin");
                assert_eq!(d.tiles.connected, 5);
            }
            other => panic!("expected dashboard, got {other:?}"),
        }
        let requests = requests.lock().unwrap();
        assert!(requests
            .iter()
            .filter(|r| r.path == "/status")
            .all(|r| r.bearer.as_deref() == Some("T1")));
    }

    #[tokio::test(start_paused = true)]
    async fn logout_stops_polling_and_returns_to_login() {
        let (backend, requests) = FixedBackend::new();
        let storage = persisted_admin();
        let mut client = AdminClient::new(backend, storage.clone(), ClientConfig::default());
        client.resume();
        let mut rx = client.subscribe_sync().unwrap();
        rx.wait_for(|s| s.vehicles.len() == 1).await.unwrap();

        client.logout().unwrap();

        assert!(!client.is_polling());
        assert!(client.session().is_none());
        assert!(matches!(client.view(), View::Login(_)));
        assert_eq!(storage.get("token").unwrap(), None);

        let before = requests.lock().unwrap().len();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(requests.lock().unwrap().len(), before);

        // Logging out twice is harmless.
        client.logout().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn events_receiver_is_handed_out_once_per_engine() {
        let (backend, _requests) = FixedBackend::new();
        let mut client = AdminClient::new(backend, persisted_admin(), ClientConfig::default());
        client.resume();

        let mut events = client.take_sync_events().unwrap();
        assert!(client.take_sync_events().is_none());

        let first = events.recv().await.unwrap();
        assert!(matches!(
            first,
            SyncEvent::StatusUpdated { .. } | SyncEvent::VehiclesUpdated { .. }
        ));
    }
}
