//! Login / registration flow.
//!
//! [`AuthFlow`] is a two-mode state machine ([`AuthMode::Login`] and
//! [`AuthMode::Register`]). Switching modes is a local toggle; only
//! [`AuthFlow::submit`] talks to the network.
//!
//! A successful submission saves the returned session into the
//! [`SessionStore`]. A rejected one records the server's message, or
//! [`GENERIC_AUTH_ERROR`] when there is none, and leaves the store alone.
//! Failed attempts are never retried.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{AdminClientError, Result};
use crate::protocol::{AuthResponse, LoginRequest, RegisterRequest, Role, LOGIN_PATH, REGISTER_PATH};
use crate::session::{Session, SessionStore};
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Message shown when a rejection carries no usable error text.
pub const GENERIC_AUTH_ERROR: &str = "authentication failed";

/// Which form the operator is filling in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Login,
    Register,
}

impl AuthMode {
    /// Endpoint path for this mode.
    pub fn path(self) -> &'static str {
        match self {
            AuthMode::Login => LOGIN_PATH,
            AuthMode::Register => REGISTER_PATH,
        }
    }

    /// The other mode.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            AuthMode::Login => AuthMode::Register,
            AuthMode::Register => AuthMode::Login,
        }
    }
}

/// Form input for a submission.
///
/// `role` is only sent in [`AuthMode::Register`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            role: Role::default(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// Drives the login and registration forms.
pub struct AuthFlow {
    transport: Arc<dyn Transport>,
    mode: AuthMode,
    error: Option<String>,
}

impl AuthFlow {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            mode: AuthMode::default(),
            error: None,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: AuthMode) {
        self.mode = mode;
    }

    /// Switch between login and registration. No network traffic.
    pub fn toggle_mode(&mut self) -> AuthMode {
        self.mode = self.mode.toggled();
        self.mode
    }

    /// Error from the last failed submission, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Build the request for `credentials` in the current mode.
    ///
    /// # Errors
    ///
    /// Returns [`AdminClientError::Serialization`] if the payload cannot be
    /// encoded.
    pub fn build_request(&self, credentials: &Credentials) -> Result<ApiRequest> {
        match self.mode {
            AuthMode::Login => ApiRequest::post_json(
                LOGIN_PATH,
                &LoginRequest {
                    email: credentials.email.clone(),
                    password: credentials.password.clone(),
                },
            ),
            AuthMode::Register => ApiRequest::post_json(
                REGISTER_PATH,
                &RegisterRequest {
                    email: credentials.email.clone(),
                    password: credentials.password.clone(),
                    role: credentials.role,
                },
            ),
        }
    }

    /// Submit the form in the current mode.
    ///
    /// On success the returned session is already saved in `store` and the
    /// error state is cleared. On failure the error state holds the message to
    /// show, `store` is untouched, and the mode is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`AdminClientError::AuthRejected`] when the backend refuses the
    /// credentials or answers without a complete session, a transport error if
    /// no answer was obtained, or a storage error if the session could not be
    /// persisted.
    pub async fn submit(&mut self, credentials: &Credentials, store: &SessionStore) -> Result<Session> {
        self.error = None;
        let mode = self.mode;
        debug!(?mode, email = %credentials.email, "submitting credentials");

        let outcome = match self.build_request(credentials) {
            Ok(request) => self.transport.execute(request).await,
            Err(e) => Err(e),
        };
        self.apply(outcome, store)
    }

    /// Apply the outcome of a submission to the form and the store.
    /// Submissions are serialized by `&mut self`, so each outcome replaces
    /// whatever the previous one left behind.
    fn apply(&mut self, outcome: Result<ApiResponse>, store: &SessionStore) -> Result<Session> {
        let result = outcome.and_then(session_from_response).and_then(|session| {
            store.save(session.clone())?;
            Ok(session)
        });
        match &result {
            Ok(session) => {
                self.error = None;
                info!(email = %session.user.email, role = %session.user.role, "authenticated");
            }
            Err(e) => {
                let message = match e {
                    AdminClientError::AuthRejected { message } => message.clone(),
                    other => other.to_string(),
                };
                warn!("authentication failed: {message}");
                self.error = Some(message);
            }
        }
        result
    }
}

impl std::fmt::Debug for AuthFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthFlow")
            .field("mode", &self.mode)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Interpret an auth endpoint reply.
fn session_from_response(response: ApiResponse) -> Result<Session> {
    if !response.is_success() {
        let message = response
            .error_message()
            .unwrap_or_else(|| GENERIC_AUTH_ERROR.to_string());
        return Err(AdminClientError::AuthRejected { message });
    }
    let session = match response.json::<AuthResponse>() {
        Ok(body) => Session::from(body),
        Err(e) => {
            debug!("unreadable auth response: {e}");
            return Err(AdminClientError::AuthRejected {
                message: GENERIC_AUTH_ERROR.to_string(),
            });
        }
    };
    if !session.is_complete() {
        return Err(AdminClientError::AuthRejected {
            message: GENERIC_AUTH_ERROR.to_string(),
        });
    }
    Ok(session)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Replies with scripted responses and records every request.
    struct ScriptedTransport {
        replies: StdMutex<VecDeque<Result<ApiResponse>>>,
        requests: StdMutex<Vec<ApiRequest>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<ApiResponse>>) -> Arc<Self> {
            Arc::new(Self {
                replies: StdMutex::new(replies.into()),
                requests: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(AdminClientError::Http("no scripted reply".into())))
        }
    }

    fn ok_body() -> String {
        r#"{"token":"T1","user":{"email":"a@b.com","role":"admin"}}"#.to_string()
    }

    fn empty_store() -> SessionStore {
        SessionStore::load(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn login_success_saves_session() {
        let transport = ScriptedTransport::new(vec![Ok(ApiResponse::new(200, ok_body()))]);
        let store = empty_store();
        let mut flow = AuthFlow::new(transport.clone());

        let session = flow.submit(&Credentials::new("a@b.com", "x"), &store).await.unwrap();

        assert_eq!(session.token, "T1");
        assert_eq!(store.current(), Some(session));
        assert!(flow.error().is_none());

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].path, "/auth/login");
        assert_eq!(
            requests[0].body,
            Some(serde_json::json!({"email":"a@b.com","password":"x"}))
        );
        assert!(requests[0].bearer.is_none());
    }

    #[tokio::test]
    async fn register_sends_role() {
        let transport = ScriptedTransport::new(vec![Ok(ApiResponse::new(201, ok_body()))]);
        let store = empty_store();
        let mut flow = AuthFlow::new(transport.clone());
        flow.toggle_mode();
        assert_eq!(flow.mode(), AuthMode::Register);

        flow.submit(&Credentials::new("a@b.com", "x").with_role(Role::Admin), &store)
            .await
            .unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].path, "/auth/register");
        assert_eq!(
            requests[0].body,
            Some(serde_json::json!({"email":"a@b.com","password":"x","role":"admin"}))
        );
    }

    #[tokio::test]
    async fn rejection_uses_server_message_and_keeps_store() {
        let transport = ScriptedTransport::new(vec![Ok(ApiResponse::new(
            401,
            r#"{"error":"Identifiants invalides"}"#,
        ))]);
        let store = empty_store();
        let mut flow = AuthFlow::new(transport);

        let err = flow.submit(&Credentials::new("a@b.com", "bad"), &store).await.unwrap_err();

        assert!(matches!(err, AdminClientError::AuthRejected { .. }));
        assert_eq!(flow.error(), Some("Identifiants invalides"));
        assert!(store.current().is_none());
        assert_eq!(flow.mode(), AuthMode::Login);
    }

    #[tokio::test]
    async fn rejection_without_message_uses_generic_fallback() {
        for body in ["{}", "", "<html>oops</html>", r#"{"error":null}"#] {
            let transport = ScriptedTransport::new(vec![Ok(ApiResponse::new(400, body))]);
            let store = empty_store();
            let mut flow = AuthFlow::new(transport);
            flow.set_mode(AuthMode::Register);

            assert!(flow.submit(&Credentials::new("a@b.com", "x"), &store).await.is_err());
            assert_eq!(flow.error(), Some(GENERIC_AUTH_ERROR), "body {body:?}");
            assert_eq!(flow.mode(), AuthMode::Register);
            assert!(store.current().is_none());
        }
    }

    #[tokio::test]
    async fn success_status_with_incomplete_session_is_rejected() {
        let transport = ScriptedTransport::new(vec![Ok(ApiResponse::new(
            200,
            r#"{"token":"","user":{"email":"a@b.com","role":"user"}}"#,
        ))]);
        let store = empty_store();
        let mut flow = AuthFlow::new(transport);

        assert!(flow.submit(&Credentials::new("a@b.com", "x"), &store).await.is_err());
        assert_eq!(flow.error(), Some(GENERIC_AUTH_ERROR));
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn rejection_does_not_clear_existing_session() {
        let transport = ScriptedTransport::new(vec![
            Ok(ApiResponse::new(200, ok_body())),
            Ok(ApiResponse::new(401, r#"{"error":"nope"}"#)),
        ]);
        let store = empty_store();
        let mut flow = AuthFlow::new(transport);

        flow.submit(&Credentials::new("a@b.com", "x"), &store).await.unwrap();
        assert!(flow.submit(&Credentials::new("a@b.com", "y"), &store).await.is_err());

        assert_eq!(store.token().as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn transport_failure_surfaces_its_message() {
        let transport =
            ScriptedTransport::new(vec![Err(AdminClientError::Http("connection refused".into()))]);
        let store = empty_store();
        let mut flow = AuthFlow::new(transport);

        assert!(flow.submit(&Credentials::new("a@b.com", "x"), &store).await.is_err());
        assert!(flow.error().unwrap().contains("connection refused"));
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn error_is_cleared_by_next_success() {
        let transport = ScriptedTransport::new(vec![
            Ok(ApiResponse::new(401, r#"{"error":"nope"}"#)),
            Ok(ApiResponse::new(200, ok_body())),
        ]);
        let store = empty_store();
        let mut flow = AuthFlow::new(transport);

        assert!(flow.submit(&Credentials::new("a@b.com", "bad"), &store).await.is_err());
        assert!(flow.error().is_some());
        flow.submit(&Credentials::new("a@b.com", "x"), &store).await.unwrap();
        assert!(flow.error().is_none());
    }

    #[tokio::test]
    async fn each_outcome_replaces_the_previous_one() {
        let transport = ScriptedTransport::new(vec![
            Ok(ApiResponse::new(401, r#"{"error":"first"}"#)),
            Ok(ApiResponse::new(409, r#"{"error":"second"}"#)),
            Ok(ApiResponse::new(200, ok_body())),
            Ok(ApiResponse::new(
                200,
                r#"{"token":"T2","user":{"email":"c@d.com","role":"user"}}"#,
            )),
        ]);
        let store = empty_store();
        let mut flow = AuthFlow::new(transport);
        let creds = Credentials::new("a@b.com", "x");

        assert!(flow.submit(&creds, &store).await.is_err());
        assert!(flow.submit(&creds, &store).await.is_err());
        assert_eq!(flow.error(), Some("second"));

        flow.submit(&creds, &store).await.unwrap();
        flow.submit(&creds, &store).await.unwrap();
        assert!(flow.error().is_none());
        let session = store.current().unwrap();
        assert_eq!(session.token, "T2");
        assert_eq!(session.user.email, "c@d.com");
    }

    #[test]
    fn toggle_is_local() {
        let transport = ScriptedTransport::new(vec![]);
        let mut flow = AuthFlow::new(transport.clone());
        assert_eq!(flow.toggle_mode(), AuthMode::Register);
        assert_eq!(flow.toggle_mode(), AuthMode::Login);
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let dbg = format!("{:?}", Credentials::new("a@b.com", "hunter2"));
        assert!(!dbg.contains("hunter2"));
    }
}
