//! Session store: the single owner of the operator's credential.
//!
//! [`SessionStore`] keeps the current [`Session`] in a `tokio::sync::watch`
//! channel so every consumer observes the same value, and mirrors it into a
//! [`KeyValueStore`] so it survives restarts. Persisted layout:
//!
//! | Key     | Value                                   |
//! |---------|-----------------------------------------|
//! | `token` | raw bearer token                        |
//! | `user`  | JSON `{"email": "...", "role": "..."}`  |
//!
//! A session is either fully present or fully absent. Partial or malformed
//! persisted data is read back as "no session".

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{AdminClientError, Result};
use crate::protocol::{AuthResponse, User};
use crate::storage::KeyValueStore;

/// Storage key of the bearer token.
pub const TOKEN_KEY: &str = "token";

/// Storage key of the serialized user identity.
pub const USER_KEY: &str = "user";

/// An authenticated operator: bearer token plus identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: User,
}

impl Session {
    pub fn new(token: impl Into<String>, user: User) -> Self {
        Self {
            token: token.into(),
            user,
        }
    }

    /// `true` when both the token and the user's email are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.token.trim().is_empty() && !self.user.email.trim().is_empty()
    }
}

impl From<AuthResponse> for Session {
    fn from(res: AuthResponse) -> Self {
        Self {
            token: res.token,
            user: res.user,
        }
    }
}

/// Observable, persisted holder of the current [`Session`].
///
/// There is one writer (the auth flow and the logout path) and any number of
/// readers, which either call [`current`](Self::current) or hold a receiver
/// from [`subscribe`](Self::subscribe).
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
    tx: watch::Sender<Option<Session>>,
}

impl SessionStore {
    /// Read the persisted session from `backend`.
    ///
    /// Never fails: a missing, unreadable, or incomplete entry yields a store
    /// with no session.
    pub fn load(backend: Arc<dyn KeyValueStore>) -> Self {
        let session = read_persisted(backend.as_ref());
        match &session {
            Some(s) => debug!(email = %s.user.email, "restored persisted session"),
            None => debug!("no persisted session"),
        }
        let (tx, _rx) = watch::channel(session);
        Self { backend, tx }
    }

    /// Persist `session` and publish it.
    ///
    /// Both entries are written in one batch before the in-memory value
    /// changes, so a failed write leaves the previous state untouched.
    ///
    /// # Errors
    ///
    /// Returns [`AdminClientError::IncompleteSession`] for a session without
    /// token or email, or a storage error if persisting fails.
    pub fn save(&self, session: Session) -> Result<()> {
        if !session.is_complete() {
            return Err(AdminClientError::IncompleteSession);
        }
        let user_json = serde_json::to_string(&session.user)?;
        self.backend
            .set_entries(&[(TOKEN_KEY, session.token.as_str()), (USER_KEY, user_json.as_str())])?;
        debug!(email = %session.user.email, role = %session.user.role, "session saved");
        self.tx.send_replace(Some(session));
        Ok(())
    }

    /// Forget the session, in memory and on disk. Idempotent.
    ///
    /// The in-memory value is reset first, so the client is logged out even if
    /// the backend cannot be written.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the persisted entries could not be removed.
    pub fn clear(&self) -> Result<()> {
        let changed = self.tx.send_if_modified(|current| current.take().is_some());
        if changed {
            debug!("session cleared");
        }
        self.backend.remove_entries(&[TOKEN_KEY, USER_KEY])
    }

    /// The current session, if any.
    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    /// The current bearer token, if any.
    pub fn token(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|s| s.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Subscribe to session changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

fn read_persisted(backend: &dyn KeyValueStore) -> Option<Session> {
    let read = |key: &str| match backend.get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!("failed to read persisted `{key}`: {e}");
            None
        }
    };
    let token = read(TOKEN_KEY)?;
    let user_json = read(USER_KEY)?;
    let user = match serde_json::from_str::<User>(&user_json) {
        Ok(user) => user,
        Err(e) => {
            debug!("ignoring malformed persisted user: {e}");
            return None;
        }
    };
    Some(Session::new(token, user)).filter(Session::is_complete)
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
    use crate::protocol::Role;
    use crate::storage::MemoryStore;

    fn admin_session() -> Session {
        Session::new(
            "T1",
            User {
                email: "a@b.com".into(),
                role: Role::Admin,
            },
        )
    }

    fn store_with(entries: &[(&str, &str)]) -> (SessionStore, Arc<MemoryStore>) {
        let backend = Arc::new(MemoryStore::with_entries(entries.iter().copied()));
        (SessionStore::load(backend.clone()), backend)
    }

    #[test]
    fn load_restores_complete_session() {
        let (store, _) = store_with(&[
            ("token", "T1"),
            ("user", r#"{"email":"a@b.com","role":"admin"}"#),
        ]);
        assert_eq!(store.current(), Some(admin_session()));
    }

    #[test]
    fn load_treats_malformed_or_partial_data_as_absent() {
        let cases: &[&[(&str, &str)]] = &[
            &[],
            &[("token", "T1")],
            &[("user", r#"{"email":"a@b.com","role":"admin"}"#)],
            &[("token", "T1"), ("user", "not json")],
            &[("token", "T1"), ("user", "null")],
            &[("token", "T1"), ("user", r#"{"email":"a@b.com"}"#)],
            &[("token", "T1"), ("user", r#"{"email":"a@b.com","role":"root"}"#)],
            &[("token", ""), ("user", r#"{"email":"a@b.com","role":"user"}"#)],
            &[("token", "T1"), ("user", r#"{"email":"","role":"user"}"#)],
        ];
        for entries in cases {
            let (store, _) = store_with(entries);
            assert!(store.current().is_none(), "expected no session for {entries:?}");
        }
    }

    #[test]
    fn save_persists_and_publishes() {
        let (store, backend) = store_with(&[]);
        let mut rx = store.subscribe();

        store.save(admin_session()).unwrap();

        assert_eq!(store.token().as_deref(), Some("T1"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().clone(), Some(admin_session()));
        assert_eq!(backend.get("token").unwrap().as_deref(), Some("T1"));
        let user: User = serde_json::from_str(&backend.get("user").unwrap().unwrap()).unwrap();
        assert_eq!(user.role, Role::Admin);
    }

    #[test]
    fn save_rejects_incomplete_session() {
        let (store, backend) = store_with(&[]);
        let mut bad = admin_session();
        bad.token.clear();
        assert!(matches!(store.save(bad), Err(AdminClientError::IncompleteSession)));
        assert!(store.current().is_none());
        assert_eq!(backend.get("token").unwrap(), None);
    }

    #[test]
    fn clear_removes_entries_and_is_idempotent() {
        let (store, backend) = store_with(&[]);
        store.save(admin_session()).unwrap();
        let mut rx = store.subscribe();

        store.clear().unwrap();
        assert!(store.current().is_none());
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        store.clear().unwrap();
        assert!(store.current().is_none());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(backend.get("token").unwrap(), None);
        assert_eq!(backend.get("user").unwrap(), None);
    }

    #[test]
    fn clear_wipes_leftover_partial_entries() {
        let (store, backend) = store_with(&[("token", "stale")]);
        assert!(store.current().is_none());
        store.clear().unwrap();
        assert_eq!(backend.get("token").unwrap(), None);
    }

    #[test]
    fn saved_session_survives_reload() {
        let backend = Arc::new(MemoryStore::new());
        SessionStore::load(backend.clone()).save(admin_session()).unwrap();
        let reloaded = SessionStore::load(backend);
        assert_eq!(reloaded.current(), Some(admin_session()));
    }
}
