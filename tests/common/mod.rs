#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for SCUM admin client integration tests.
//!
//! Provides a scriptable [`MockBackend`] transport and helpers for building
//! the backend's JSON replies.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use scum_admin_client::{AdminClientError, ApiRequest, ApiResponse, Transport};
use tokio::sync::{Notify, Semaphore};

// ── MockBackend ─────────────────────────────────────────────────────

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(ApiResponse),
    /// Transport-level failure (no HTTP reply at all).
    Fail(String),
}

#[derive(Default)]
struct Inner {
    /// Scripted replies per path, consumed in order. The last one repeats.
    script: StdMutex<HashMap<String, VecDeque<Reply>>>,
    requests: StdMutex<Vec<ApiRequest>>,
    gates: StdMutex<HashMap<String, Arc<Semaphore>>>,
    entered: Notify,
}

/// A cloneable mock of the administration API.
///
/// Clones share the same script and request log, so a test can hand one clone
/// to the client and keep another for scripting and assertions. Unscripted
/// paths answer `404`.
#[derive(Clone, Default)]
pub struct MockBackend {
    inner: Arc<Inner>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply with `status` and `body` for `path`.
    pub fn reply(&self, path: &str, status: u16, body: impl Into<String>) -> &Self {
        self.push(path, Reply::Respond(ApiResponse::new(status, body)))
    }

    /// Queue a transport failure for `path`.
    pub fn fail(&self, path: &str, reason: &str) -> &Self {
        self.push(path, Reply::Fail(reason.into()))
    }

    fn push(&self, path: &str, reply: Reply) -> &Self {
        self.inner
            .script
            .lock()
            .unwrap()
            .entry(path.into())
            .or_default()
            .push_back(reply);
        self
    }

    /// Hold every request to `path` until permits are added to the returned
    /// semaphore.
    pub fn hold(&self, path: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.inner
            .gates
            .lock()
            .unwrap()
            .insert(path.into(), Arc::clone(&gate));
        gate
    }

    /// Resolves once a request reaches a held path.
    pub async fn wait_held(&self) {
        self.inner.entered.notified().await;
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.inner
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    fn next_reply(&self, path: &str) -> Reply {
        let mut script = self.inner.script.lock().unwrap();
        let Some(queue) = script.get_mut(path) else {
            return Reply::Respond(ApiResponse::new(404, r#"{"error":"not found"}"#));
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or(Reply::Respond(ApiResponse::new(404, "{}")))
        }
    }
}

#[async_trait]
impl Transport for MockBackend {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, AdminClientError> {
        let path = request.path.clone();
        self.inner.requests.lock().unwrap().push(request);

        let gate = self.inner.gates.lock().unwrap().get(&path).cloned();
        if let Some(gate) = gate {
            self.inner.entered.notify_one();
            gate.acquire().await.unwrap().forget();
        }

        match self.next_reply(&path) {
            Reply::Respond(response) => Ok(response),
            Reply::Fail(reason) => Err(AdminClientError::Http(reason)),
        }
    }
}

// ── JSON helper functions ───────────────────────────────────────────

/// Successful `/auth/*` reply body.
pub fn auth_ok_json(token: &str, email: &str, role: &str) -> String {
    serde_json::json!({ "token": token, "user": { "email": email, "role": role } }).to_string()
}

/// `/auth/*` error body.
pub fn error_json(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

/// `/status` reply body.
pub fn status_json(connected: u64, admins: u64) -> String {
    serde_json::json!({
        "connectedCount": connected,
        "adminConnectedCount": admins,
        "players": [],
    })
    .to_string()
}

/// `/vehicles` reply body wrapping `vehicles`.
pub fn vehicles_json(vehicles: serde_json::Value) -> String {
    serde_json::json!({ "vehicles": vehicles }).to_string()
}
