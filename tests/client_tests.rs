//! Integration-style client tests for the SCUM admin client.
//!
//! Uses the shared `MockBackend` from `tests/common` to script API replies and
//! verify the whole lifecycle: authentication, session persistence, polling,
//! rendering, and logout.

mod common;

use std::sync::Arc;
use std::time::Duration;

use scum_admin_client::render::DashboardView;
use scum_admin_client::{
    AdminClient, AdminClientError, AuthMode, ClientConfig, Credentials, FileStore, KeyValueStore,
    MemoryStore, Role, View,
};

use common::{auth_ok_json, error_json, status_json, vehicles_json, MockBackend};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn client_with(backend: &MockBackend, storage: Arc<dyn KeyValueStore>) -> AdminClient {
    AdminClient::new(backend.clone(), storage, ClientConfig::default())
}

fn dashboard(client: &AdminClient) -> DashboardView {
    match client.view() {
        View::Dashboard(d) => d,
        View::Login(l) => panic!("expected dashboard, got login view {l:?}"),
    }
}

// ════════════════════════════════════════════════════════════════════
// Authentication
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn login_stores_session_and_renders_badge() {
    let backend = MockBackend::new();
    backend
        .reply("/auth/login", 200, auth_ok_json("T1", "a@b.com", "admin"))
        .reply("/status", 200, status_json(0, 0))
        .reply("/vehicles", 200, vehicles_json(serde_json::json!([])));
    let storage = Arc::new(MemoryStore::new());
    let mut client = client_with(&backend, storage.clone());

    client
        .submit(&Credentials::new("a@b.com", "x"))
        .await
        .expect("login");

    let session = client.session().expect("session");
    assert_eq!(session.token, "T1");
    assert_eq!(session.user.role, Role::Admin);
    assert_eq!(storage.get("token").unwrap().as_deref(), Some("T1"));
    assert_eq!(dashboard(&client).badge, "a@b.com · admin");

    let login = &backend.requests()[0];
    assert_eq!(login.path, "/auth/login");
    assert_eq!(
        login.body,
        Some(serde_json::json!({"email": "a@b.com", "password": "x"}))
    );
}

#[tokio::test(start_paused = true)]
async fn failed_login_shows_server_message_and_keeps_login_view() {
    let backend = MockBackend::new();
    backend.reply("/auth/login", 401, error_json("Mot de passe incorrect"));
    let storage = Arc::new(MemoryStore::new());
    let mut client = client_with(&backend, storage.clone());

    let err = client
        .submit(&Credentials::new("a@b.com", "wrong"))
        .await
        .unwrap_err();

    assert!(matches!(err, AdminClientError::AuthRejected { .. }));
    assert!(client.session().is_none());
    assert!(!client.is_polling());
    assert_eq!(storage.get("token").unwrap(), None);
    match client.view() {
        View::Login(login) => {
            assert_eq!(login.error.as_deref(), Some("Mot de passe incorrect"));
            assert_eq!(login.mode, AuthMode::Login);
        }
        other => panic!("expected login view, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn register_sends_role_and_activates_dashboard() {
    let backend = MockBackend::new();
    backend
        .reply("/auth/register", 201, auth_ok_json("R1", "new@b.com", "user"))
        .reply("/status", 200, status_json(2, 0))
        .reply("/vehicles", 200, vehicles_json(serde_json::json!([])));
    let mut client = client_with(&backend, Arc::new(MemoryStore::new()));

    assert_eq!(client.toggle_mode(), AuthMode::Register);
    if let View::Login(login) = client.view() {
        assert!(login.show_role_picker);
    }
    client
        .submit(&Credentials::new("new@b.com", "pw").with_role(Role::User))
        .await
        .expect("register");

    let register = &backend.requests()[0];
    assert_eq!(register.path, "/auth/register");
    assert_eq!(
        register.body,
        Some(serde_json::json!({"email": "new@b.com", "password": "pw", "role": "user"}))
    );
    assert!(client.is_polling());
    assert_eq!(dashboard(&client).badge, "new@b.com · user");
}

// ════════════════════════════════════════════════════════════════════
// Session persistence
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn session_survives_client_restart_via_file_store() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("scum-admin").join("session.json");
    let backend = MockBackend::new();
    backend.reply("/auth/login", 200, auth_ok_json("T1", "a@b.com", "admin"));

    {
        let mut client = client_with(&backend, Arc::new(FileStore::new(&path)));
        client.submit(&Credentials::new("a@b.com", "x")).await.unwrap();
    }

    let mut restarted = client_with(&backend, Arc::new(FileStore::new(&path)));
    assert_eq!(restarted.session().map(|s| s.token).as_deref(), Some("T1"));
    assert!(restarted.resume());
}

#[tokio::test(start_paused = true)]
async fn malformed_persisted_session_falls_back_to_login() {
    let backend = MockBackend::new();
    let storage = Arc::new(MemoryStore::with_entries([
        ("token", "T1"),
        ("user", "{\"email\":"),
    ]));
    let mut client = client_with(&backend, storage);

    assert!(client.session().is_none());
    assert!(!client.resume());
    assert!(matches!(client.view(), View::Login(_)));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(backend.requests().is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Polling
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn failed_status_poll_keeps_tiles_while_vehicles_update() {
    let backend = MockBackend::new();
    backend
        .reply("/auth/login", 200, auth_ok_json("T1", "a@b.com", "admin"))
        .reply("/status", 200, status_json(7, 2))
        .reply("/status", 500, "internal error")
        .reply("/vehicles", 200, vehicles_json(serde_json::json!([])))
        .reply(
            "/vehicles",
            200,
            vehicles_json(serde_json::json!([
                {"id": "v1", "type": "car", "owner": "p1", "state": 0.42, "location": {"x": 1, "y": 2}}
            ])),
        );
    let mut client = client_with(&backend, Arc::new(MemoryStore::new()));
    client.submit(&Credentials::new("a@b.com", "x")).await.unwrap();

    // First cycle at t=0, second at t=10s.
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(backend.count("/status"), 2);

    let view = dashboard(&client);
    assert_eq!(view.tiles.connected, 7);
    assert_eq!(view.tiles.admins_connected, 2);
    assert_eq!(view.tiles.vehicles, 1);
    assert_eq!(view.rows.len(), 1);
    assert_eq!(view.rows[0].id, "v1");
    assert_eq!(view.rows[0].state, "42%");
    assert_eq!(view.rows[0].location.as_deref(), Some("1, 2"));

    let state = client.sync_state();
    assert!(state.status_stale);
    assert!(!state.vehicles_stale);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_is_retried_only_on_next_cycle() {
    let backend = MockBackend::new();
    backend
        .reply("/auth/login", 200, auth_ok_json("T1", "a@b.com", "admin"))
        .fail("/status", "connection refused")
        .reply("/status", 200, status_json(4, 0))
        .reply("/vehicles", 200, vehicles_json(serde_json::json!([])));
    let mut client = client_with(&backend, Arc::new(MemoryStore::new()));
    client.submit(&Credentials::new("a@b.com", "x")).await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(backend.count("/status"), 1);
    assert_eq!(dashboard(&client).tiles.connected, 0);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(backend.count("/status"), 2);
    assert_eq!(dashboard(&client).tiles.connected, 4);
}

#[tokio::test(start_paused = true)]
async fn mixed_vehicle_states_render_by_shape() {
    let backend = MockBackend::new();
    backend
        .reply("/auth/login", 200, auth_ok_json("T1", "a@b.com", "user"))
        .reply("/status", 200, status_json(1, 0))
        .reply(
            "/vehicles",
            200,
            vehicles_json(serde_json::json!([
                {"id": "v1", "type": "bike", "owner": "p1", "state": 1},
                {"id": "v2", "type": "boat", "owner": "p2", "state": "sunk", "location": {"z": -3.5}},
                {"id": "v3", "type": "car", "owner": "p3", "state": 0.125, "location": {}},
            ])),
        );
    let mut client = client_with(&backend, Arc::new(MemoryStore::new()));
    client.submit(&Credentials::new("a@b.com", "x")).await.unwrap();

    let mut rx = client.subscribe_sync().unwrap();
    rx.wait_for(|s| s.vehicles.len() == 3).await.unwrap();

    let rows = dashboard(&client).rows;
    assert_eq!(rows[0].state, "100%");
    assert_eq!(rows[0].location, None);
    assert_eq!(rows[1].state, "sunk");
    assert_eq!(rows[1].location.as_deref(), Some("-3.5"));
    assert_eq!(rows[2].state, "13%");
    assert_eq!(rows[2].location, None);
}

#[tokio::test(start_paused = true)]
async fn malformed_vehicle_record_does_not_stall_the_table() {
    let backend = MockBackend::new();
    backend
        .reply("/auth/login", 200, auth_ok_json("T1", "a@b.com", "admin"))
        .reply("/status", 200, status_json(1, 0))
        .reply(
            "/vehicles",
            200,
            vehicles_json(serde_json::json!([
                {"id": 1001, "type": "Rager", "owner": "p1", "state": 0.5},
                {"id": "v2", "type": "Laika", "owner": "p2", "location": "north"},
                {"id": "v3", "type": "Kart", "owner": "p3", "state": false},
            ])),
        );
    let mut client = client_with(&backend, Arc::new(MemoryStore::new()));
    client.submit(&Credentials::new("a@b.com", "x")).await.unwrap();

    let mut rx = client.subscribe_sync().unwrap();
    rx.wait_for(|s| s.vehicles.len() == 2).await.unwrap();

    assert!(!client.sync_state().vehicles_stale);
    let rows = dashboard(&client).rows;
    assert_eq!(rows[0].id, "1001");
    assert_eq!(rows[0].state, "50%");
    assert_eq!(rows[1].id, "v3");
    assert_eq!(rows[1].state, "");
}

// ════════════════════════════════════════════════════════════════════
// Logout
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn status_reply_after_logout_is_discarded() {
    let backend = MockBackend::new();
    backend
        .reply("/auth/login", 200, auth_ok_json("T1", "a@b.com", "admin"))
        .reply("/status", 200, status_json(42, 3))
        .reply("/vehicles", 200, vehicles_json(serde_json::json!([])));
    let gate = backend.hold("/status");
    let mut client = client_with(&backend, Arc::new(MemoryStore::new()));
    client.submit(&Credentials::new("a@b.com", "x")).await.unwrap();
    let mut state = client.subscribe_sync().unwrap();

    backend.wait_held().await;
    client.logout().unwrap();

    // The held request now completes successfully.
    gate.add_permits(8);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(matches!(client.view(), View::Login(_)));
    let last = state.borrow_and_update().clone();
    assert!(!last.is_active());
    assert_eq!(last.status.connected_count, 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.count("/status"), 1);
}

#[tokio::test(start_paused = true)]
async fn relogin_polls_with_new_token_only() {
    let backend = MockBackend::new();
    backend
        .reply("/auth/login", 200, auth_ok_json("T1", "a@b.com", "admin"))
        .reply("/auth/login", 200, auth_ok_json("T2", "c@d.com", "user"))
        .reply("/status", 200, status_json(1, 0))
        .reply("/vehicles", 200, vehicles_json(serde_json::json!([])));
    let mut client = client_with(&backend, Arc::new(MemoryStore::new()));

    client.submit(&Credentials::new("a@b.com", "x")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    client.logout().unwrap();
    let polled_before = backend.count("/status");

    client.submit(&Credentials::new("c@d.com", "y")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(25)).await;

    let later: Vec<_> = backend
        .requests()
        .into_iter()
        .filter(|r| r.path == "/status")
        .skip(polled_before)
        .collect();
    assert_eq!(later.len(), 3);
    assert!(later.iter().all(|r| r.bearer.as_deref() == Some("T2")));
    assert_eq!(dashboard(&client).badge, "c@d.com · user");
}
