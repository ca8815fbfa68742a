//! Polling sync engine.
//!
//! [`SyncEngine`] mirrors two backend resources, `/status` and `/vehicles`,
//! while a session is active. A background scheduler task issues one fetch of
//! each resource immediately and then one per interval. Every fetch runs as
//! its own task, so the two fetches of a cycle complete in any order and a
//! slow reply may land after the next cycle has started.
//!
//! # Consistency rules
//!
//! - A successful reply replaces its slice of [`SyncState`] wholesale.
//! - A failed reply (transport error, non-2xx, undecodable body) leaves the
//!   slice at its last-known value and only marks it stale.
//! - [`SyncEngine::stop`] aborts the scheduler and bumps the liveness epoch.
//!   Every fetch captures the epoch when it is issued, and its reply is applied
//!   only if the epoch is still current. The check, the write and the event
//!   emission happen together inside the `watch` channel's lock, so a reply can
//!   never resurrect a snapshot after logout or report after `Stopped`.
//!
//! # Example
//!
//! ```rust,ignore
//! let (mut engine, mut events) = SyncEngine::start(transport, "T1", &config);
//! let mut state = engine.subscribe();
//!
//! while state.changed().await.is_ok() {
//!     println!("{} players online", state.borrow().status.connected_count);
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::protocol::{StatusSnapshot, VehicleRecord, VehiclesResponse, STATUS_PATH, VEHICLES_PATH};
use crate::transport::{ApiRequest, ApiResponse, Transport};

// ── Public types ────────────────────────────────────────────────────

/// A backend resource mirrored by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Status,
    Vehicles,
}

impl Resource {
    pub fn path(self) -> &'static str {
        match self {
            Resource::Status => STATUS_PATH,
            Resource::Vehicles => VEHICLES_PATH,
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Resource::Status => "status",
            Resource::Vehicles => "vehicles",
        })
    }
}

/// The mirrored view state, published through a `watch` channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    /// Latest successfully fetched `/status` snapshot.
    pub status: StatusSnapshot,
    /// Latest successfully fetched vehicle list.
    pub vehicles: Vec<VehicleRecord>,
    /// `true` when the most recent `/status` fetch failed.
    pub status_stale: bool,
    /// `true` when the most recent `/vehicles` fetch failed.
    pub vehicles_stale: bool,
    active: bool,
    epoch: u64,
}

impl SyncState {
    /// `true` while the owning engine is running.
    pub fn is_active(&self) -> bool {
        self.active
    }

    fn is_live(&self, epoch: u64) -> bool {
        self.active && self.epoch == epoch
    }
}

/// Notifications emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// `/status` was fetched and applied.
    StatusUpdated {
        connected_count: u64,
        admin_connected_count: u64,
    },
    /// `/vehicles` was fetched and applied.
    VehiclesUpdated { count: usize },
    /// A fetch failed; the previous snapshot is kept.
    PollFailed { resource: Resource, reason: String },
    /// The engine was stopped. Always the last event.
    Stopped,
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the engine handle, the scheduler and fetch tasks.
struct Shared {
    transport: Arc<dyn Transport>,
    /// Bearer token, frozen for the lifetime of the engine.
    token: Arc<str>,
    state: watch::Sender<SyncState>,
    events: mpsc::Sender<SyncEvent>,
    cycles: AtomicU64,
}

impl Shared {
    fn is_live(&self, epoch: u64) -> bool {
        self.state.borrow().is_live(epoch)
    }

    /// Apply the outcome of a fetch issued under `epoch`.
    ///
    /// The event is emitted while the state lock is held, which orders it
    /// before the `Stopped` event of any later [`SyncEngine::stop`].
    fn apply(&self, epoch: u64, resource: Resource, outcome: Result<Fetched>) {
        let mut discarded = false;

        self.state.send_if_modified(|state| {
            if !state.is_live(epoch) {
                discarded = true;
                return false;
            }
            let (event, modified) = match outcome {
                Ok(Fetched::Status(status)) => {
                    let event = SyncEvent::StatusUpdated {
                        connected_count: status.connected_count,
                        admin_connected_count: status.admin_connected_count,
                    };
                    state.status = status;
                    state.status_stale = false;
                    (event, true)
                }
                Ok(Fetched::Vehicles(vehicles)) => {
                    let event = SyncEvent::VehiclesUpdated {
                        count: vehicles.len(),
                    };
                    state.vehicles = vehicles;
                    state.vehicles_stale = false;
                    (event, true)
                }
                Err(e) => {
                    warn!("{resource} poll failed: {e}");
                    let flag = match resource {
                        Resource::Status => &mut state.status_stale,
                        Resource::Vehicles => &mut state.vehicles_stale,
                    };
                    let newly_stale = !std::mem::replace(flag, true);
                    let event = SyncEvent::PollFailed {
                        resource,
                        reason: e.to_string(),
                    };
                    (event, newly_stale)
                }
            };
            emit_event(&self.events, event);
            modified
        });

        if discarded {
            debug!(epoch, "discarding {resource} reply that arrived after deactivation");
        }
    }
}

/// A decoded successful reply.
enum Fetched {
    Status(StatusSnapshot),
    Vehicles(Vec<VehicleRecord>),
}

fn decode(resource: Resource, response: ApiResponse) -> Result<Fetched> {
    match resource {
        Resource::Status => response.into_json::<StatusSnapshot>().map(Fetched::Status),
        Resource::Vehicles => response
            .into_json::<VehiclesResponse>()
            .map(|body| Fetched::Vehicles(body.vehicles)),
    }
}

// ── Engine handle ───────────────────────────────────────────────────

/// Handle to a running polling engine.
///
/// Created via [`SyncEngine::start`]. Dropping the handle stops the engine.
pub struct SyncEngine {
    shared: Arc<Shared>,
    /// Scheduler task. Taken (and aborted) exactly once.
    task: Option<JoinHandle<()>>,
}

impl SyncEngine {
    /// Activate polling with `token` and return the handle plus event receiver.
    ///
    /// The first cycle is issued immediately, then one per
    /// [`ClientConfig::poll_interval`].
    ///
    /// Must be called from within a tokio runtime.
    #[must_use = "dropping the engine stops polling"]
    pub fn start(
        transport: Arc<dyn Transport>,
        token: impl Into<String>,
        config: &ClientConfig,
    ) -> (Self, mpsc::Receiver<SyncEvent>) {
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (state_tx, _state_rx) = watch::channel(SyncState {
            active: true,
            ..SyncState::default()
        });

        let token: String = token.into();
        let shared = Arc::new(Shared {
            transport,
            token: Arc::from(token),
            state: state_tx,
            events: event_tx,
            cycles: AtomicU64::new(0),
        });

        let epoch = shared.state.borrow().epoch;
        let task = tokio::spawn(poll_loop(Arc::clone(&shared), epoch, config.poll_interval));
        debug!(interval = ?config.poll_interval, "sync engine started");

        let engine = Self {
            shared,
            task: Some(task),
        };
        (engine, event_rx)
    }

    /// Deactivate the engine. Idempotent.
    ///
    /// After this returns, no further fetch is issued, replies still in flight
    /// are discarded, and the published state is reset to empty.
    pub fn stop(&mut self) {
        let events = &self.shared.events;
        self.shared.state.send_if_modified(|state| {
            if !state.active {
                return false;
            }
            *state = SyncState {
                active: false,
                epoch: state.epoch.wrapping_add(1),
                ..SyncState::default()
            };
            debug!("sync engine stopped");
            emit_event(events, SyncEvent::Stopped);
            true
        });
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.state.borrow().active
    }

    /// A copy of the current state.
    pub fn state(&self) -> SyncState {
        self.shared.state.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.shared.state.subscribe()
    }

    /// Number of poll cycles issued so far.
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("active", &self.is_active())
            .field("cycles", &self.cycles())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tasks ───────────────────────────────────────────────────────────

/// Scheduler: one cycle per tick, the first tick completing immediately.
///
/// In-flight fetches of earlier cycles are never cancelled here.
async fn poll_loop(shared: Arc<Shared>, epoch: u64, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !shared.is_live(epoch) {
            break;
        }
        let cycle = shared.cycles.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(cycle, "poll cycle");
        tokio::spawn(fetch(Arc::clone(&shared), epoch, Resource::Status));
        tokio::spawn(fetch(Arc::clone(&shared), epoch, Resource::Vehicles));
    }

    debug!("poll loop exited");
}

async fn fetch(shared: Arc<Shared>, epoch: u64, resource: Resource) {
    // A cycle spawned just before deactivation must not reach the network.
    if !shared.is_live(epoch) {
        return;
    }
    let request = ApiRequest::get(resource.path()).with_bearer(shared.token.as_ref());
    let outcome = shared
        .transport
        .execute(request)
        .await
        .and_then(|response| decode(resource, response));
    shared.apply(epoch, resource, outcome);
}

/// Emit an event. If the channel is full, log a warning and drop the event so
/// polling never blocks on a slow consumer.
fn emit_event(event_tx: &mpsc::Sender<SyncEvent>, event: SyncEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("sync event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("sync event channel closed, receiver dropped");
        }
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
    use crate::error::AdminClientError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::{Notify, Semaphore};

    // ── Mock transport ──────────────────────────────────────────────

    /// Replies per path from a script; the last scripted reply repeats.
    /// A path can be gated so its replies wait for a permit.
    #[derive(Default)]
    struct MockApi {
        script: StdMutex<HashMap<String, Vec<Result<ApiResponse>>>>,
        requests: StdMutex<Vec<ApiRequest>>,
        gates: HashMap<String, Arc<Semaphore>>,
        entered: Arc<Notify>,
    }

    impl MockApi {
        fn with(mut self, path: &str, replies: Vec<Result<ApiResponse>>) -> Self {
            self.script.get_mut().unwrap().insert(path.into(), replies);
            self
        }

        fn gated(mut self, path: &str) -> (Self, Arc<Semaphore>) {
            let gate = Arc::new(Semaphore::new(0));
            self.gates.insert(path.into(), Arc::clone(&gate));
            (self, gate)
        }

        fn count(&self, path: &str) -> usize {
            self.requests.lock().unwrap().iter().filter(|r| r.path == path).count()
        }

        fn next_reply(&self, path: &str) -> Result<ApiResponse> {
            let mut script = self.script.lock().unwrap();
            let Some(replies) = script.get_mut(path) else {
                return Ok(ApiResponse::new(404, "{}"));
            };
            match replies.len() {
                0 => Ok(ApiResponse::new(404, "{}")),
                1 => match &replies[0] {
                    Ok(r) => Ok(r.clone()),
                    Err(e) => Err(AdminClientError::Http(e.to_string())),
                },
                _ => replies.remove(0),
            }
        }
    }

    #[async_trait]
    impl Transport for MockApi {
        async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
            let path = request.path.clone();
            self.requests.lock().unwrap().push(request);
            if let Some(gate) = self.gates.get(&path) {
                self.entered.notify_one();
                gate.acquire().await.unwrap().forget();
            }
            self.next_reply(&path)
        }
    }

    fn status_body(connected: u64, admins: u64) -> ApiResponse {
        ApiResponse::new(
            200,
            format!(r#"{{"connectedCount":{connected},"adminConnectedCount":{admins},"players":[]}}"#),
        )
    }

    fn vehicles_body(n: usize) -> ApiResponse {
        let list: Vec<String> = (0..n)
            .map(|i| format!(r#"{{"id":"v{i}","type":"car","owner":"p{i}","state":0.5}}"#))
            .collect();
        ApiResponse::new(200, format!(r#"{{"vehicles":[{}]}}"#, list.join(",")))
    }

    fn config() -> ClientConfig {
        ClientConfig::default().with_poll_interval(Duration::from_secs(10))
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn first_cycle_is_immediate_and_carries_bearer() {
        let api = Arc::new(
            MockApi::default()
                .with("/status", vec![Ok(status_body(3, 1))])
                .with("/vehicles", vec![Ok(vehicles_body(2))]),
        );
        let (engine, _events) = SyncEngine::start(api.clone(), "T1", &config());
        let mut rx = engine.subscribe();

        rx.wait_for(|s| s.status.connected_count == 3 && s.vehicles.len() == 2)
            .await
            .unwrap();

        assert_eq!(engine.cycles(), 1);
        let requests = api.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.bearer.as_deref() == Some("T1")));
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_fixed_interval() {
        let api = Arc::new(
            MockApi::default()
                .with("/status", vec![Ok(status_body(1, 0))])
                .with("/vehicles", vec![Ok(vehicles_body(0))]),
        );
        let (engine, _events) = SyncEngine::start(api.clone(), "T1", &config());

        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(engine.cycles(), 3);
        assert_eq!(api.count("/status"), 3);
        assert_eq!(api.count("/vehicles"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn success_replaces_snapshot_wholesale() {
        let api = Arc::new(
            MockApi::default()
                .with("/status", vec![Ok(status_body(5, 2)), Ok(ApiResponse::new(200, "{}"))])
                .with("/vehicles", vec![Ok(vehicles_body(3)), Ok(vehicles_body(1))]),
        );
        let (engine, _events) = SyncEngine::start(api, "T1", &config());

        tokio::time::sleep(Duration::from_secs(15)).await;

        let state = engine.state();
        // The second status reply had no fields: counts reset, not merged.
        assert_eq!(state.status, StatusSnapshot::default());
        assert_eq!(state.vehicles.len(), 1);
        assert!(!state.status_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_last_known_snapshot() {
        let api = Arc::new(
            MockApi::default()
                .with("/status", vec![Ok(status_body(4, 1)), Ok(ApiResponse::new(500, "boom"))])
                .with(
                    "/vehicles",
                    vec![
                        Ok(vehicles_body(2)),
                        Err(AdminClientError::Http("connection reset".into())),
                    ],
                ),
        );
        let (engine, mut events) = SyncEngine::start(api, "T1", &config());

        tokio::time::sleep(Duration::from_secs(15)).await;

        let state = engine.state();
        assert_eq!(state.status.connected_count, 4);
        assert_eq!(state.status.admin_connected_count, 1);
        assert_eq!(state.vehicles.len(), 2);
        assert!(state.status_stale);
        assert!(state.vehicles_stale);

        let mut failures = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SyncEvent::PollFailed { .. }) {
                failures += 1;
            }
        }
        assert_eq!(failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_success_body_is_a_failure() {
        let api = Arc::new(
            MockApi::default()
                .with("/status", vec![Ok(status_body(7, 0)), Ok(ApiResponse::new(200, "not json"))])
                .with("/vehicles", vec![Ok(vehicles_body(1))]),
        );
        let (engine, _events) = SyncEngine::start(api, "T1", &config());

        tokio::time::sleep(Duration::from_secs(15)).await;

        let state = engine.state();
        assert_eq!(state.status.connected_count, 7);
        assert!(state.status_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_schedule() {
        let api = Arc::new(
            MockApi::default()
                .with("/status", vec![Ok(status_body(1, 0))])
                .with("/vehicles", vec![Ok(vehicles_body(1))]),
        );
        let (mut engine, mut events) = SyncEngine::start(api.clone(), "T1", &config());
        let mut rx = engine.subscribe();
        rx.wait_for(|s| s.vehicles.len() == 1).await.unwrap();

        engine.stop();
        assert!(!engine.is_active());
        assert_eq!(engine.state().vehicles.len(), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.count("/status"), 1);
        assert_eq!(api.count("/vehicles"), 1);

        // Stop is idempotent and emits `Stopped` once.
        engine.stop();
        let mut stopped = 0;
        while let Ok(event) = events.try_recv() {
            if event == SyncEvent::Stopped {
                stopped += 1;
            }
        }
        assert_eq!(stopped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_after_stop_is_discarded() {
        let (api, gate) = MockApi::default()
            .with("/status", vec![Ok(status_body(9, 9))])
            .with("/vehicles", vec![Ok(vehicles_body(1))])
            .gated("/status");
        let api = Arc::new(api);
        let (mut engine, _events) = SyncEngine::start(api.clone(), "T1", &config());
        let mut rx = engine.subscribe();

        // Wait until the status request is in flight.
        api.entered.notified().await;
        engine.stop();

        gate.add_permits(16);
        tokio::time::sleep(Duration::from_secs(1)).await;

        let state = rx.borrow_and_update().clone();
        assert!(!state.is_active());
        assert_eq!(state.status, StatusSnapshot::default());
        assert!(state.vehicles.is_empty());
        assert_eq!(api.count("/status"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stopped_is_the_last_event_under_parallel_replies() {
        for _ in 0..50 {
            let api = Arc::new(
                MockApi::default()
                    .with("/status", vec![Ok(status_body(2, 1))])
                    .with("/vehicles", vec![Ok(vehicles_body(3))]),
            );
            let (mut engine, mut events) =
                SyncEngine::start(api, "T1", &config().with_event_channel_capacity(256));

            // Stop while the first cycle's replies race on other workers.
            tokio::task::yield_now().await;
            engine.stop();
            tokio::time::sleep(Duration::from_millis(20)).await;

            let mut received = Vec::new();
            while let Ok(event) = events.try_recv() {
                received.push(event);
            }
            assert_eq!(received.last(), Some(&SyncEvent::Stopped), "events: {received:?}");
            assert_eq!(
                received.iter().filter(|e| **e == SyncEvent::Stopped).count(),
                1
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_polling() {
        let api = Arc::new(
            MockApi::default()
                .with("/status", vec![Ok(status_body(1, 0))])
                .with("/vehicles", vec![Ok(vehicles_body(0))]),
        );
        let (engine, _events) = SyncEngine::start(api.clone(), "T1", &config());
        let rx = engine.subscribe();
        tokio::task::yield_now().await;
        drop(engine);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!rx.borrow().is_active());
        assert!(api.count("/status") <= 1);
    }

    #[test]
    fn resource_paths() {
        assert_eq!(Resource::Status.path(), "/status");
        assert_eq!(Resource::Vehicles.path(), "/vehicles");
        assert_eq!(Resource::Vehicles.to_string(), "vehicles");
    }
}
