//! Client configuration.
//!
//! The API base URL is resolved once, at startup:
//! 1. `SCUM_ADMIN_API_BASE` environment variable (if set and non-empty)
//! 2. `http://localhost:4000/api` (default)
//!
//! The session file lives in the admin home directory:
//! 1. `SCUM_ADMIN_HOME` environment variable (if set)
//! 2. `<config dir>/scum-admin` (e.g. `~/.config/scum-admin`)

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the API base URL.
pub const API_BASE_ENV: &str = "SCUM_ADMIN_API_BASE";

/// Environment variable overriding the admin home directory.
pub const HOME_ENV: &str = "SCUM_ADMIN_HOME";

/// Fallback API base URL.
pub const DEFAULT_API_BASE: &str = "http://localhost:4000/api";

/// Default cadence of the polling sync engine.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the bounded sync event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Configuration for an [`AdminClient`](crate::AdminClient).
///
/// # Example
///
/// ```
/// use scum_admin_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new("https://scum.example.com/api")
///     .with_poll_interval(Duration::from_secs(5));
/// assert_eq!(config.base_url, "https://scum.example.com/api");
/// assert_eq!(config.poll_interval, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the administration API, without a trailing slash.
    pub base_url: String,
    /// Interval between poll cycles.
    ///
    /// Defaults to **10 seconds**. Zero is clamped to one millisecond.
    pub poll_interval: Duration,
    /// Timeout applied to every HTTP request.
    pub request_timeout: Duration,
    /// Capacity of the bounded sync event channel.
    ///
    /// Defaults to **64**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// File backing the persisted session.
    pub session_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Create a configuration for `base_url` with default values.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            session_path: default_session_path(),
        }
    }

    /// Resolve the configuration from the environment.
    pub fn from_env() -> Self {
        let base_url = std::env::var(API_BASE_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self::new(base_url)
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Defaults to **64**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = Some(path.into());
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

/// Returns the admin home directory, or `None` when no config directory can
/// be determined.
pub fn admin_home() -> Option<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV) {
        if !home.trim().is_empty() {
            return Some(PathBuf::from(home));
        }
    }
    dirs::config_dir().map(|d| d.join("scum-admin"))
}

/// Returns the default path of the persisted session file.
pub fn default_session_path() -> Option<PathBuf> {
    admin_home().map(|h| h.join("session.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_API_BASE);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.event_channel_capacity, 64);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        assert_eq!(
            ClientConfig::new("http://host/api/").base_url,
            "http://host/api"
        );
    }

    #[test]
    fn builder_clamps() {
        let config = ClientConfig::default()
            .with_event_channel_capacity(0)
            .with_poll_interval(Duration::ZERO);
        assert_eq!(config.event_channel_capacity, 1);
        assert_eq!(config.poll_interval, Duration::from_millis(1));
    }

    #[test]
    fn explicit_session_path_wins() {
        let config = ClientConfig::default().with_session_path("/tmp/s.json");
        assert_eq!(config.session_path, Some(PathBuf::from("/tmp/s.json")));
    }
}
