//! Agent configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Numeric settings fall back to their
//! defaults when missing or unparsable; addresses, URLs, subjects and the
//! patch list are validated and reported as [`SyncError::Config`].

use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::{Subject, SubjectKind};
use crate::error::SyncError;
use crate::realtime::ReconnectPolicy;
use crate::service::PatchPolicy;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Plain,
    /// One JSON object per line.
    Json,
}

/// Top-level agent configuration.
///
/// Loaded once at startup via [`SyncConfig::from_env`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Socket address of the local HTTP/WebSocket surface.
    pub listen_addr: SocketAddr,

    /// Base URL of the backend REST API (e.g. `http://localhost:5000/api`).
    pub api_base_url: String,

    /// WebSocket URL of the push channel.
    pub push_url: String,

    /// Bearer token for the push channel and snapshot requests.
    pub auth_token: Option<String>,

    /// Subject to initialize at startup.
    pub initial_subject: Option<Subject>,

    /// Consecutive failed connects before the push link gives up.
    pub reconnect_attempts: u32,

    /// Milliseconds between push connect attempts.
    pub reconnect_delay_ms: u64,

    /// Timeout in seconds for snapshot requests and push handshakes.
    pub request_timeout_secs: u64,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,

    /// Event kinds that mutate the snapshot.
    pub patch_policy: PatchPolicy,

    /// Additional push events to subscribe to.
    pub extra_events: Vec<String>,

    /// Tracing output format.
    pub log_format: LogFormat,
}

impl SyncConfig {
    /// Loads configuration from the process environment.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if a setting is present but invalid.
    pub fn from_env() -> Result<Self, SyncError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which returns the raw value
    /// of a variable.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if a setting is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SyncError> {
        let listen_addr: SocketAddr = lookup("LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:4100".to_string())
            .parse()
            .map_err(|e| SyncError::Config(format!("LISTEN_ADDR: {e}")))?;

        let api_base_url = non_blank(lookup("API_BASE_URL"))
            .unwrap_or_else(|| "http://localhost:5000/api".to_string());
        let push_url =
            non_blank(lookup("PUSH_URL")).unwrap_or_else(|| "ws://localhost:5000/ws".to_string());
        let auth_token = non_blank(lookup("AUTH_TOKEN"));

        let initial_subject = match (
            non_blank(lookup("SUBJECT_KIND")),
            non_blank(lookup("SUBJECT_ID")),
        ) {
            (Some(kind), Some(id)) => Some(Subject::new(kind.parse::<SubjectKind>()?, id)?),
            (None, None) => None,
            _ => {
                return Err(SyncError::Config(
                    "SUBJECT_KIND and SUBJECT_ID must be set together".to_string(),
                ));
            }
        };

        let reconnect_attempts = parse_env(&lookup, "RECONNECT_ATTEMPTS", 5);
        let reconnect_delay_ms = parse_env(&lookup, "RECONNECT_DELAY_MS", 1000);
        let request_timeout_secs = parse_env(&lookup, "REQUEST_TIMEOUT_SECS", 10);
        let event_bus_capacity = parse_env(&lookup, "EVENT_BUS_CAPACITY", 1024);

        let patch_policy = PatchPolicy::parse_list(&lookup("SYNC_PATCH_EVENTS").unwrap_or_default())?;
        let extra_events = lookup("SYNC_EXTRA_EVENTS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Plain,
        };

        Ok(Self {
            listen_addr,
            api_base_url,
            push_url,
            auth_token,
            initial_subject,
            reconnect_attempts,
            reconnect_delay_ms,
            request_timeout_secs,
            event_bus_capacity,
            patch_policy,
            extra_events,
            log_format,
        })
    }

    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Retry policy for the push link.
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            attempts: self.reconnect_attempts,
            delay: Duration::from_millis(self.reconnect_delay_ms),
            connect_timeout: self.request_timeout(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
