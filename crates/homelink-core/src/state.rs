//! Stream connection state machine vocabulary.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// State of the single account-wide event-stream connection.
///
/// Owned and mutated solely by the connection supervisor; every other
/// component only observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and none being attempted.
    Disconnected,

    /// A connection attempt is in flight.
    Connecting,

    /// Stream established; events are flowing (or heartbeats are arriving).
    Connected,

    /// Provider signalled call-budget exhaustion; no attempts until `until`.
    RateLimited {
        /// When attempts may resume.
        until: DateTime<Utc>,
    },

    /// Waiting out an exponential-backoff delay after a failure.
    Backoff {
        /// Consecutive failed attempts so far.
        attempt: u32,
        /// When the next attempt is scheduled.
        next_attempt_at: DateTime<Utc>,
    },
}

impl ConnectionState {
    /// Whether the stream is currently established.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether reconnect attempts are currently suspended.
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::RateLimited { until } => write!(f, "rate-limited until {until}"),
            Self::Backoff {
                attempt,
                next_attempt_at,
            } => write!(f, "backoff (attempt {attempt}, next {next_attempt_at})"),
        }
    }
}
