//! Platform error types.

use std::time::Duration;

use homelink_oauth::AuthError;
use serde::Deserialize;

/// Structured error payload returned by the platform API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// The error object.
    pub error: ApiErrorDetail,
}

/// Inner error object of an [`ApiErrorBody`].
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error key.
    #[serde(default)]
    pub key: Option<String>,

    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Platform errors.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Token acquisition or refresh failed.
    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),

    /// Platform API rejected the request.
    #[error("Platform API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Machine-readable error key, when the platform provided one.
        key: Option<String>,
        /// Human-readable message.
        message: String,
    },

    /// Daily call budget exhausted.
    #[error("Rate limited by the platform")]
    RateLimited {
        /// Provider reset hint in seconds, when present.
        retry_after: Option<u64>,
    },

    /// Event stream failed.
    #[error("Stream error: {0}")]
    Stream(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// URL construction failed.
    #[error("URL parsing failed: {0}")]
    Url(#[from] url::ParseError),
}

impl PlatformError {
    /// Whether a retry (with backoff) can reasonably succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Stream(_) | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Auth(err) => err.is_retryable(),
            Self::Json(_) | Self::Url(_) => false,
        }
    }

    /// The suggested retry delay, when the provider supplied one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// Whether the platform signalled call-budget exhaustion.
    #[must_use]
    pub const fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Result type for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;
