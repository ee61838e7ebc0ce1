//! OAuth error types.

/// Why a state token failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateTokenError {
    /// Token was absent, not decodable, or structurally wrong.
    #[error("malformed token")]
    Malformed,

    /// Integrity tag did not match.
    #[error("signature mismatch")]
    MacMismatch,

    /// Token older than the accepted window.
    #[error("token expired")]
    Expired,

    /// Token claims to be issued in the future.
    #[error("token issued in the future")]
    IssuedInFuture,
}

/// OAuth errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Invalid client configuration.
    #[error("Invalid OAuth configuration: {0}")]
    InvalidConfig(String),

    /// Provider reported an authorization failure on the callback.
    #[error("Authorization failed: {error} - {description}")]
    Provider {
        /// Error code from the provider.
        error: String,
        /// Human-readable description.
        description: String,
    },

    /// Callback carried no authorization code.
    #[error("Callback missing authorization code")]
    MissingCode,

    /// State parameter absent, tampered with, or expired.
    #[error("Invalid state token: {0}")]
    InvalidState(#[from] StateTokenError),

    /// Token endpoint rejected the request with a structured error.
    #[error("Token request rejected: {error} - {description}")]
    TokenRejected {
        /// Error code from the provider.
        error: String,
        /// Human-readable description.
        description: String,
    },

    /// No credentials held; the authorization flow has not completed.
    #[error("Not authorized")]
    NotAuthorized,

    /// No refresh token held; the user must redo the authorization flow.
    #[error("No refresh token available, re-authorization required")]
    NoRefreshToken,

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

impl AuthError {
    /// Whether the failure is transient and worth retrying at next use.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_))
    }

    /// Whether recovery requires the user to redo the authorization flow.
    #[must_use]
    pub const fn requires_reauthorization(&self) -> bool {
        matches!(self, Self::NoRefreshToken | Self::TokenRejected { .. })
    }
}

/// Result type for OAuth operations.
pub type AuthResult<T> = Result<T, AuthError>;
