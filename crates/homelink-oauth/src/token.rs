//! Token endpoint client and credential record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{AuthError, AuthResult, GrantType, OAuthConfig, REFRESH_MARGIN};

/// Token endpoint success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token.
    pub access_token: String,

    /// Lifetime in seconds.
    pub expires_in: u64,

    /// Refresh token (if provided).
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Token type (usually "Bearer").
    #[serde(default)]
    pub token_type: Option<String>,

    /// Granted scopes (space-separated).
    #[serde(default)]
    pub scope: Option<String>,
}

/// Token endpoint structured error response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    /// Error code.
    pub error: String,

    /// Human-readable description.
    #[serde(default)]
    pub error_description: Option<String>,
}

impl From<TokenErrorResponse> for AuthError {
    fn from(body: TokenErrorResponse) -> Self {
        Self::TokenRejected {
            error: body.error,
            description: body.error_description.unwrap_or_default(),
        }
    }
}

/// The hub's OAuth credential record.
///
/// Owned exclusively by the [`TokenStore`](crate::TokenStore); mutated only
/// by refresh and the authorization callback, and cleared entirely at the
/// start of every new authorization attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Current access token.
    pub access_token: String,

    /// Refresh token, if the provider issued one.
    pub refresh_token: Option<String>,

    /// Absolute expiry instant of the access token.
    pub expires_at: DateTime<Utc>,

    /// Most recent token operation failure, for inspection.
    pub last_error: Option<String>,
}

impl Credentials {
    /// Build a credential record from a token response.
    #[must_use]
    pub fn from_response(response: TokenResponse) -> Self {
        Self::from_response_at(Utc::now(), response)
    }

    pub(crate) fn from_response_at(now: DateTime<Utc>, response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: now + Duration::seconds(response.expires_in.min(i64::MAX as u64) as i64),
            last_error: None,
        }
    }

    /// Apply a refresh response, keeping the old refresh token when the
    /// provider does not rotate it.
    pub(crate) fn apply_refresh_at(&mut self, now: DateTime<Utc>, response: TokenResponse) {
        let previous_refresh = self.refresh_token.take();
        *self = Self::from_response_at(now, response);
        if self.refresh_token.is_none() {
            self.refresh_token = previous_refresh;
        }
    }

    /// Whether the token expires within the refresh safety margin.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(Utc::now())
    }

    pub(crate) fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN.as_secs() as i64) >= self.expires_at
    }
}

/// Low-level client for the provider's token endpoint.
///
/// Code exchange and refresh share one request operation parameterized by
/// grant type; transport and provider failures surface to the caller, whose
/// decision retry is.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    config: OAuthConfig,
}

impl TokenClient {
    /// Create a token client.
    #[must_use]
    pub fn new(http: reqwest::Client, config: OAuthConfig) -> Self {
        Self { http, config }
    }

    /// The configuration this client was built with.
    #[must_use]
    pub const fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    /// `AuthError::TokenRejected` on a structured provider error,
    /// `AuthError::Http` on transport failure.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> AuthResult<TokenResponse> {
        self.request_tokens(
            GrantType::AuthorizationCode,
            &[("code", code), ("redirect_uri", redirect_uri)],
        )
        .await
    }

    /// Obtain fresh tokens with a refresh token.
    ///
    /// # Errors
    /// `AuthError::TokenRejected` on a structured provider error,
    /// `AuthError::Http` on transport failure.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenResponse> {
        self.request_tokens(GrantType::RefreshToken, &[("refresh_token", refresh_token)])
            .await
    }

    async fn request_tokens(
        &self,
        grant: GrantType,
        params: &[(&str, &str)],
    ) -> AuthResult<TokenResponse> {
        let grant_type = grant.to_string();
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", &grant_type),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
        ];
        form.extend_from_slice(params);

        debug!(grant = %grant_type, url = %self.config.token_url, "Requesting tokens");

        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<TokenResponse>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(structured) => Err(structured.into()),
            Err(_) => Err(AuthError::TokenRejected {
                error: format!("http_{}", status.as_u16()),
                description: body,
            }),
        }
    }
}
