//! OAuth client configuration.

use url::Url;

use crate::{AuthError, AuthResult};

/// Configuration for the authorization-code flow.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Registered client identifier.
    pub client_id: String,

    /// Client secret; also keys the state-token MAC.
    pub client_secret: String,

    /// Provider authorization endpoint (user redirect target).
    pub authorize_url: Url,

    /// Provider token endpoint.
    pub token_url: Url,

    /// Base URL the callback route is mounted under.
    pub callback_base_url: Url,

    /// Requested scopes.
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// Create a configuration.
    ///
    /// # Errors
    /// Returns `AuthError::Url` if any endpoint fails to parse.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authorize_url: &str,
        token_url: &str,
        callback_base_url: &str,
    ) -> AuthResult<Self> {
        Ok(Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorize_url: Url::parse(authorize_url)?,
            token_url: Url::parse(token_url)?,
            callback_base_url: Url::parse(callback_base_url)?,
            scopes: Vec::new(),
        })
    }

    /// Set the requested scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Space-joined scope string for the authorize request.
    #[must_use]
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidConfig` if credentials are empty.
    pub fn validate(&self) -> AuthResult<()> {
        if self.client_id.is_empty() {
            return Err(AuthError::InvalidConfig("client_id cannot be empty".into()));
        }
        if self.client_secret.is_empty() {
            return Err(AuthError::InvalidConfig(
                "client_secret cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OAuthConfig {
        OAuthConfig::new(
            "client-1",
            "secret-1",
            "https://auth.example.com/authorize",
            "https://auth.example.com/token",
            "https://hub.local/api",
        )
        .unwrap()
    }

    #[test]
    fn scope_param_joins_with_spaces() {
        let config = config().with_scopes(["IdentifyAppliance", "Monitor", "Control"]);
        assert_eq!(config.scope_param(), "IdentifyAppliance Monitor Control");
    }

    #[test]
    fn validate_rejects_empty_client_id() {
        let mut config = config();
        config.client_id.clear();
        assert!(matches!(
            config.validate(),
            Err(AuthError::InvalidConfig(_))
        ));
    }

    #[test]
    fn bad_url_is_rejected_at_construction() {
        let result = OAuthConfig::new("c", "s", "not a url", "https://ok", "https://ok");
        assert!(matches!(result, Err(AuthError::Url(_))));
    }
}
