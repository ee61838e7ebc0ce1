//! Authorization-code flow handler.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::{
    AuthError, AuthResult, Credentials, StateToken, StateTokenError, TokenClient, TokenStore,
};

/// The install-lifetime callback-addressing token.
///
/// The authorization server compares the registered redirect URI
/// byte-for-byte, so this is generated once and reused for every subsequent
/// authorization URL. Hosts that persist it restore it with
/// [`CallbackBinding::restore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackBinding {
    token: String,
}

impl CallbackBinding {
    /// Generate a fresh binding.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Restore a binding persisted by the host.
    pub fn restore(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// The raw callback token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The full redirect URI registered with the provider.
    ///
    /// # Errors
    /// `AuthError::InvalidConfig` if the base URL cannot carry a path.
    pub fn redirect_uri(&self, base: &Url) -> AuthResult<Url> {
        let mut url = base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                AuthError::InvalidConfig("callback base URL cannot carry a path".into())
            })?;
            segments.pop_if_empty().push("oauth").push("callback");
        }
        url.query_pairs_mut().append_pair("access_token", &self.token);
        Ok(url)
    }
}

/// Drives the authorization-code exchange.
///
/// Produces the outbound authorization URL and validates the callback:
/// provider error, then missing code, then state validation, then a fresh
/// code exchange that never merges with previously held tokens.
pub struct AuthFlow {
    client: TokenClient,
    store: Arc<TokenStore>,
    binding: Mutex<Option<CallbackBinding>>,
}

impl AuthFlow {
    /// Create a flow handler.
    #[must_use]
    pub fn new(client: TokenClient, store: Arc<TokenStore>) -> Self {
        Self {
            client,
            store,
            binding: Mutex::new(None),
        }
    }

    /// Adopt a callback binding persisted by the host.
    pub fn restore_binding(&self, binding: CallbackBinding) {
        *self.binding.lock() = Some(binding);
    }

    /// The current callback binding, if one exists yet.
    #[must_use]
    pub fn callback_binding(&self) -> Option<CallbackBinding> {
        self.binding.lock().clone()
    }

    /// The registered redirect URI, creating the binding lazily.
    ///
    /// # Errors
    /// `AuthError::InvalidConfig` if the callback base URL is unusable.
    pub fn redirect_uri(&self) -> AuthResult<Url> {
        self.ensure_binding()
            .redirect_uri(&self.client.config().callback_base_url)
    }

    fn ensure_binding(&self) -> CallbackBinding {
        self.binding
            .lock()
            .get_or_insert_with(CallbackBinding::generate)
            .clone()
    }

    /// Build the provider authorization URL with a fresh state token.
    ///
    /// # Errors
    /// `AuthError::InvalidConfig` on empty credentials or unusable callback
    /// base URL.
    pub fn authorization_url(&self) -> AuthResult<Url> {
        let config = self.client.config();
        config.validate()?;
        let redirect_uri = self.redirect_uri()?;

        let mut url = config.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &config.scope_param())
            .append_pair(
                "state",
                &StateToken::issue(&config.client_id, &config.client_secret),
            );
        Ok(url)
    }

    /// Validate the provider callback and exchange the code for credentials.
    ///
    /// Terminal failures (provider error, missing code, invalid state) are
    /// surfaced for the host to render; they are never silently retried.
    ///
    /// # Errors
    /// See [`AuthError`]; `Provider`, `MissingCode` and `InvalidState` are
    /// terminal per attempt.
    pub async fn handle_callback(&self, params: &HashMap<String, String>) -> AuthResult<()> {
        if let Some(error) = params.get("error") {
            return Err(AuthError::Provider {
                error: error.clone(),
                description: params
                    .get("error_description")
                    .cloned()
                    .unwrap_or_default(),
            });
        }

        let code = params.get("code").ok_or(AuthError::MissingCode)?;

        let state = params
            .get("state")
            .ok_or(AuthError::InvalidState(StateTokenError::Malformed))?;
        let config = self.client.config();
        StateToken::validate(state, &config.client_id, &config.client_secret)?;

        // A fresh exchange must not merge with previously held tokens.
        self.store.clear().await;

        let redirect_uri = self.redirect_uri()?;
        let response = self.client.exchange_code(code, redirect_uri.as_str()).await?;
        self.store.install(Credentials::from_response(response)).await;
        info!("Authorization code exchanged, credentials installed");
        Ok(())
    }
}
