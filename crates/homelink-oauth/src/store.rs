//! Credential ownership and refresh coordination.

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{AuthError, AuthResult, Credentials, TokenClient};

/// Owns the hub's single credential record.
///
/// The only component that talks to the authorization server for refresh.
/// Concurrent callers serialize on the credential lock, so a margin
/// violation triggers exactly one refresh attempt. Refresh failures are
/// returned to the caller, never thrown into the stream pipeline; persistent
/// failure means "offline, re-authorization needed", not a crash.
#[derive(Debug)]
pub struct TokenStore {
    client: TokenClient,
    credentials: Mutex<Option<Credentials>>,
}

impl TokenStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(client: TokenClient) -> Self {
        Self {
            client,
            credentials: Mutex::new(None),
        }
    }

    /// Install credentials produced by the authorization callback.
    pub async fn install(&self, credentials: Credentials) {
        *self.credentials.lock().await = Some(credentials);
    }

    /// Drop the credential record entirely.
    ///
    /// A fresh code exchange must not inherit a stale refresh token.
    pub async fn clear(&self) {
        *self.credentials.lock().await = None;
    }

    /// Snapshot of the current record, for inspection.
    pub async fn credentials(&self) -> Option<Credentials> {
        self.credentials.lock().await.clone()
    }

    /// Whether a credential record is held.
    pub async fn is_authorized(&self) -> bool {
        self.credentials.lock().await.is_some()
    }

    /// Return an access token valid for at least the refresh margin,
    /// refreshing first when necessary.
    ///
    /// # Errors
    /// `AuthError::NotAuthorized` with no record held,
    /// `AuthError::NoRefreshToken` when refresh is required but impossible,
    /// otherwise the refresh failure.
    pub async fn valid_access_token(&self) -> AuthResult<String> {
        let mut guard = self.credentials.lock().await;
        let credentials = guard.as_mut().ok_or(AuthError::NotAuthorized)?;

        if !credentials.needs_refresh() {
            return Ok(credentials.access_token.clone());
        }

        debug!("Access token inside refresh margin, refreshing");
        Self::refresh_locked(&self.client, credentials).await
    }

    /// Unconditionally refresh, for the 401 path.
    ///
    /// # Errors
    /// Same failure modes as [`Self::valid_access_token`].
    pub async fn force_refresh(&self) -> AuthResult<String> {
        let mut guard = self.credentials.lock().await;
        let credentials = guard.as_mut().ok_or(AuthError::NotAuthorized)?;
        Self::refresh_locked(&self.client, credentials).await
    }

    async fn refresh_locked(
        client: &TokenClient,
        credentials: &mut Credentials,
    ) -> AuthResult<String> {
        let Some(refresh_token) = credentials.refresh_token.clone() else {
            credentials.last_error = Some(AuthError::NoRefreshToken.to_string());
            return Err(AuthError::NoRefreshToken);
        };

        match client.refresh(&refresh_token).await {
            Ok(response) => {
                credentials.apply_refresh_at(Utc::now(), response);
                Ok(credentials.access_token.clone())
            }
            Err(err) => {
                warn!(error = %err, "Token refresh failed");
                credentials.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OAuthConfig, TokenResponse};

    fn store() -> TokenStore {
        let config = OAuthConfig::new(
            "client-1",
            "secret-1",
            "https://auth.invalid/authorize",
            "https://auth.invalid/token",
            "https://hub.invalid/api",
        )
        .unwrap();
        TokenStore::new(TokenClient::new(reqwest::Client::new(), config))
    }

    fn credentials(expires_in: u64, refresh: Option<&str>) -> Credentials {
        Credentials::from_response(TokenResponse {
            access_token: "access-1".into(),
            expires_in,
            refresh_token: refresh.map(String::from),
            token_type: None,
            scope: None,
        })
    }

    #[tokio::test]
    async fn empty_store_is_not_authorized() {
        let store = store();
        assert!(!store.is_authorized().await);
        assert!(matches!(
            store.valid_access_token().await,
            Err(AuthError::NotAuthorized)
        ));
    }

    #[tokio::test]
    async fn fresh_token_returned_without_refresh() {
        let store = store();
        store.install(credentials(3600, Some("refresh-1"))).await;
        assert_eq!(store.valid_access_token().await.unwrap(), "access-1");
    }

    #[tokio::test]
    async fn stale_token_without_refresh_token_is_terminal() {
        let store = store();
        store.install(credentials(10, None)).await;
        assert!(matches!(
            store.valid_access_token().await,
            Err(AuthError::NoRefreshToken)
        ));
        // Failure is recorded on the credential record.
        let last_error = store.credentials().await.unwrap().last_error;
        assert!(last_error.unwrap().contains("re-authorization"));
    }

    #[tokio::test]
    async fn force_refresh_without_refresh_token_is_terminal() {
        let store = store();
        store.install(credentials(3600, None)).await;
        assert!(matches!(
            store.force_refresh().await,
            Err(AuthError::NoRefreshToken)
        ));
    }

    #[tokio::test]
    async fn clear_drops_record() {
        let store = store();
        store.install(credentials(3600, Some("refresh-1"))).await;
        store.clear().await;
        assert!(store.credentials().await.is_none());
    }
}
