//! REST funnel to the appliance platform.

use std::sync::Arc;
use std::time::Duration;

use homelink_core::{ApplianceDescriptor, ApplianceId, DeviceCommand};
use homelink_oauth::TokenStore;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::{ApiErrorBody, PlatformError, PlatformResult};

/// Timeout for plain REST calls. The event stream is opened without one.
const REST_TIMEOUT: Duration = Duration::from_secs(30);

/// All platform REST traffic flows through this client.
///
/// Centralizing the calls means one place obtains a valid token, and one
/// place enforces "force-refresh and retry exactly once" when the platform
/// answers 401.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    http: reqwest::Client,
    api_base_url: Url,
    store: Arc<TokenStore>,
}

impl PlatformClient {
    /// Create a client.
    ///
    /// `http` must not carry a client-wide timeout; it would sever the
    /// long-lived event stream.
    #[must_use]
    pub fn new(http: reqwest::Client, api_base_url: Url, store: Arc<TokenStore>) -> Self {
        Self {
            http,
            api_base_url,
            store,
        }
    }

    /// The token store this client authenticates with.
    #[must_use]
    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// List the account's appliances.
    ///
    /// # Errors
    /// See [`PlatformError`].
    pub async fn appliances(&self) -> PlatformResult<Vec<ApplianceDescriptor>> {
        let url = self.endpoint(&["appliances"])?;
        let response = self
            .send_authorized(|token| {
                self.http
                    .get(url.clone())
                    .bearer_auth(token)
                    .timeout(REST_TIMEOUT)
            })
            .await?;
        Ok(response.json().await?)
    }

    /// Fetch current status for one appliance.
    ///
    /// # Errors
    /// See [`PlatformError`].
    pub async fn status(&self, id: &ApplianceId) -> PlatformResult<serde_json::Value> {
        self.get_json(&["appliances", id.as_str(), "status"]).await
    }

    /// Fetch settings for one appliance.
    ///
    /// # Errors
    /// See [`PlatformError`].
    pub async fn settings(&self, id: &ApplianceId) -> PlatformResult<serde_json::Value> {
        self.get_json(&["appliances", id.as_str(), "settings"]).await
    }

    /// Fetch the active program, if any.
    ///
    /// # Errors
    /// See [`PlatformError`].
    pub async fn active_program(&self, id: &ApplianceId) -> PlatformResult<serde_json::Value> {
        self.get_json(&["appliances", id.as_str(), "programs", "active"])
            .await
    }

    /// Fetch the programs the appliance currently offers.
    ///
    /// # Errors
    /// See [`PlatformError`].
    pub async fn available_programs(&self, id: &ApplianceId) -> PlatformResult<serde_json::Value> {
        self.get_json(&["appliances", id.as_str(), "programs", "available"])
            .await
    }

    /// Issue a control command to one appliance.
    ///
    /// # Errors
    /// See [`PlatformError`].
    pub async fn put_command(
        &self,
        id: &ApplianceId,
        command: &DeviceCommand,
    ) -> PlatformResult<()> {
        let url = self.endpoint(&["appliances", id.as_str(), "commands"])?;
        let body = json!({ "data": { "key": command.key, "value": command.value } });
        self.send_authorized(|token| {
            self.http
                .put(url.clone())
                .bearer_auth(token)
                .timeout(REST_TIMEOUT)
                .json(&body)
        })
        .await?;
        Ok(())
    }

    /// Start a program on one appliance.
    ///
    /// # Errors
    /// See [`PlatformError`].
    pub async fn start_program(
        &self,
        id: &ApplianceId,
        program: &serde_json::Value,
    ) -> PlatformResult<()> {
        let url = self.endpoint(&["appliances", id.as_str(), "programs", "active"])?;
        let body = json!({ "data": program });
        self.send_authorized(|token| {
            self.http
                .put(url.clone())
                .bearer_auth(token)
                .timeout(REST_TIMEOUT)
                .json(&body)
        })
        .await?;
        Ok(())
    }

    /// Stop the active program on one appliance.
    ///
    /// # Errors
    /// See [`PlatformError`].
    pub async fn stop_program(&self, id: &ApplianceId) -> PlatformResult<()> {
        let url = self.endpoint(&["appliances", id.as_str(), "programs", "active"])?;
        self.send_authorized(|token| {
            self.http
                .delete(url.clone())
                .bearer_auth(token)
                .timeout(REST_TIMEOUT)
        })
        .await?;
        Ok(())
    }

    /// Open the account-wide event stream.
    ///
    /// The returned response's byte stream carries SSE frames; the caller
    /// owns idle detection and reconnection.
    ///
    /// # Errors
    /// See [`PlatformError`]; a 429 surfaces as `RateLimited`.
    pub async fn open_event_stream(&self) -> PlatformResult<Response> {
        let url = self.endpoint(&["appliances", "events"])?;
        self.send_authorized(|token| {
            self.http
                .get(url.clone())
                .bearer_auth(token)
                .header(reqwest::header::ACCEPT, "text/event-stream")
        })
        .await
    }

    async fn get_json(&self, segments: &[&str]) -> PlatformResult<serde_json::Value> {
        let url = self.endpoint(segments)?;
        let response = self
            .send_authorized(|token| {
                self.http
                    .get(url.clone())
                    .bearer_auth(token)
                    .timeout(REST_TIMEOUT)
            })
            .await?;
        Ok(response.json().await?)
    }

    async fn send_authorized<F>(&self, build: F) -> PlatformResult<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.store.valid_access_token().await?;
        let response = build(&token).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Platform answered 401, forcing refresh and retrying once");
            let token = self.store.force_refresh().await?;
            let response = build(&token).send().await?;
            return Self::check(response).await;
        }

        Self::check(response).await
    }

    async fn check(response: Response) -> PlatformResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(PlatformError::RateLimited { retry_after });
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(parsed) => Err(PlatformError::Api {
                status: status.as_u16(),
                key: parsed.error.key,
                message: parsed.error.description.unwrap_or_default(),
            }),
            Err(_) => Err(PlatformError::Api {
                status: status.as_u16(),
                key: None,
                message: body,
            }),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> PlatformResult<Url> {
        let mut url = self.api_base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                PlatformError::Stream("API base URL cannot carry a path".into())
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homelink_oauth::{OAuthConfig, TokenClient};

    fn client(base: &str) -> PlatformClient {
        let config = OAuthConfig::new(
            "client-1",
            "secret-1",
            "https://auth.invalid/authorize",
            "https://auth.invalid/token",
            "https://hub.invalid/api",
        )
        .unwrap();
        let store = Arc::new(TokenStore::new(TokenClient::new(
            reqwest::Client::new(),
            config,
        )));
        PlatformClient::new(reqwest::Client::new(), Url::parse(base).unwrap(), store)
    }

    #[test]
    fn endpoint_joins_segments() {
        let client = client("https://api.example.com/v1");
        let url = client
            .endpoint(&["appliances", "ap-1", "programs", "active"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/appliances/ap-1/programs/active"
        );
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let client = client("https://api.example.com/v1/");
        let url = client.endpoint(&["appliances"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/appliances");
    }
}
