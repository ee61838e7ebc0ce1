//! Hub configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use homelink_core::ApplianceId;
use homelink_oauth::OAuthConfig;
use homelink_platform::StreamConfig;

use crate::{HubError, HubResult};

/// Configuration for the whole bridge, loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Registered OAuth client identifier.
    pub client_id: String,

    /// OAuth client secret.
    pub client_secret: String,

    /// Platform REST base URL.
    pub api_base_url: String,

    /// Provider authorization endpoint.
    pub authorize_url: String,

    /// Provider token endpoint.
    pub token_url: String,

    /// Base URL the OAuth callback route is mounted under.
    pub callback_base_url: String,

    /// Requested OAuth scopes.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Appliance ids the user selected for bridging.
    #[serde(default)]
    pub selected_appliances: Vec<String>,

    /// Stream idle timeout in seconds.
    #[serde(default = "default_idle_timeout_s")]
    pub idle_timeout_s: u64,

    /// First reconnect backoff delay in seconds.
    #[serde(default = "default_backoff_initial_s")]
    pub backoff_initial_s: u64,

    /// Reconnect backoff ceiling in seconds.
    #[serde(default = "default_backoff_max_s")]
    pub backoff_max_s: u64,

    /// Connected period after which the backoff streak resets, in seconds.
    #[serde(default = "default_sustained_reset_s")]
    pub sustained_reset_s: u64,

    /// Delay before the post-creation initialization pass, in seconds.
    #[serde(default = "default_init_delay_s")]
    pub init_delay_s: u64,
}

fn default_scopes() -> Vec<String> {
    ["IdentifyAppliance", "Monitor", "Settings", "Control"]
        .into_iter()
        .map(String::from)
        .collect()
}

const fn default_idle_timeout_s() -> u64 {
    300
}

const fn default_backoff_initial_s() -> u64 {
    2
}

const fn default_backoff_max_s() -> u64 {
    300
}

const fn default_sustained_reset_s() -> u64 {
    600
}

const fn default_init_delay_s() -> u64 {
    5
}

impl HubConfig {
    /// Parse from a TOML string.
    ///
    /// # Errors
    /// Returns `HubError::Toml` on syntax or shape errors.
    pub fn from_toml_str(raw: &str) -> HubResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Load from a TOML file.
    ///
    /// # Errors
    /// Returns `HubError::Io` if unreadable, `HubError::Toml` if invalid.
    pub fn load(path: &Path) -> HubResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Validate credentials and URLs.
    ///
    /// # Errors
    /// Returns `HubError::Config` naming the offending field.
    pub fn validate(&self) -> HubResult<()> {
        if self.client_id.is_empty() {
            return Err(HubError::Config("client_id cannot be empty".into()));
        }
        if self.client_secret.is_empty() {
            return Err(HubError::Config("client_secret cannot be empty".into()));
        }
        for (field, value) in [
            ("api_base_url", &self.api_base_url),
            ("authorize_url", &self.authorize_url),
            ("token_url", &self.token_url),
            ("callback_base_url", &self.callback_base_url),
        ] {
            Url::parse(value)
                .map_err(|e| HubError::Config(format!("{field} is not a valid URL: {e}")))?;
        }
        if self.backoff_initial_s == 0 {
            return Err(HubError::Config("backoff_initial_s must be positive".into()));
        }
        if self.backoff_max_s < self.backoff_initial_s {
            return Err(HubError::Config(
                "backoff_max_s must be at least backoff_initial_s".into(),
            ));
        }
        Ok(())
    }

    /// The OAuth layer configuration.
    ///
    /// # Errors
    /// Returns `HubError::Auth` if URLs fail to parse.
    pub fn oauth_config(&self) -> HubResult<OAuthConfig> {
        let config = OAuthConfig::new(
            self.client_id.clone(),
            self.client_secret.clone(),
            &self.authorize_url,
            &self.token_url,
            &self.callback_base_url,
        )
        .map_err(HubError::Auth)?
        .with_scopes(self.scopes.clone());
        Ok(config)
    }

    /// The stream supervisor timing knobs.
    #[must_use]
    pub const fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            idle_timeout: Duration::from_secs(self.idle_timeout_s),
            backoff_initial: Duration::from_secs(self.backoff_initial_s),
            backoff_max: Duration::from_secs(self.backoff_max_s),
            sustained_reset: Duration::from_secs(self.sustained_reset_s),
        }
    }

    /// Delay before the deferred initialization pass.
    #[must_use]
    pub const fn init_delay(&self) -> Duration {
        Duration::from_secs(self.init_delay_s)
    }

    /// The selected appliance ids.
    #[must_use]
    pub fn selection(&self) -> Vec<ApplianceId> {
        self.selected_appliances
            .iter()
            .map(|id| ApplianceId::new(id.clone()))
            .collect()
    }
}
