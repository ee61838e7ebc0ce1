//! Homelink OAuth
//!
//! Authorization-code flow and token lifecycle against the appliance
//! platform's authorization server:
//!
//! - **Stateless CSRF protection**: the `state` parameter is a self-verifying
//!   HMAC-SHA256 token bounded to a 10-minute window; no server-side session.
//! - **Token management**: proactive refresh inside a safety margin, forced
//!   refresh on 401, distinct "no refresh token" vs "refresh rejected"
//!   failures.
//! - **Single token request**: code exchange and refresh share one
//!   grant-type-parameterized request; retry policy belongs to callers.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod flow;
mod state_token;
mod store;
mod token;

pub use config::*;
pub use error::*;
pub use flow::*;
pub use state_token::*;
pub use store::*;
pub use token::*;

use std::time::Duration;

/// Maximum accepted age of a state token.
pub const STATE_TOKEN_MAX_AGE: Duration = Duration::from_secs(600);

/// Refresh when the access token expires within this margin.
///
/// Prevents a request being issued with a token that expires mid-flight.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// OAuth grant types used against the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    /// Authorization code grant (user authorization flow).
    AuthorizationCode,
    /// Refresh token grant.
    RefreshToken,
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthorizationCode => write!(f, "authorization_code"),
            Self::RefreshToken => write!(f, "refresh_token"),
        }
    }
}
