//! Self-verifying CSRF state tokens.
//!
//! The outbound authorization redirect carries a `state` value of the form
//! `base64url(issued_at_millis "." hex(hmac_sha256(secret, issued_at ":" client_id)))`.
//! No server-side session is kept: validity is proven by recomputing the MAC
//! and bounding the issue age to [`STATE_TOKEN_MAX_AGE`]. Replay within the
//! window is a known residual risk.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{STATE_TOKEN_MAX_AGE, StateTokenError};

type HmacSha256 = Hmac<Sha256>;

/// Issuer/validator for stateless CSRF tokens.
pub struct StateToken;

impl StateToken {
    /// Issue a fresh state token.
    #[must_use]
    pub fn issue(client_id: &str, client_secret: &str) -> String {
        Self::issue_at(Utc::now(), client_id, client_secret)
    }

    /// Validate a state token received on the callback.
    ///
    /// # Errors
    /// Returns the specific [`StateTokenError`]: malformed encoding, MAC
    /// mismatch (tamper/CSRF), or age outside the accepted window.
    pub fn validate(
        token: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<(), StateTokenError> {
        Self::validate_at(Utc::now(), token, client_id, client_secret)
    }

    fn issue_at(now: DateTime<Utc>, client_id: &str, client_secret: &str) -> String {
        let millis = now.timestamp_millis();
        let tag = Self::sign(millis, client_id, client_secret);
        URL_SAFE_NO_PAD.encode(format!("{millis}.{}", hex::encode(tag)))
    }

    fn validate_at(
        now: DateTime<Utc>,
        token: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<(), StateTokenError> {
        let decoded = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| StateTokenError::Malformed)?;
        let decoded = String::from_utf8(decoded).map_err(|_| StateTokenError::Malformed)?;
        let (millis, tag_hex) = decoded.split_once('.').ok_or(StateTokenError::Malformed)?;
        let millis: i64 = millis.parse().map_err(|_| StateTokenError::Malformed)?;
        let tag = hex::decode(tag_hex).map_err(|_| StateTokenError::Malformed)?;

        let mut mac = Self::mac(client_secret);
        mac.update(Self::message(millis, client_id).as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| StateTokenError::MacMismatch)?;

        let issued_at =
            DateTime::from_timestamp_millis(millis).ok_or(StateTokenError::Malformed)?;
        let age = now.signed_duration_since(issued_at);
        if age < Duration::zero() {
            return Err(StateTokenError::IssuedInFuture);
        }
        if age > Duration::seconds(STATE_TOKEN_MAX_AGE.as_secs() as i64) {
            return Err(StateTokenError::Expired);
        }
        Ok(())
    }

    fn sign(millis: i64, client_id: &str, client_secret: &str) -> Vec<u8> {
        let mut mac = Self::mac(client_secret);
        mac.update(Self::message(millis, client_id).as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn mac(client_secret: &str) -> HmacSha256 {
        // HMAC accepts keys of any length.
        HmacSha256::new_from_slice(client_secret.as_bytes()).expect("HMAC key of any length")
    }

    fn message(millis: i64, client_id: &str) -> String {
        format!("{millis}:{client_id}")
    }
}
