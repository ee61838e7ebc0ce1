//! Hub error types.

use homelink_oauth::AuthError;
use homelink_platform::PlatformError;

/// A failure reported by a device driver.
///
/// Always isolated by the caller; a driver error never propagates past the
/// device it belongs to.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct DriverError(String);

impl DriverError {
    /// Create a driver error.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Hub errors.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Configuration invalid or unreadable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authorization layer failure.
    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),

    /// Platform call failure.
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Configuration file unreadable.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file not valid TOML.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for hub operations.
pub type HubResult<T> = Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_display() {
        let e = DriverError::new("bad payload");
        assert_eq!(e.to_string(), "bad payload");
    }

    #[test]
    fn config_error_display() {
        let e = HubError::Config("client_id missing".into());
        assert_eq!(e.to_string(), "Configuration error: client_id missing");
    }
}
