//! Session manager configuration.

use crate::error::SessionError;

/// Seconds before expiry at which the silent refresh fires.
pub const DEFAULT_REFRESH_THRESHOLD_SECONDS: i64 = 300;

/// Fallback validity window when a token hand-off omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECONDS: i64 = 3600;

/// Configuration for a [`SessionManager`](crate::SessionManager) and its
/// HTTP backend.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the auth backend (e.g. `https://api.caeli.app`).
    pub base_url: String,

    /// App-scheme redirect URI the authorization flow returns to
    /// (e.g. `caeli://auth/callback`).
    pub redirect_uri: String,

    /// Refresh this many seconds before `expires_at`.
    pub refresh_threshold_seconds: i64,

    /// Validity window assumed for fragment hand-offs without `expires_in`.
    pub default_expires_in: i64,
}

impl SessionConfig {
    /// Create a configuration with the default refresh threshold.
    #[must_use]
    pub fn new(base_url: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            redirect_uri: redirect_uri.into(),
            refresh_threshold_seconds: DEFAULT_REFRESH_THRESHOLD_SECONDS,
            default_expires_in: DEFAULT_EXPIRES_IN_SECONDS,
        }
    }

    /// Override the refresh threshold.
    #[must_use]
    pub fn with_refresh_threshold(mut self, seconds: i64) -> Self {
        self.refresh_threshold_seconds = seconds;
        self
    }

    /// Load configuration from `CAELI_*` environment variables, reading a
    /// local `.env` file first when present.
    ///
    /// Recognized variables: `CAELI_API_URL` (required),
    /// `CAELI_REDIRECT_URI` (required), `CAELI_REFRESH_THRESHOLD` (optional
    /// seconds).
    ///
    /// # Errors
    /// Returns [`SessionError::Config`] when a required variable is missing
    /// or a numeric override does not parse.
    pub fn from_env() -> Result<Self, SessionError> {
        dotenvy::dotenv().ok();

        let base_url = std::env::var("CAELI_API_URL")
            .map_err(|_| SessionError::Config("CAELI_API_URL is not set".to_string()))?;
        let redirect_uri = std::env::var("CAELI_REDIRECT_URI")
            .map_err(|_| SessionError::Config("CAELI_REDIRECT_URI is not set".to_string()))?;

        let mut config = Self::new(base_url, redirect_uri);

        if let Ok(raw) = std::env::var("CAELI_REFRESH_THRESHOLD") {
            let threshold = raw.parse().map_err(|_| {
                SessionError::Config(format!("invalid CAELI_REFRESH_THRESHOLD: {raw}"))
            })?;
            config.refresh_threshold_seconds = threshold;
        }

        Ok(config)
    }
}
