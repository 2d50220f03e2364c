//! Client configuration.
//!
//! Values can be set in code through the `with_*` builders or loaded from
//! environment variables with [`ClientConfig::from_env`].

use std::time::Duration;

use url::Url;

use crate::error::{FidoError, Result};

/// Default timeout for a whole request (connect, send and body read).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for talking to a FIDO2 server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the authentication server (the discovery path is appended to it).
    pub base_url: Url,
    /// Request timeout, applied to every network call.
    pub timeout: Duration,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Refuse plain `http://` endpoints.
    pub https_only: bool,
    /// Maximum age of cached metadata before it is fetched again (None = never expires).
    pub metadata_max_age: Option<Duration>,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl ClientConfig {
    /// Create a configuration for the given base URL with default settings.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| FidoError::InvalidUrl(format!("{base_url}: {e}")))?;

        if base_url.cannot_be_a_base() {
            return Err(FidoError::InvalidUrl(format!(
                "{base_url}: not usable as a base URL"
            )));
        }

        Ok(Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            https_only: false,
            metadata_max_age: None,
            user_agent: format!("fidogate/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `FIDOGATE_BASE_URL` - authentication server base URL (required)
    /// - `FIDOGATE_TIMEOUT_SECS` - request timeout (default: 10)
    /// - `FIDOGATE_CONNECT_TIMEOUT_SECS` - connect timeout (default: 5)
    /// - `FIDOGATE_HTTPS_ONLY` - "true" to refuse plain HTTP (default: false)
    /// - `FIDOGATE_METADATA_MAX_AGE_SECS` - metadata cache lifetime (default: unlimited)
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("FIDOGATE_BASE_URL")
            .map_err(|_| FidoError::Config("FIDOGATE_BASE_URL environment variable not set".into()))?;

        let mut config = Self::new(&base_url)?;

        if let Some(secs) = env_secs("FIDOGATE_TIMEOUT_SECS") {
            config.timeout = secs;
        }

        if let Some(secs) = env_secs("FIDOGATE_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout = secs;
        }

        config.https_only = std::env::var("FIDOGATE_HTTPS_ONLY")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        config.metadata_max_age = env_secs("FIDOGATE_METADATA_MAX_AGE_SECS");

        Ok(config)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    #[must_use]
    pub fn with_https_only(mut self, https_only: bool) -> Self {
        self.https_only = https_only;
        self
    }

    #[must_use]
    pub fn with_metadata_max_age(mut self, max_age: Duration) -> Self {
        self.metadata_max_age = Some(max_age);
        self
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}
