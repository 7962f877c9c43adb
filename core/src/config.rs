//! Client and cache configuration.
//!
//! Everything here is fixed per instance: the base URL and credentials policy
//! apply to every request an executor builds, and the reconciliation delay to
//! every create. Nothing is configurable per call.

use std::time::Duration;

use thiserror::Error;

/// Environment variable holding the API base URL.
pub const ENV_BASE_URL: &str = "USERS_API_BASE_URL";
/// Environment variable holding the credentials policy (`omit` or `include`).
pub const ENV_CREDENTIALS: &str = "USERS_API_CREDENTIALS";
/// Environment variable holding the reconciliation delay in milliseconds.
pub const ENV_RECONCILE_DELAY_MS: &str = "USERS_API_RECONCILE_DELAY_MS";

const DEFAULT_RECONCILE_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_GC_TIME: Duration = Duration::from_secs(5 * 60);

/// Whether cookies travel with requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Credentials {
    /// No cookies are sent or stored.
    #[default]
    Omit,
    /// Cookies set by the server are kept and sent back.
    Include,
}

impl std::str::FromStr for Credentials {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "omit" => Ok(Credentials::Omit),
            "include" => Ok(Credentials::Include),
            other => Err(ConfigError::InvalidCredentials(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid credentials policy {0:?}, expected \"omit\" or \"include\"")]
    InvalidCredentials(String),

    #[error("invalid reconcile delay {0:?}, expected milliseconds")]
    InvalidDelay(String),

    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Staleness and retention policy of a [`QueryCache`](crate::cache::QueryCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// Age after which fetched data counts as stale. `None` means data only
    /// goes stale when its key is invalidated.
    pub stale_time: Option<Duration>,

    /// How long an unobserved entry is retained before `collect_garbage`
    /// drops it.
    pub gc_time: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: None,
            gc_time: DEFAULT_GC_TIME,
        }
    }
}

impl QueryConfig {
    #[must_use]
    pub const fn new(stale_time: Option<Duration>, gc_time: Duration) -> Self {
        Self { stale_time, gc_time }
    }
}

/// Per-deployment client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL relative endpoints are joined against. `None` passes
    /// endpoints to the transport unchanged.
    pub base_url: Option<String>,
    pub credentials: Credentials,
    /// Delay between the optimistic draft append and the invalidation that
    /// reconciles it with the server's list.
    pub reconcile_delay: Duration,
    pub query: QueryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            credentials: Credentials::default(),
            reconcile_delay: DEFAULT_RECONCILE_DELAY,
            query: QueryConfig::default(),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn with_reconcile_delay(mut self, delay: Duration) -> Self {
        self.reconcile_delay = delay;
        self
    }

    #[must_use]
    pub fn with_query_config(mut self, query: QueryConfig) -> Self {
        self.query = query;
        self
    }

    /// Reads the client settings from the process environment, falling back
    /// to defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            config.base_url = Some(base_url);
        }
        if let Some(credentials) = lookup(ENV_CREDENTIALS) {
            config.credentials = credentials.parse()?;
        }
        if let Some(delay) = lookup(ENV_RECONCILE_DELAY_MS) {
            let millis: u64 = delay
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidDelay(delay.clone()))?;
            config.reconcile_delay = Duration::from_millis(millis);
        }
        Ok(config)
    }
}
