//! Search engine client configuration.

use crate::{
    error::{Result, SearchError},
    retry::{BackoffStrategy, RetryPolicy},
};
use std::env;
use std::time::Duration;

/// Prefix shared by every environment variable read by [`SearchConfig::from_env`].
pub const ENV_PREFIX: &str = "CATALOG_SEARCH";

/// Search engine client configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Engine URL(s).
    pub urls: Vec<String>,
    /// Basic auth username.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Per-call deadline.
    pub request_timeout: Duration,
    /// Retries after a timed-out or unreachable call.
    pub max_retries: u32,
    /// Delay between retries.
    pub backoff: BackoffStrategy,
    /// Make writes visible to search before the write call returns.
    pub refresh_on_write: bool,
}

impl SearchConfig {
    /// Create a new configuration with a single URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            password: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff: BackoffStrategy::default(),
            refresh_on_write: true,
        }
    }

    /// Create configuration with multiple URLs for a cluster.
    pub fn cluster(urls: Vec<String>) -> Self {
        Self {
            urls,
            ..Self::new("")
        }
    }

    /// Load configuration from `CATALOG_SEARCH_*` variables, reading a
    /// `.env` file first when one is present.
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `CATALOG_SEARCH_URL` | comma-separated node URLs (required) |
    /// | `CATALOG_SEARCH_USERNAME` / `_PASSWORD` | basic auth |
    /// | `CATALOG_SEARCH_TIMEOUT_MS` | per-call deadline |
    /// | `CATALOG_SEARCH_MAX_RETRIES` | retries on timeout/unavailable |
    /// | `CATALOG_SEARCH_REFRESH` | `true`/`false`, refresh after writes |
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let urls = env_var("URL")
            .ok_or_else(|| SearchError::Validation(format!("{}_URL is not set", ENV_PREFIX)))?;
        let urls: Vec<String> = urls
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(String::from)
            .collect();

        let mut config = Self::cluster(urls);

        if let (Some(user), Some(pass)) = (env_var("USERNAME"), env_var("PASSWORD")) {
            config = config.with_basic_auth(user, pass);
        }
        if let Some(ms) = env_var("TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| SearchError::Validation(format!("Invalid timeout: {}", ms)))?;
            config = config.with_request_timeout(Duration::from_millis(ms));
        }
        if let Some(retries) = env_var("MAX_RETRIES") {
            let retries: u32 = retries.parse().map_err(|_| {
                SearchError::Validation(format!("Invalid retry count: {}", retries))
            })?;
            config = config.with_max_retries(retries);
        }
        if let Some(refresh) = env_var("REFRESH") {
            config = config.with_refresh_on_write(refresh == "1" || refresh.eq_ignore_ascii_case("true"));
        }

        config.validate()?;
        Ok(config)
    }

    /// Set basic authentication credentials.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-call deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set maximum retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the backoff between retries.
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Enable or disable refresh after writes.
    pub fn with_refresh_on_write(mut self, enabled: bool) -> Self {
        self.refresh_on_write = enabled;
        self
    }

    /// Reject configurations that cannot produce a working client.
    pub fn validate(&self) -> Result<()> {
        if self.urls.is_empty() || self.urls.iter().any(|u| u.is_empty()) {
            return Err(SearchError::Validation("No URLs provided".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(SearchError::Validation(
                "Request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The timeout and retry policy repositories apply to engine calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.request_timeout,
            max_retries: self.max_retries,
            backoff: self.backoff.clone(),
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(format!("{}_{}", ENV_PREFIX, key))
        .ok()
        .filter(|v| !v.trim().is_empty())
}
