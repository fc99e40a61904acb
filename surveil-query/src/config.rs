//! Configuration for talking to the aggregation endpoint.

use std::time::Duration;
use url::Url;

use crate::error::{QueryError, QueryResult};
use crate::logging::LogConfig;

const DEFAULT_USER_AGENT: &str = concat!("surveil-query/", env!("CARGO_PKG_VERSION"));

/// Connection settings for one aggregation endpoint.
///
/// The base URL is the only required setting. Everything is supplied by the
/// caller; nothing is read from the environment.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use surveil_query::config::ClientConfig;
///
/// let config = ClientConfig::new("https://lapis.example.org/open")
///     .unwrap()
///     .with_timeout(Duration::from_secs(30));
///
/// assert_eq!(
///     config.endpoint_url("aggregated").unwrap().as_str(),
///     "https://lapis.example.org/open/aggregated"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: Url,
    timeout: Option<Duration>,
    user_agent: String,
    log: LogConfig,
}

impl ClientConfig {
    /// Creates a configuration for the given base URL.
    ///
    /// Only `http` and `https` URLs are accepted.
    pub fn new(base_url: &str) -> QueryResult<Self> {
        let mut url = Url::parse(base_url)
            .map_err(|e| QueryError::invalid_config(format!("invalid base URL '{base_url}': {e}")))?;

        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(QueryError::invalid_config(format!(
                "base URL '{base_url}' must be an http(s) URL"
            )));
        }
        // Url::join replaces the last segment unless the path ends with '/'.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(Self {
            base_url: url,
            timeout: Some(Duration::from_secs(60)),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            log: LogConfig::default(),
        })
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disables the per-request timeout.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Sets the `User-Agent` header sent with every request.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets what the client includes in its log events.
    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn log_config(&self) -> &LogConfig {
        &self.log
    }

    /// Resolves an endpoint path relative to the base URL.
    pub fn endpoint_url(&self, endpoint: &str) -> QueryResult<Url> {
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| QueryError::invalid_config(format!("invalid endpoint '{endpoint}': {e}")))
    }
}
