use crate::debounce::DEFAULT_QUIET_WINDOW;
use crate::error::FeedClientError;
use crate::storage::FileCredentialStore;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub token_dir: PathBuf,
    pub search_debounce: Duration,
    pub connect_timeout: Duration,
    /// Per-request limit; `None` leaves hung calls to the service.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token_dir: FileCredentialStore::default_dir()
                .unwrap_or_else(|| PathBuf::from(".feed_client")),
            search_debounce: DEFAULT_QUIET_WINDOW,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: None,
        }
    }
}

fn parse_number<T: FromStr>(name: &str, raw: &str) -> Result<T, FeedClientError> {
    raw.trim().parse().map_err(|_| {
        FeedClientError::Validation(format!("{} must be a number, got '{}'", name, raw))
    })
}

impl ClientConfig {
    /// Defaults overridden by `FEED_*` environment variables.
    pub fn from_env() -> Result<Self, FeedClientError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, FeedClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("FEED_API_URL") {
            config.base_url = url;
        }
        if let Some(dir) = lookup("FEED_TOKEN_DIR") {
            config.token_dir = PathBuf::from(dir);
        }
        if let Some(ms) = lookup("FEED_SEARCH_DEBOUNCE_MS") {
            config.search_debounce =
                Duration::from_millis(parse_number("FEED_SEARCH_DEBOUNCE_MS", &ms)?);
        }
        if let Some(secs) = lookup("FEED_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout =
                Duration::from_secs(parse_number("FEED_CONNECT_TIMEOUT_SECS", &secs)?);
        }
        if let Some(secs) = lookup("FEED_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Some(Duration::from_secs(parse_number(
                "FEED_REQUEST_TIMEOUT_SECS",
                &secs,
            )?));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_token_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.token_dir = dir.into();
        self
    }

    pub fn validate(&self) -> Result<(), FeedClientError> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FeedClientError::Validation(format!(
                "Service URL must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        Ok(())
    }
}
