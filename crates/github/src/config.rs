//! Connection settings for the GitHub REST API.

use std::time::Duration;

use crate::Credentials;

/// Public GitHub REST endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Default per-request timeout. Every gateway call is bounded by it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where and as whom the adapter talks to GitHub.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// API base URL, e.g. `https://api.github.com` or a GHES `/api/v3` URL.
    pub api_base: String,
    /// Repository owner (user or organisation).
    pub owner: String,
    /// Repository name.
    pub repo: String,
    pub credentials: Credentials,
    pub timeout: Duration,
    pub user_agent: String,
}

impl GitHubConfig {
    /// Creates a configuration for `owner/repo` against public GitHub.
    ///
    /// A plain string is taken as a fixed bearer token.
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        credentials: impl Into<Credentials>,
    ) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            owner: owner.into(),
            repo: repo.into(),
            credentials: credentials.into(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: concat!("boardsync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
