//! Thin REST client: default headers, per-request authentication, URL
//! building, pagination, and mapping of HTTP failures onto [`GatewayError`].

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use reconciler::GatewayError;

use crate::auth::Authenticator;
use crate::{Credentials, GitHubConfig};

/// Page size requested from every list endpoint (GitHub's maximum).
pub const PAGE_SIZE: usize = 100;

const API_VERSION: &str = "2022-11-28";

/// The client could not be constructed from its configuration.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid GitHub API base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("GitHub token contains characters not allowed in an HTTP header")]
    InvalidToken,

    #[error("GitHub App private key is not a PEM-encoded RSA key: {0}")]
    InvalidPrivateKey(#[source] jsonwebtoken::errors::Error),

    #[error("invalid GitHub user agent '{0}'")]
    InvalidUserAgent(String),

    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

/// Authenticated JSON client for one GitHub API base.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: Url,
    auth: Arc<Authenticator>,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, ClientError> {
        let api_base =
            Url::parse(config.api_base.trim_end_matches('/')).map_err(|e| {
                ClientError::InvalidBaseUrl {
                    url: config.api_base.clone(),
                    reason: e.to_string(),
                }
            })?;
        if api_base.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl {
                url: config.api_base.clone(),
                reason: "URL cannot carry a path".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|_| ClientError::InvalidUserAgent(config.user_agent.clone()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let installation_id = match &config.credentials {
            Credentials::App(app) => app.installation_id.to_string(),
            Credentials::Token(_) => String::new(),
        };
        let token_url = join(
            &api_base,
            &["app", "installations", &installation_id, "access_tokens"],
        );
        let auth = Arc::new(Authenticator::new(&config.credentials, token_url)?);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            http,
            api_base,
            auth,
        })
    }

    /// Builds `<api_base>/<segments...>`, percent-encoding each segment.
    pub fn url(&self, segments: &[&str]) -> Url {
        join(&self.api_base, segments)
    }

    /// GETs `url` and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: Url,
    ) -> Result<T, GatewayError> {
        let response = self.send(operation, self.http.get(url)).await?;
        decode(operation, response).await
    }

    /// GETs every page of a list endpoint, `PAGE_SIZE` items at a time.
    pub async fn get_paginated<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: Url,
    ) -> Result<Vec<T>, GatewayError> {
        let mut items = Vec::new();
        let mut page = 1_u32;
        loop {
            let request = self.http.get(url.clone()).query(&[
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]);
            let response = self.send(operation, request).await?;
            let chunk: Vec<T> = decode(operation, response).await?;
            let chunk_len = chunk.len();
            items.extend(chunk);
            if chunk_len < PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        debug!(operation, items = items.len(), pages = page, "fetched list");
        Ok(items)
    }

    /// Sends `body` as JSON with `method` and decodes the JSON response.
    pub async fn send_json<B, T>(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(operation, self.http.request(method, url).json(body))
            .await?;
        decode(operation, response).await
    }

    /// Sends `body` as JSON with `method`, discarding the response body.
    pub async fn send_json_discarding<B>(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<(), GatewayError>
    where
        B: Serialize + ?Sized,
    {
        self.send(operation, self.http.request(method, url).json(body))
            .await
            .map(drop)
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response, GatewayError> {
        let token = self.auth.bearer(&self.http).await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;
        check_status(operation, response).await
    }
}

/// Appends percent-encoded `segments` to `base`.
fn join(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    // Checked in `GitHubClient::new`: the base always carries a path.
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

pub(crate) fn transport_error(operation: &str, error: reqwest::Error) -> GatewayError {
    GatewayError::Transport {
        operation: operation.to_string(),
        status: error.status().map(|s| s.as_u16()),
        message: error.to_string(),
    }
}

/// Passes successful responses through and maps the rest onto [`GatewayError`].
pub(crate) async fn check_status(
    operation: &str,
    response: Response,
) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    // 410 is returned for boards in repositories with projects disabled.
    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        return Err(GatewayError::not_found(response.url().path().to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Transport {
        operation: operation.to_string(),
        status: Some(status.as_u16()),
        message: error_message(&body),
    })
}

pub(crate) async fn decode<T: DeserializeOwned>(
    operation: &str,
    response: Response,
) -> Result<T, GatewayError> {
    let bytes = response.bytes().await.map_err(|e| GatewayError::Transport {
        operation: operation.to_string(),
        status: None,
        message: e.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| GatewayError::Decode {
        operation: operation.to_string(),
        message: e.to_string(),
    })
}

/// Extracts GitHub's `message` field from an error body, falling back to the
/// (truncated) raw body.
fn error_message(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.message,
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.chars().take(200).collect(),
    }
}
