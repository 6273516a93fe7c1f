//! Credentials for the GitHub API.
//!
//! A fixed bearer token is sent as-is. A GitHub App signs a short-lived JWT
//! with its private key and exchanges it for an installation token, which is
//! cached and replaced shortly before `expires_at`. Writes made with an
//! installation token are attributed to the app's `<slug>[bot]` login.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::HeaderValue;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::info;

use reconciler::GatewayError;

use crate::client::{check_status, decode, transport_error};
use crate::ClientError;

/// GitHub rejects app JWTs valid for more than ten minutes.
const JWT_LIFETIME_SECS: i64 = 9 * 60;

/// `iat` is backdated by this much to tolerate clock drift.
const JWT_BACKDATE_SECS: i64 = 60;

/// Installation tokens are replaced this long before they expire.
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

const EXCHANGE_OPERATION: &str = "create installation token";

/// How the adapter authenticates.
#[derive(Clone)]
pub enum Credentials {
    /// Personal access token or any other long-lived bearer token.
    Token(String),
    /// GitHub App installation.
    App(AppCredentials),
}

#[derive(Clone)]
pub struct AppCredentials {
    pub app_id: u64,
    pub installation_id: u64,
    /// PEM-encoded RSA private key of the app.
    pub private_key: String,
}

impl From<String> for Credentials {
    fn from(token: String) -> Self {
        Self::Token(token)
    }
}

impl From<&str> for Credentials {
    fn from(token: &str) -> Self {
        Self::Token(token.to_string())
    }
}

impl From<AppCredentials> for Credentials {
    fn from(app: AppCredentials) -> Self {
        Self::App(app)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
            Self::App(app) => f.debug_tuple("App").field(app).finish(),
        }
    }
}

impl std::fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredentials")
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Produces the bearer token for each request.
pub(crate) enum Authenticator {
    Token(String),
    Installation(InstallationAuth),
}

impl Authenticator {
    /// `token_url` is the installation's `access_tokens` endpoint.
    pub(crate) fn new(credentials: &Credentials, token_url: Url) -> Result<Self, ClientError> {
        match credentials {
            Credentials::Token(token) => {
                let token = token.trim().to_string();
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| ClientError::InvalidToken)?;
                Ok(Self::Token(token))
            }
            Credentials::App(app) => {
                let key = EncodingKey::from_rsa_pem(app.private_key.as_bytes())
                    .map_err(ClientError::InvalidPrivateKey)?;
                Ok(Self::Installation(InstallationAuth {
                    app_id: app.app_id,
                    installation_id: app.installation_id,
                    key,
                    token_url,
                    cached: RwLock::new(None),
                }))
            }
        }
    }

    pub(crate) async fn bearer(&self, http: &reqwest::Client) -> Result<String, GatewayError> {
        match self {
            Self::Token(token) => Ok(token.clone()),
            Self::Installation(auth) => auth.token(http).await,
        }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Token(<redacted>)"),
            Self::Installation(auth) => f
                .debug_struct("Installation")
                .field("app_id", &auth.app_id)
                .field("installation_id", &auth.installation_id)
                .finish_non_exhaustive(),
        }
    }
}

pub(crate) struct InstallationAuth {
    app_id: u64,
    installation_id: u64,
    key: EncodingKey,
    token_url: Url,
    cached: RwLock<Option<InstallationToken>>,
}

#[derive(Clone, Deserialize)]
struct InstallationToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl InstallationToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > now
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

impl InstallationAuth {
    async fn token(&self, http: &reqwest::Client) -> Result<String, GatewayError> {
        let now = Utc::now();
        if let Some(token) = self.cached_token(now) {
            return Ok(token);
        }

        // Concurrent callers may each mint a token; both are valid.
        let minted = self.exchange(http, now).await?;
        info!(
            app_id = self.app_id,
            installation_id = self.installation_id,
            expires_at = %minted.expires_at,
            "obtained installation token"
        );
        let token = minted.token.clone();
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(minted);
        Ok(token)
    }

    fn cached_token(&self, now: DateTime<Utc>) -> Option<String> {
        let cached = self.cached.read().unwrap_or_else(PoisonError::into_inner);
        cached
            .as_ref()
            .filter(|token| token.is_fresh(now))
            .map(|token| token.token.clone())
    }

    async fn exchange(
        &self,
        http: &reqwest::Client,
        now: DateTime<Utc>,
    ) -> Result<InstallationToken, GatewayError> {
        let jwt = self.app_jwt(now)?;
        let response = http
            .post(self.token_url.clone())
            .bearer_auth(jwt)
            .send()
            .await
            .map_err(|e| transport_error(EXCHANGE_OPERATION, e))?;
        let response = check_status(EXCHANGE_OPERATION, response).await?;
        decode(EXCHANGE_OPERATION, response).await
    }

    fn app_jwt(&self, now: DateTime<Utc>) -> Result<String, GatewayError> {
        let claims = AppClaims {
            iat: now.timestamp() - JWT_BACKDATE_SECS,
            exp: now.timestamp() + JWT_LIFETIME_SECS,
            iss: self.app_id.to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key).map_err(|e| {
            GatewayError::Transport {
                operation: EXCHANGE_OPERATION.to_string(),
                status: None,
                message: format!("cannot sign app JWT: {e}"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use jsonwebtoken::{DecodingKey, Validation};
    use serde_json::{json, Value};

    use super::*;
    use crate::{GitHubClient, GitHubConfig};

    const PRIVATE_KEY: &str = include_str!("testdata/app-key.pem");
    const PUBLIC_KEY: &str = include_str!("testdata/app-key.pub.pem");

    #[derive(Default)]
    struct FakeApp {
        minted: AtomicUsize,
        jwt_claims: Mutex<Vec<(String, u64)>>,
        authorizations: Mutex<Vec<String>>,
    }

    fn authorization(headers: &HeaderMap) -> String {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    async fn mint(
        State(fake): State<Arc<FakeApp>>,
        Path(installation): Path<u64>,
        headers: HeaderMap,
    ) -> (StatusCode, Json<Value>) {
        let header = authorization(&headers);
        let jwt = header.trim_start_matches("Bearer ");
        let key = DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap();
        let claims = jsonwebtoken::decode::<AppClaims>(jwt, &key, &Validation::new(Algorithm::RS256))
            .unwrap()
            .claims;
        fake.jwt_claims.lock().unwrap().push((claims.iss, installation));

        let n = fake.minted.fetch_add(1, Ordering::SeqCst) + 1;
        // The first token already sits inside the refresh margin.
        let expires_at = if n == 1 {
            Utc::now() + Duration::seconds(60)
        } else {
            Utc::now() + Duration::hours(1)
        };
        (
            StatusCode::CREATED,
            Json(json!({"token": format!("ghs_{n}"), "expires_at": expires_at.to_rfc3339()})),
        )
    }

    async fn app_client() -> (GitHubClient, Arc<FakeApp>) {
        let fake = Arc::new(FakeApp::default());
        let app = Router::new()
            .route("/app/installations/{id}/access_tokens", post(mint))
            .route(
                "/rate_limit",
                get(|State(fake): State<Arc<FakeApp>>, headers: HeaderMap| async move {
                    fake.authorizations.lock().unwrap().push(authorization(&headers));
                    Json(json!({"resources": {"core": {"limit": 5000, "remaining": 5000, "reset": 1700000000}}}))
                }),
            )
            .with_state(fake.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let credentials = AppCredentials {
            app_id: 42,
            installation_id: 9001,
            private_key: PRIVATE_KEY.to_string(),
        };
        let config =
            GitHubConfig::new("octo", "board", credentials).with_api_base(format!("http://{addr}"));
        (GitHubClient::new(&config).unwrap(), fake)
    }

    #[tokio::test]
    async fn installation_token_is_replaced_once_it_nears_expiry() {
        let (client, fake) = app_client().await;
        let url = client.url(&["rate_limit"]);

        for _ in 0..3 {
            let _: Value = client.get_json("rate limit", url.clone()).await.unwrap();
        }

        assert_eq!(fake.minted.load(Ordering::SeqCst), 2);
        assert_eq!(
            *fake.authorizations.lock().unwrap(),
            ["Bearer ghs_1", "Bearer ghs_2", "Bearer ghs_2"]
        );
        assert_eq!(
            *fake.jwt_claims.lock().unwrap(),
            [("42".to_string(), 9001), ("42".to_string(), 9001)]
        );
    }

    #[test]
    fn token_freshness_honours_the_refresh_margin() {
        let now = Utc::now();
        let token = |expires_in: i64| InstallationToken {
            token: "ghs".to_string(),
            expires_at: now + Duration::seconds(expires_in),
        };

        assert!(token(3600).is_fresh(now));
        assert!(!token(TOKEN_REFRESH_MARGIN_SECS).is_fresh(now));
        assert!(!token(-1).is_fresh(now));
    }

    #[test]
    fn malformed_private_key_is_rejected_up_front() {
        let credentials = AppCredentials {
            app_id: 42,
            installation_id: 9001,
            private_key: "not a key".to_string(),
        };
        let config = GitHubConfig::new("octo", "board", credentials);
        assert!(matches!(
            GitHubClient::new(&config),
            Err(ClientError::InvalidPrivateKey(_))
        ));
    }
}
