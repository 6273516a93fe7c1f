//! boardsync GitHub infrastructure adapter.
//!
//! Implements [`reconciler::RepositoryGateway`] against the GitHub REST API
//! (issues, labels, and classic project boards) with `reqwest`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules.
//! Authentication headers, pagination, URL encoding, and the mapping of HTTP
//! failures onto [`reconciler::GatewayError`] are handled here; the
//! [`reconciler`] crate never sees them.
//!
//! ## Endpoints
//!
//! | Gateway operation | Request |
//! |-------------------|---------|
//! | `get_issue` | `GET /repos/{owner}/{repo}/issues/{number}` |
//! | `get_label` | `GET /repos/{owner}/{repo}/labels/{name}` |
//! | `get_project` | `GET /repos/{owner}/{repo}/projects?state=open` (cached) |
//! | `get_project_columns` | `GET /projects/{id}/columns` (cached) |
//! | `get_project_cards` | `GET /projects/columns/{id}/cards?archived_state=not_archived` |
//! | `get_card_column` | `GET /projects/columns/cards/{id}`, then `GET /projects/columns/{id}` |
//! | `set_issue_labels` | `PUT /repos/{owner}/{repo}/issues/{number}/labels` |
//! | `move_card` | `POST /projects/columns/cards/{id}/moves` |
//! | `create_card` | `POST /projects/columns/{id}/cards` |
//!
//! With [`Credentials::App`] requests carry an installation token obtained
//! from `POST /app/installations/{id}/access_tokens`. It is cached until
//! [`TOKEN_REFRESH_MARGIN_SECS`] before it expires.

mod auth;
mod client;
mod config;
mod gateway;
mod models;

pub use auth::{AppCredentials, Credentials, TOKEN_REFRESH_MARGIN_SECS};
pub use client::{ClientError, GitHubClient, PAGE_SIZE};
pub use config::{GitHubConfig, DEFAULT_API_BASE, DEFAULT_TIMEOUT};
pub use gateway::GitHubGateway;
pub use models::RateLimit;
