//! boardsync CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load `.env` if present, load `boardsync.toml`
//!    and validate it, read secrets from the environment.
//! 2. **Wire observability**: install `tracing-subscriber` with a JSON or
//!    compact layer and, when configured, an OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure**: resolve GitHub credentials (App
//!    installation or fixed token), build the GitHub gateway around a shared
//!    lookup cache, and check API connectivity.
//! 4. **Register sync states**: resolve every configured state against GitHub.
//!    Any failure aborts startup.
//! 5. **Run**: `serve` receives webhooks until Ctrl-C; `check` prints the
//!    resolved states and exits.

mod config;
mod observability;

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};

use github::{AppCredentials, Credentials, GitHubConfig, GitHubGateway};
use listener::{WebhookReceiver, WebhookSecret};
use reconciler::{EventDispatcher, LookupCache, ReconciliationEngine, SyncStateRegistry};

use crate::config::Config;
use crate::observability::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "boardsync", version, about = "Keeps GitHub issue labels and project board columns in sync")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, env = "BOARDSYNC_CONFIG", default_value = "boardsync.toml")]
    config: PathBuf,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register sync states, then receive webhooks until interrupted.
    Serve(ServeArgs),
    /// Register sync states, print them, and exit.
    Check(GitHubArgs),
}

/// GitHub credentials. App credentials take precedence over a fixed token.
#[derive(Debug, Args)]
struct GitHubArgs {
    /// Fixed API token with read/write access to issues and projects.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// GitHub App ID. Overrides `github.app_id`.
    #[arg(long, env = "GITHUB_APP_ID")]
    github_app_id: Option<u64>,

    /// Installation of the app on the repository. Overrides
    /// `github.installation_id`.
    #[arg(long, env = "GITHUB_INSTALLATION_ID")]
    github_installation_id: Option<u64>,

    /// PEM file holding the app's private key.
    #[arg(long, env = "GITHUB_PRIVATE_KEY")]
    github_private_key: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[command(flatten)]
    github: GitHubArgs,

    /// Secret configured on the repository's webhook.
    #[arg(long, env = "GITHUB_WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: String,

    /// Overrides `server.bind` from the configuration file.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing, so `.env` values reach the `env = ...` arguments.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let telemetry =
        observability::init(cli.log_format, config.telemetry.otlp_endpoint.as_deref())?;
    match dotenv {
        Ok(path) => info!(path = %path.display(), "read environment from file"),
        Err(err) if err.not_found() => {}
        Err(err) => warn!(error = %err, "ignoring unreadable .env file"),
    }

    let result = match cli.command {
        Command::Serve(args) => serve(&config, args).await,
        Command::Check(args) => check(&config, &args).await,
    };

    telemetry.shutdown();
    result
}

async fn serve(config: &Config, args: ServeArgs) -> Result<()> {
    let secret = WebhookSecret::new(&args.webhook_secret)
        .context("GITHUB_WEBHOOK_SECRET must not be empty")?;
    let (gateway, registry) = start(config, &args.github).await?;

    let engine = ReconciliationEngine::new(gateway, Arc::new(registry));
    let dispatcher = EventDispatcher::new(engine, config.bot_identity()?);
    let app = listener::router(
        WebhookReceiver::new(secret, dispatcher),
        &config.server.webhook_path,
    );

    let addr = args.bind.unwrap_or(config.server.bind);
    let tcp = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    listener::serve(tcp, app, shutdown_signal())
        .await
        .context("webhook server failed")?;

    info!("stopped");
    Ok(())
}

async fn check(config: &Config, args: &GitHubArgs) -> Result<()> {
    let (_, registry) = start(config, args).await?;
    for state in registry.states() {
        let labels: Vec<&str> = state.required_labels.iter().map(|l| l.as_str()).collect();
        println!(
            "{:<20} [{}] -> {}",
            state.name.as_str(),
            labels.join(", "),
            state.column
        );
    }
    println!("{} sync state(s) resolved", registry.len());
    Ok(())
}

/// Builds the gateway, checks connectivity, and registers every sync state.
async fn start(config: &Config, args: &GitHubArgs) -> Result<(Arc<GitHubGateway>, SyncStateRegistry)> {
    let github_config = GitHubConfig::new(
        &config.repository.owner,
        &config.repository.name,
        credentials(config, args)?,
    )
    .with_api_base(&config.github.api_base)
    .with_timeout(Duration::from_secs(config.github.timeout_secs));
    let gateway = Arc::new(
        GitHubGateway::new(&github_config, Arc::new(LookupCache::new()))
            .context("failed to build GitHub client")?,
    );

    let rate = gateway
        .rate_limit()
        .await
        .context("GitHub API is unreachable or rejected the credentials")?;
    info!(
        limit = rate.limit,
        remaining = rate.remaining,
        reset = %rate.reset,
        "connected to GitHub"
    );

    let mut registry = SyncStateRegistry::new();
    for definition in config.sync_state_definitions()? {
        let name = definition.name.clone();
        registry
            .register(gateway.as_ref(), definition)
            .await
            .with_context(|| format!("failed to register sync state '{name}'"))?;
    }
    info!(
        states = registry.len(),
        owner = %config.repository.owner,
        repo = %config.repository.name,
        "sync states registered"
    );
    if registry.is_empty() {
        warn!("no sync states registered; every event will be ignored");
    }

    Ok((gateway, registry))
}

fn credentials(config: &Config, args: &GitHubArgs) -> Result<Credentials> {
    let app_id = args.github_app_id.or(config.github.app_id);
    let installation_id = args.github_installation_id.or(config.github.installation_id);

    match (&args.github_private_key, app_id, installation_id) {
        (Some(path), Some(app_id), Some(installation_id)) => {
            let private_key = fs::read_to_string(path)
                .with_context(|| format!("cannot read GitHub App key {}", path.display()))?;
            info!(app_id, installation_id, "authenticating as GitHub App installation");
            Ok(AppCredentials {
                app_id,
                installation_id,
                private_key,
            }
            .into())
        }
        (Some(_), _, _) => bail!(
            "GITHUB_PRIVATE_KEY needs an app ID and an installation ID \
             (GITHUB_APP_ID/GITHUB_INSTALLATION_ID or github.app_id/github.installation_id)"
        ),
        (None, _, _) => match &args.github_token {
            Some(token) => {
                warn!("authenticating with a fixed token; writes are attributed to its owner");
                Ok(Credentials::from(token.as_str()))
            }
            None => bail!("set GITHUB_PRIVATE_KEY with an app and installation ID, or GITHUB_TOKEN"),
        },
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
