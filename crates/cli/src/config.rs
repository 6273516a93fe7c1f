//! `boardsync.toml`: repository, bot identity, server, and sync states.
//!
//! Secrets (API token, app private key, webhook secret) never live in this
//! file; they are read from the environment by the CLI.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use reconciler::{BotIdentity, ColumnName, LabelName, ProjectName, StateName, SyncStateDefinition};

/// Project the default suggestion workflow lives in.
pub const DEFAULT_PROJECT: &str = "Suggestions overview";

/// Label every default sync state requires.
pub const DEFAULT_MARKER_LABEL: &str = "Suggestion";

/// States of the default suggestion workflow, in board order.
pub const DEFAULT_STATES: [&str; 5] = ["Pending", "In Consideration", "Accepted", "Rejected", "Added"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub repository: RepositoryConfig,
    pub bot: BotConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub github: GitHubApiConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Declared sync states. Empty means the default suggestion workflow.
    #[serde(default, rename = "sync_state")]
    pub sync_states: Vec<SyncStateConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    pub owner: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    /// Login the bot's writes are attributed to, e.g. `boardsync[bot]`.
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub webhook_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            webhook_path: listener::DEFAULT_WEBHOOK_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitHubApiConfig {
    pub api_base: String,
    pub timeout_secs: u64,
    /// GitHub App the bot acts as. Used with `GITHUB_PRIVATE_KEY`.
    pub app_id: Option<u64>,
    pub installation_id: Option<u64>,
}

impl Default for GitHubApiConfig {
    fn default() -> Self {
        Self {
            api_base: github::DEFAULT_API_BASE.to_string(),
            timeout_secs: github::DEFAULT_TIMEOUT.as_secs(),
            app_id: None,
            installation_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// OTLP/gRPC collector, e.g. `http://localhost:4317`. Unset disables export.
    pub otlp_endpoint: Option<String>,
}

/// One `[[sync_state]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncStateConfig {
    pub name: String,
    pub project: String,
    pub column: String,
    pub labels: Vec<String>,
}

impl Config {
    /// Reads, parses, and validates the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repository.owner.trim().is_empty() || self.repository.name.trim().is_empty() {
            return Err(invalid("repository.owner and repository.name must be non-empty"));
        }
        if self.bot.login.trim().is_empty() {
            return Err(invalid("bot.login must be non-empty"));
        }
        if !self.server.webhook_path.starts_with('/') || self.server.webhook_path == "/health" {
            return Err(invalid(
                "server.webhook_path must start with '/' and must not be '/health'",
            ));
        }
        if self.github.timeout_secs == 0 {
            return Err(invalid("github.timeout_secs must be > 0"));
        }
        for (index, state) in self.sync_states.iter().enumerate() {
            let blank = [&state.name, &state.project, &state.column]
                .iter()
                .any(|field| field.trim().is_empty());
            if blank {
                return Err(invalid(format!(
                    "sync_state #{} needs a name, project, and column",
                    index + 1
                )));
            }
            if state.labels.is_empty() || state.labels.iter().any(|l| l.trim().is_empty()) {
                return Err(invalid(format!(
                    "sync_state '{}' needs at least one non-empty label",
                    state.name
                )));
            }
        }
        Ok(())
    }

    pub fn bot_identity(&self) -> Result<BotIdentity, ConfigError> {
        BotIdentity::new(self.bot.login.trim()).ok_or_else(|| invalid("bot.login must be non-empty"))
    }

    /// Returns the sync states to register, falling back to the default
    /// suggestion workflow when none are declared.
    pub fn sync_state_definitions(&self) -> Result<Vec<SyncStateDefinition>, ConfigError> {
        if self.sync_states.is_empty() {
            return Ok(default_sync_states());
        }
        self.sync_states.iter().map(SyncStateConfig::definition).collect()
    }
}

impl SyncStateConfig {
    fn definition(&self) -> Result<SyncStateDefinition, ConfigError> {
        let missing = |what: &str| invalid(format!("sync_state '{}' has an empty {what}", self.name));
        Ok(SyncStateDefinition {
            name: StateName::new(self.name.trim()).ok_or_else(|| missing("name"))?,
            project: ProjectName::new(self.project.trim()).ok_or_else(|| missing("project"))?,
            column: ColumnName::new(self.column.trim()).ok_or_else(|| missing("column"))?,
            labels: self
                .labels
                .iter()
                .map(|label| LabelName::new(label.trim()).ok_or_else(|| missing("label")))
                .collect::<Result<_, _>>()?,
        })
    }
}

/// The five-state suggestion workflow: each state requires the `Suggestion`
/// label plus its own name, and targets the column of the same name.
pub fn default_sync_states() -> Vec<SyncStateDefinition> {
    DEFAULT_STATES
        .iter()
        .filter_map(|state| {
            Some(SyncStateDefinition {
                name: StateName::new(*state)?,
                project: ProjectName::new(DEFAULT_PROJECT)?,
                column: ColumnName::new(*state)?,
                labels: vec![LabelName::new(DEFAULT_MARKER_LABEL)?, LabelName::new(*state)?],
            })
        })
        .collect()
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
