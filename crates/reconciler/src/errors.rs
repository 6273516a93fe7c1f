//! Error types for the reconciliation domain.
//!
//! | Error | Produced | Handling |
//! |-------|----------|----------|
//! | [`ConfigurationError`] | Registry construction at startup | Fatal; the server never starts |
//! | [`GatewayError::NotFound`] | Lookup miss during steady state | Logged, event abandoned |
//! | [`GatewayError::Transport`] / [`GatewayError::Decode`] | GitHub API failure | Logged, event abandoned |
//! | [`SyncError::Unmatched`] / [`SyncError::AmbiguousMatch`] | Zero or several sync states match | Logged, no corrective action |
//!
//! None of these are retried. A correction that fails halfway (a card was
//! created but not moved to the bottom) is repaired by the next event for the
//! same issue, because reconciliation is idempotent.

use thiserror::Error;

use crate::{CardId, ColumnId, IssueNumber, StateName};

// ---------------------------------------------------------------------------
// Gateway errors
// ---------------------------------------------------------------------------

/// Failure of a single read or write against the repository gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The requested object does not exist (HTTP 404, or no object with the
    /// requested name).
    #[error("{resource} not found")]
    NotFound {
        /// Description of what was looked up (e.g. `"label 'Pending'"`).
        resource: String,
    },

    /// The request could not be completed (network failure, timeout, or a
    /// non-success status other than 404).
    #[error("GitHub API {operation} failed{}: {message}", status_suffix(.status))]
    Transport {
        /// The API operation that failed (e.g. `"move card"`).
        operation: String,
        /// HTTP status, when a response was received.
        status: Option<u16>,
        message: String,
    },

    /// A response was received but its body could not be decoded.
    #[error("could not decode GitHub API {operation} response: {message}")]
    Decode { operation: String, message: String },
}

impl GatewayError {
    /// Convenience constructor for [`GatewayError::NotFound`].
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Returns `true` for [`GatewayError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// A sync state could not be registered.
///
/// Produced at startup only. A misconfigured state is never skipped silently.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("sync state '{state}' has no required labels")]
    EmptyLabelSet { state: StateName },

    #[error("sync state '{state}' is declared more than once")]
    DuplicateStateName { state: StateName },

    #[error("sync states '{existing}' and '{state}' require identical label sets")]
    DuplicateLabelSet { state: StateName, existing: StateName },

    #[error("sync states '{existing}' and '{state}' both target column {column}")]
    DuplicateColumn {
        state: StateName,
        existing: StateName,
        column: ColumnId,
    },

    /// The project, column, or a label of the state could not be resolved.
    #[error("sync state '{state}' could not be resolved: {source}")]
    Unresolvable {
        state: StateName,
        #[source]
        source: GatewayError,
    },
}

// ---------------------------------------------------------------------------
// Reconciliation errors
// ---------------------------------------------------------------------------

/// Reasons a reconciliation was abandoned without a corrective write.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The issue's labels match no sync state; the issue is not tracked.
    #[error("issue #{issue} matches no sync state")]
    Unmatched { issue: IssueNumber },

    /// The issue's labels match more than one sync state.
    ///
    /// Left for a human to resolve; the engine never picks one.
    #[error("issue #{issue} matches several sync states: {}", join(.states))]
    AmbiguousMatch {
        issue: IssueNumber,
        states: Vec<StateName>,
    },

    /// A card's content URL does not end in an issue number.
    #[error("card {card} has a content URL without an issue number: {url}")]
    InvalidContentUrl { card: CardId, url: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl SyncError {
    /// Returns `true` if this error is an expected steady-state condition
    /// rather than a failure worth alerting on.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Unmatched { .. })
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|s| format!(" with status {s}"))
        .unwrap_or_default()
}

fn join(states: &[StateName]) -> String {
    states
        .iter()
        .map(StateName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_mentions_status_when_present() {
        let err = GatewayError::Transport {
            operation: "move card".into(),
            status: Some(502),
            message: "bad gateway".into(),
        };
        assert_eq!(
            err.to_string(),
            "GitHub API move card failed with status 502: bad gateway"
        );

        let err = GatewayError::Transport {
            operation: "get issue".into(),
            status: None,
            message: "timed out".into(),
        };
        assert_eq!(err.to_string(), "GitHub API get issue failed: timed out");
    }

    #[test]
    fn ambiguous_match_lists_every_state() {
        let err = SyncError::AmbiguousMatch {
            issue: IssueNumber::new(4),
            states: vec![
                StateName::new("Pending").unwrap(),
                StateName::new("Accepted").unwrap(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "issue #4 matches several sync states: Pending, Accepted"
        );
        assert!(!err.is_benign());
    }
}
