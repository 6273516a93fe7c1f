//! The sync-state registry.
//!
//! A sync state pairs a required label set with a target board column. The
//! registry is filled once at startup, resolving every project, column, and
//! label through the gateway, and is immutable afterwards. Matching is
//! set-based: registration order only decides the order states are reported
//! in diagnostics.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    ColumnId, ColumnName, ConfigurationError, GatewayError, LabelName, LabelSet, ProjectName,
    RepositoryGateway, StateName,
};

/// Unresolved description of a sync state, as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStateDefinition {
    pub name: StateName,
    pub project: ProjectName,
    pub column: ColumnName,
    pub labels: Vec<LabelName>,
}

/// A resolved handle to a board column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub project: ProjectName,
    pub column: ColumnName,
    pub id: ColumnId,
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({})", self.project, self.column, self.id)
    }
}

/// A named pairing of a required label set and a target column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub name: StateName,
    /// Never empty.
    pub required_labels: LabelSet,
    pub column: ColumnRef,
}

impl SyncState {
    /// Returns `true` if `labels` contains every required label.
    pub fn is_satisfied_by(&self, labels: &LabelSet) -> bool {
        self.required_labels.is_subset(labels)
    }
}

/// Ordered set of resolved sync states.
#[derive(Debug, Default)]
pub struct SyncStateRegistry {
    states: Vec<SyncState>,
}

impl SyncStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `definition` through `gateway` and appends it.
    ///
    /// Fails, leaving the registry unchanged, if the label set is empty, the
    /// name is taken, the project, column, or any label does not exist, or the
    /// resolved label set or column is already used by another state.
    pub async fn register(
        &mut self,
        gateway: &dyn RepositoryGateway,
        definition: SyncStateDefinition,
    ) -> Result<&SyncState, ConfigurationError> {
        let SyncStateDefinition {
            name,
            project,
            column,
            labels,
        } = definition;

        if labels.is_empty() {
            return Err(ConfigurationError::EmptyLabelSet { state: name });
        }
        if self.states.iter().any(|s| s.name == name) {
            return Err(ConfigurationError::DuplicateStateName { state: name });
        }

        let board = gateway
            .get_project(&project)
            .await
            .map_err(unresolvable(&name))?;
        let target = gateway
            .get_project_column(&board, &column)
            .await
            .map_err(unresolvable(&name))?;

        let mut required_labels = LabelSet::new();
        for label in &labels {
            let resolved = gateway
                .get_label(label)
                .await
                .map_err(unresolvable(&name))?;
            required_labels.insert(resolved.name);
        }

        if let Some(existing) = self
            .states
            .iter()
            .find(|s| s.required_labels == required_labels)
        {
            return Err(ConfigurationError::DuplicateLabelSet {
                state: name,
                existing: existing.name.clone(),
            });
        }
        if let Some(existing) = self.states.iter().find(|s| s.column.id == target.id) {
            return Err(ConfigurationError::DuplicateColumn {
                state: name,
                existing: existing.name.clone(),
                column: target.id,
            });
        }

        let state = SyncState {
            name,
            required_labels,
            column: ColumnRef {
                project,
                column,
                id: target.id,
            },
        };
        info!(
            state = %state.name,
            column = %state.column,
            labels = ?state.required_labels,
            "registered sync state"
        );
        self.states.push(state);
        Ok(&self.states[self.states.len() - 1])
    }

    /// Returns every state whose required labels are all in `labels`.
    ///
    /// Callers treat zero or more than one match as "do not act".
    pub fn match_states(&self, labels: &LabelSet) -> Vec<&SyncState> {
        let matched: Vec<&SyncState> = self
            .states
            .iter()
            .filter(|state| state.is_satisfied_by(labels))
            .collect();
        debug!(
            labels = ?labels,
            matched = matched.len(),
            "matched issue labels against sync states"
        );
        matched
    }

    /// Returns the state targeting `column`, if any.
    pub fn state_for_column(&self, column: ColumnId) -> Option<&SyncState> {
        self.states.iter().find(|state| state.column.id == column)
    }

    /// Returns the union of every state's required labels.
    pub fn tracked_labels(&self) -> LabelSet {
        self.states
            .iter()
            .flat_map(|state| state.required_labels.iter().cloned())
            .collect()
    }

    /// Returns every target column, in registration order.
    pub fn tracked_columns(&self) -> impl Iterator<Item = &ColumnRef> {
        self.states.iter().map(|state| &state.column)
    }

    pub fn states(&self) -> &[SyncState] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

fn unresolvable(state: &StateName) -> impl FnOnce(GatewayError) -> ConfigurationError {
    let state = state.clone();
    move |source| ConfigurationError::Unresolvable { state, source }
}
