//! The reconciliation engine.
//!
//! Two directions are reconciled:
//!
//! - **Labels → column** ([`ReconciliationEngine::reconcile_issue`]): an issue's
//!   labels pick exactly one sync state, and the issue's card is moved (or
//!   created) so that it sits in that state's column.
//! - **Column → labels** ([`ReconciliationEngine::reconcile_card`]): the column
//!   a card was moved into picks a sync state, and the issue's label set is
//!   rewritten so that it carries exactly that state's labels.
//!
//! Both directions are idempotent: running them against an issue that is
//! already consistent performs reads only. The engine holds no state of its
//! own; every failure abandons the event without retrying.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::{
    CardId, CardPosition, ColumnId, ColumnRef, GatewayError, Issue, IssueNumber, LabelName, LabelSet,
    ProjectCard, RepositoryGateway, StateName, SyncError, SyncState, SyncStateRegistry,
};

/// What a reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The issue already agreed with its sync state; nothing was written.
    AlreadyInSync { state: StateName },

    /// An existing card was moved to the bottom of the state's column.
    CardMoved {
        state: StateName,
        card: CardId,
        from: ColumnId,
        to: ColumnId,
    },

    /// A new card was created and moved to the bottom of the state's column.
    CardCreated {
        state: StateName,
        card: CardId,
        column: ColumnId,
        /// Other cards for the same issue found in the column afterwards,
        /// typically created by a concurrently handled delivery.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        duplicates: Vec<CardId>,
    },

    /// The issue's label set was replaced.
    LabelsReplaced {
        state: StateName,
        labels: Vec<LabelName>,
    },

    /// The moved card is a note, not an issue.
    NoteCard { card: CardId },

    /// The card sits in a column no sync state targets.
    UntrackedColumn { column: ColumnId },
}

impl ReconcileOutcome {
    /// Returns `true` if the reconciliation wrote to GitHub.
    pub fn wrote(&self) -> bool {
        matches!(
            self,
            Self::CardMoved { .. } | Self::CardCreated { .. } | Self::LabelsReplaced { .. }
        )
    }
}

/// Computes the label set an issue must carry to sit in `target`.
///
/// Every label that belongs to any sync state is stripped, then exactly the
/// target's required labels are added back. Labels no sync state mentions are
/// preserved. Applying the correction to its own result changes nothing.
pub fn corrected_labels(
    current: &LabelSet,
    registry: &SyncStateRegistry,
    target: &SyncState,
) -> LabelSet {
    let tracked = registry.tracked_labels();
    current
        .iter()
        .filter(|label| !tracked.contains(*label))
        .chain(target.required_labels.iter())
        .cloned()
        .collect()
}

/// Matches issues to sync states and applies corrective writes.
#[derive(Clone)]
pub struct ReconciliationEngine {
    gateway: Arc<dyn RepositoryGateway>,
    registry: Arc<SyncStateRegistry>,
}

impl ReconciliationEngine {
    pub fn new(gateway: Arc<dyn RepositoryGateway>, registry: Arc<SyncStateRegistry>) -> Self {
        Self { gateway, registry }
    }

    pub fn registry(&self) -> &SyncStateRegistry {
        &self.registry
    }

    /// Brings the board placement of issue `number` in line with its labels.
    ///
    /// Only cards in tracked columns are considered. Never writes labels.
    #[instrument(skip_all, fields(issue = %number))]
    pub async fn reconcile_issue(
        &self,
        number: IssueNumber,
    ) -> Result<ReconcileOutcome, SyncError> {
        let issue = self.gateway.get_issue(number).await?;
        let target = self.unique_state(&issue)?;
        let column = &target.column;

        let placed = self.gateway.get_project_cards(column.id).await?;
        if placed.iter().any(|card| card.refers_to(&issue)) {
            debug!(state = %target.name, column = %column, "issue already placed");
            return Ok(ReconcileOutcome::AlreadyInSync {
                state: target.name.clone(),
            });
        }

        match self.find_tracked_card(&issue, column.id).await? {
            Some(card) => {
                self.gateway
                    .move_card(card.id, column.id, CardPosition::Bottom)
                    .await?;
                info!(
                    state = %target.name,
                    card = %card.id,
                    from = %card.column_id,
                    to = %column,
                    "moved card"
                );
                Ok(ReconcileOutcome::CardMoved {
                    state: target.name.clone(),
                    card: card.id,
                    from: card.column_id,
                    to: column.id,
                })
            }
            None => {
                let card = self.gateway.create_card(column.id, issue.id).await?;
                // New cards land on top; the column is kept oldest-first.
                self.gateway
                    .move_card(card.id, column.id, CardPosition::Bottom)
                    .await?;
                info!(state = %target.name, card = %card.id, column = %column, "created card");
                let duplicates = self.duplicates_after_creation(&issue, column, card.id).await;
                Ok(ReconcileOutcome::CardCreated {
                    state: target.name.clone(),
                    card: card.id,
                    column: column.id,
                    duplicates,
                })
            }
        }
    }

    /// Brings the labels of the issue behind `card` in line with the column
    /// the card sits in.
    #[instrument(skip_all, fields(card = %card.id))]
    pub async fn reconcile_card(&self, card: &ProjectCard) -> Result<ReconcileOutcome, SyncError> {
        let Some(url) = card.content_url.as_deref() else {
            debug!("ignoring note card");
            return Ok(ReconcileOutcome::NoteCard { card: card.id });
        };
        let number = card
            .issue_number()
            .ok_or_else(|| SyncError::InvalidContentUrl {
                card: card.id,
                url: url.to_string(),
            })?;

        let column = self.gateway.get_card_column(card).await?;
        let Some(target) = self.registry.state_for_column(column.id) else {
            debug!(column = %column.id, "card is in an untracked column");
            return Ok(ReconcileOutcome::UntrackedColumn { column: column.id });
        };

        let issue = self.gateway.get_issue(number).await?;
        let corrected = corrected_labels(&issue.labels, &self.registry, target);
        if corrected == issue.labels {
            debug!(issue = %number, state = %target.name, "labels already in sync");
            return Ok(ReconcileOutcome::AlreadyInSync {
                state: target.name.clone(),
            });
        }

        let labels: Vec<LabelName> = corrected.into_iter().collect();
        self.gateway.set_issue_labels(number, &labels).await?;
        info!(
            issue = %number,
            state = %target.name,
            labels = ?labels,
            "replaced issue labels"
        );
        Ok(ReconcileOutcome::LabelsReplaced {
            state: target.name.clone(),
            labels,
        })
    }

    /// Returns the single sync state `issue` belongs to.
    fn unique_state(&self, issue: &Issue) -> Result<&SyncState, SyncError> {
        let matched = self.registry.match_states(&issue.labels);
        match matched.as_slice() {
            [] => Err(SyncError::Unmatched {
                issue: issue.number,
            }),
            [state] => Ok(*state),
            several => {
                let states: Vec<StateName> = several.iter().map(|s| s.name.clone()).collect();
                warn!(issue = %issue.number, states = ?states, "labels match several sync states");
                Err(SyncError::AmbiguousMatch {
                    issue: issue.number,
                    states,
                })
            }
        }
    }

    /// Re-lists `column` after `created` was added to it. Two deliveries for
    /// the same issue (an issue opened with two labels) can both pass the
    /// placement check and both create a card; the extras are reported, not
    /// removed.
    async fn duplicates_after_creation(
        &self,
        issue: &Issue,
        column: &ColumnRef,
        created: CardId,
    ) -> Vec<CardId> {
        let cards = match self.gateway.get_project_cards(column.id).await {
            Ok(cards) => cards,
            Err(err) => {
                debug!(error = %err, column = %column, "cannot re-list column after creating a card");
                return Vec::new();
            }
        };
        let duplicates: Vec<CardId> = cards
            .iter()
            .filter(|card| card.id != created && card.refers_to(issue))
            .map(|card| card.id)
            .collect();
        if !duplicates.is_empty() {
            warn!(
                issue = %issue.number,
                card = %created,
                duplicates = ?duplicates,
                "issue has several cards in its column; remove the extras by hand"
            );
        }
        duplicates
    }

    /// Searches every tracked column except `skip` for a card linked to
    /// `issue`. When several exist, the oldest (lowest ID) wins.
    async fn find_tracked_card(
        &self,
        issue: &Issue,
        skip: ColumnId,
    ) -> Result<Option<ProjectCard>, GatewayError> {
        let columns: Vec<&ColumnRef> = self
            .registry
            .tracked_columns()
            .filter(|column| column.id != skip)
            .collect();

        let mut found: Vec<ProjectCard> = Vec::new();
        for column in columns {
            let cards = self.gateway.get_project_cards(column.id).await?;
            found.extend(cards.into_iter().filter(|card| card.refers_to(issue)));
        }

        if found.len() > 1 {
            let ids: Vec<_> = found.iter().map(|card| card.id).collect();
            warn!(issue = %issue.number, cards = ?ids, "issue has several cards; using the oldest");
        }
        Ok(found.into_iter().min_by_key(|card| card.id))
    }
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("states", &self.registry.len())
            .finish_non_exhaustive()
    }
}
