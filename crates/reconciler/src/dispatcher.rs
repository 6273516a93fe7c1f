//! Routes decoded webhook events to the reconciliation engine.
//!
//! Every write the engine makes comes back as a webhook: moving a card emits
//! a `project_card.moved` event, and replacing labels emits `issues.labeled`.
//! Reconciling those would bounce an issue between columns forever, so events
//! whose sender is the bot's own identity are dropped before the engine sees
//! them.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    BotIdentity, IssuesAction, ProjectCardAction, ReconcileOutcome, ReconciliationEngine,
    SyncError, SyncEvent,
};

/// What happened to a dispatched event.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The event was caused by the bot itself.
    Suppressed { actor: String },
    /// The event kind or action is not one the engine handles.
    Ignored { reason: String },
    /// The engine ran to completion.
    Reconciled(ReconcileOutcome),
    /// The engine gave up; nothing further is attempted for this event.
    Abandoned(SyncError),
}

/// Serialisable summary of a [`DispatchOutcome`], for responses and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchSummary {
    Suppressed,
    Ignored { reason: String },
    Reconciled { result: ReconcileOutcome },
    Abandoned { error: String },
}

impl DispatchOutcome {
    pub fn summary(&self) -> DispatchSummary {
        match self {
            Self::Suppressed { .. } => DispatchSummary::Suppressed,
            Self::Ignored { reason } => DispatchSummary::Ignored {
                reason: reason.clone(),
            },
            Self::Reconciled(outcome) => DispatchSummary::Reconciled {
                result: outcome.clone(),
            },
            Self::Abandoned(err) => DispatchSummary::Abandoned {
                error: err.to_string(),
            },
        }
    }
}

/// Filters self-triggered events and invokes the engine.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    engine: ReconciliationEngine,
    bot: BotIdentity,
}

impl EventDispatcher {
    pub fn new(engine: ReconciliationEngine, bot: BotIdentity) -> Self {
        Self { engine, bot }
    }

    pub fn bot(&self) -> &BotIdentity {
        &self.bot
    }

    /// Handles one event. Never fails: errors are logged and reported as
    /// [`DispatchOutcome::Abandoned`].
    pub async fn dispatch(&self, event: SyncEvent) -> DispatchOutcome {
        if let Some(sender) = event.sender() {
            if self.bot.matches(&sender.login) {
                debug!(event = event.event_type(), actor = %sender.login, "suppressed self-triggered event");
                return DispatchOutcome::Suppressed {
                    actor: sender.login.clone(),
                };
            }
        }

        let result = match event {
            SyncEvent::Issues(event) => match event.action {
                IssuesAction::Labeled | IssuesAction::Unlabeled => {
                    debug!(
                        issue = %event.issue,
                        action = event.action.as_str(),
                        label = ?event.label,
                        actor = %event.sender.login,
                        "issue labels changed"
                    );
                    self.engine.reconcile_issue(event.issue).await
                }
                IssuesAction::Other(action) => {
                    return ignored(format!("issues action '{action}'"));
                }
            },
            SyncEvent::ProjectCard(event) => match event.action {
                ProjectCardAction::Moved => {
                    debug!(
                        card = %event.card.id,
                        column = %event.card.column_id,
                        actor = %event.sender.login,
                        "project card moved"
                    );
                    self.engine.reconcile_card(&event.card).await
                }
                ProjectCardAction::Other(action) => {
                    return ignored(format!("project_card action '{action}'"));
                }
            },
            SyncEvent::Other { event_type } => {
                return ignored(format!("event type '{event_type}'"));
            }
        };

        match result {
            Ok(outcome) => {
                if outcome.wrote() {
                    info!(outcome = ?outcome, "reconciled");
                } else {
                    debug!(outcome = ?outcome, "nothing to reconcile");
                }
                DispatchOutcome::Reconciled(outcome)
            }
            Err(err) => {
                if err.is_benign() {
                    debug!(error = %err, "event abandoned");
                } else if matches!(err, SyncError::AmbiguousMatch { .. }) {
                    warn!(error = %err, "event abandoned; resolve manually");
                } else {
                    error!(error = %err, "event abandoned");
                }
                DispatchOutcome::Abandoned(err)
            }
        }
    }
}

fn ignored(reason: String) -> DispatchOutcome {
    debug!(reason = %reason, "ignored event");
    DispatchOutcome::Ignored { reason }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{GatewayCall, InMemoryGateway};
    use crate::{
        Actor, ColumnName, IssueNumber, IssuesEvent, LabelName, ProjectCardEvent, ProjectName,
        StateName, SyncStateDefinition, SyncStateRegistry,
    };

    const BOT: &str = "boardsync[bot]";

    async fn dispatcher() -> (Arc<InMemoryGateway>, EventDispatcher) {
        let gateway = Arc::new(InMemoryGateway::new());
        let project = gateway.add_project("Suggestions overview");
        gateway.add_label("Suggestion");
        let mut registry = SyncStateRegistry::new();
        for state in ["Pending", "Accepted", "Rejected"] {
            gateway.add_column(&project, state);
            gateway.add_label(state);
            registry
                .register(
                    gateway.as_ref(),
                    SyncStateDefinition {
                        name: StateName::new(state).unwrap(),
                        project: ProjectName::new("Suggestions overview").unwrap(),
                        column: ColumnName::new(state).unwrap(),
                        labels: vec![
                            LabelName::new("Suggestion").unwrap(),
                            LabelName::new(state).unwrap(),
                        ],
                    },
                )
                .await
                .unwrap();
        }
        gateway.clear_calls();

        let engine = ReconciliationEngine::new(gateway.clone(), Arc::new(registry));
        let dispatcher = EventDispatcher::new(engine, BotIdentity::new(BOT).unwrap());
        (gateway, dispatcher)
    }

    fn labeled(issue: u64, sender: &str) -> SyncEvent {
        SyncEvent::Issues(IssuesEvent {
            action: IssuesAction::Labeled,
            issue: IssueNumber::new(issue),
            label: LabelName::new("Pending"),
            sender: Actor::new(sender),
        })
    }

    #[tokio::test]
    async fn bot_events_reach_no_gateway_call() {
        let (gateway, dispatcher) = dispatcher().await;
        gateway.add_issue(1, &["Suggestion", "Pending"]);
        let card = gateway.add_card(gateway.column_id("Rejected"), 1);

        let outcome = dispatcher.dispatch(labeled(1, BOT)).await;
        assert!(matches!(outcome, DispatchOutcome::Suppressed { .. }));

        let moved = SyncEvent::ProjectCard(ProjectCardEvent {
            action: ProjectCardAction::Moved,
            card,
            sender: Actor::new("BoardSync[Bot]"),
        });
        let outcome = dispatcher.dispatch(moved).await;
        assert!(matches!(outcome, DispatchOutcome::Suppressed { .. }));

        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn human_label_change_places_the_card() {
        let (gateway, dispatcher) = dispatcher().await;
        gateway.add_issue(1, &["Suggestion", "Pending"]);

        let outcome = dispatcher.dispatch(labeled(1, "octocat")).await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Reconciled(ReconcileOutcome::CardCreated { .. })
        ));
        assert_eq!(gateway.cards_in(gateway.column_id("Pending")).len(), 1);
    }

    #[tokio::test]
    async fn human_card_move_rewrites_labels() {
        let (gateway, dispatcher) = dispatcher().await;
        gateway.add_issue(1, &["Suggestion", "Pending"]);
        let card = gateway.add_card(gateway.column_id("Rejected"), 1);

        let outcome = dispatcher
            .dispatch(SyncEvent::ProjectCard(ProjectCardEvent {
                action: ProjectCardAction::Moved,
                card,
                sender: Actor::new("octocat"),
            }))
            .await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Reconciled(ReconcileOutcome::LabelsReplaced { .. })
        ));
        assert!(matches!(
            gateway.writes().as_slice(),
            [GatewayCall::SetIssueLabels(..)]
        ));
    }

    #[tokio::test]
    async fn untracked_actions_and_event_types_are_ignored() {
        let (gateway, dispatcher) = dispatcher().await;
        gateway.add_issue(1, &["Suggestion", "Pending"]);
        let card = gateway.add_card(gateway.column_id("Pending"), 1);

        let opened = SyncEvent::Issues(IssuesEvent {
            action: IssuesAction::Other("opened".into()),
            issue: IssueNumber::new(1),
            label: None,
            sender: Actor::new("octocat"),
        });
        let created = SyncEvent::ProjectCard(ProjectCardEvent {
            action: ProjectCardAction::Other("created".into()),
            card,
            sender: Actor::new("octocat"),
        });
        let ping = SyncEvent::Other {
            event_type: "ping".into(),
        };

        for event in [opened, created, ping] {
            assert!(matches!(
                dispatcher.dispatch(event).await,
                DispatchOutcome::Ignored { .. }
            ));
        }
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn engine_errors_are_reported_not_raised() {
        let (gateway, dispatcher) = dispatcher().await;
        gateway.add_issue(1, &["Suggestion", "Pending", "Accepted"]);

        let outcome = dispatcher.dispatch(labeled(1, "octocat")).await;

        let DispatchOutcome::Abandoned(err) = &outcome else {
            panic!("expected abandonment, got {outcome:?}");
        };
        assert!(matches!(err, SyncError::AmbiguousMatch { .. }));
        assert!(matches!(
            outcome.summary(),
            DispatchSummary::Abandoned { ref error } if error.contains("several sync states")
        ));
        assert!(gateway.writes().is_empty());
    }
}
