//! Typed webhook events.
//!
//! The webhook boundary decodes each delivery exactly once into a
//! [`SyncEvent`]. Event kinds the engine does not track decode to
//! [`SyncEvent::Other`], so downstream code never inspects raw payloads.

use serde::{Deserialize, Serialize};

use crate::{IssueNumber, LabelName, ProjectCard};

/// The GitHub account that caused an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub login: String,
}

impl Actor {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
        }
    }
}

/// Action of an `issues` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuesAction {
    Labeled,
    Unlabeled,
    /// Any other action (`opened`, `edited`, ...). Ignored.
    Other(String),
}

impl IssuesAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "labeled" => Self::Labeled,
            "unlabeled" => Self::Unlabeled,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Labeled => "labeled",
            Self::Unlabeled => "unlabeled",
            Self::Other(action) => action,
        }
    }
}

/// Action of a `project_card` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectCardAction {
    Moved,
    /// Any other action (`created`, `deleted`, ...). Ignored.
    Other(String),
}

impl ProjectCardAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "moved" => Self::Moved,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Moved => "moved",
            Self::Other(action) => action,
        }
    }
}

/// An issue was labelled, unlabelled, or otherwise changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuesEvent {
    pub action: IssuesAction,
    pub issue: IssueNumber,
    /// The label added or removed, for `labeled`/`unlabeled`.
    pub label: Option<LabelName>,
    pub sender: Actor,
}

/// A project card was moved or otherwise changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCardEvent {
    pub action: ProjectCardAction,
    pub card: ProjectCard,
    pub sender: Actor,
}

/// A decoded webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncEvent {
    Issues(IssuesEvent),
    ProjectCard(ProjectCardEvent),
    /// An event type that is not tracked (`ping`, `push`, ...).
    Other { event_type: String },
}

impl SyncEvent {
    /// Returns the account that caused the event, when the event carries one.
    pub fn sender(&self) -> Option<&Actor> {
        match self {
            Self::Issues(event) => Some(&event.sender),
            Self::ProjectCard(event) => Some(&event.sender),
            Self::Other { .. } => None,
        }
    }

    /// Returns the `X-GitHub-Event` name of this event.
    pub fn event_type(&self) -> &str {
        match self {
            Self::Issues(_) => "issues",
            Self::ProjectCard(_) => "project_card",
            Self::Other { event_type } => event_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_round_trip_through_their_wire_names() {
        for action in ["labeled", "unlabeled", "opened"] {
            assert_eq!(IssuesAction::parse(action).as_str(), action);
        }
        assert_eq!(ProjectCardAction::parse("moved"), ProjectCardAction::Moved);
        assert_eq!(
            ProjectCardAction::parse("created"),
            ProjectCardAction::Other("created".into())
        );
    }

    #[test]
    fn untracked_events_have_no_sender() {
        let event = SyncEvent::Other {
            event_type: "ping".into(),
        };
        assert!(event.sender().is_none());
        assert_eq!(event.event_type(), "ping");
    }
}
