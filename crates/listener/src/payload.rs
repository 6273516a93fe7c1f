//! Decoding of webhook bodies into [`SyncEvent`]s.
//!
//! Only the `issues` and `project_card` event types are decoded; every other
//! type becomes [`SyncEvent::Other`] without looking at the body.

use serde::Deserialize;
use thiserror::Error;

use reconciler::{
    Actor, CardId, ColumnId, IssueNumber, IssuesAction, IssuesEvent, LabelName, ProjectCard,
    ProjectCardAction, ProjectCardEvent, SyncEvent, Timestamp,
};

/// Header naming the event type (`issues`, `project_card`, `ping`, ...).
pub const EVENT_HEADER: &str = "x-github-event";

/// Header carrying GitHub's unique delivery ID.
pub const DELIVERY_HEADER: &str = "x-github-delivery";

/// A tracked event's body could not be decoded.
#[derive(Debug, Error)]
#[error("invalid {event_type} payload: {source}")]
pub struct DecodeError {
    pub event_type: String,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Debug, Deserialize)]
struct SenderWire {
    login: String,
}

#[derive(Debug, Deserialize)]
struct IssueRefWire {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct LabelRefWire {
    name: String,
}

#[derive(Debug, Deserialize)]
struct IssuesPayload {
    action: String,
    issue: IssueRefWire,
    label: Option<LabelRefWire>,
    sender: SenderWire,
}

#[derive(Debug, Deserialize)]
struct CardWire {
    id: u64,
    column_id: u64,
    content_url: Option<String>,
    created_at: Option<Timestamp>,
}

#[derive(Debug, Deserialize)]
struct ProjectCardPayload {
    action: String,
    project_card: CardWire,
    sender: SenderWire,
}

/// Decodes a delivery of type `event_type`.
pub fn decode_event(event_type: &str, body: &[u8]) -> Result<SyncEvent, DecodeError> {
    let decode_error = |source| DecodeError {
        event_type: event_type.to_string(),
        source,
    };

    match event_type {
        "issues" => {
            let payload: IssuesPayload = serde_json::from_slice(body).map_err(decode_error)?;
            Ok(SyncEvent::Issues(IssuesEvent {
                action: IssuesAction::parse(&payload.action),
                issue: IssueNumber::new(payload.issue.number),
                label: payload.label.and_then(|label| LabelName::new(label.name)),
                sender: Actor::new(payload.sender.login),
            }))
        }
        "project_card" => {
            let payload: ProjectCardPayload =
                serde_json::from_slice(body).map_err(decode_error)?;
            let card = payload.project_card;
            Ok(SyncEvent::ProjectCard(ProjectCardEvent {
                action: ProjectCardAction::parse(&payload.action),
                card: ProjectCard {
                    id: CardId::new(card.id),
                    column_id: ColumnId::new(card.column_id),
                    content_url: card.content_url,
                    created_at: card.created_at,
                },
                sender: Actor::new(payload.sender.login),
            }))
        }
        other => Ok(SyncEvent::Other {
            event_type: other.to_string(),
        }),
    }
}
