//! Wire shapes of the GitHub REST responses the adapter reads, and their
//! conversion into domain types.
//!
//! Only the fields the adapter uses are declared; serde ignores the rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reconciler::{
    trailing_number, CardId, Column, ColumnId, ColumnName, GatewayError, Issue, IssueId,
    IssueNumber, Label, LabelName, Project, ProjectCard, ProjectId, ProjectName, Timestamp,
};

#[derive(Debug, Deserialize)]
pub(crate) struct IssueWire {
    pub id: u64,
    pub number: u64,
    pub url: String,
    #[serde(default)]
    pub labels: Vec<LabelWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LabelWire {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectWire {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ColumnWire {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CardWire {
    pub id: u64,
    /// `https://api.github.com/projects/columns/<column id>`.
    pub column_url: Option<String>,
    pub content_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RateLimitWire {
    pub resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RateLimitResources {
    pub core: RateWire,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RateWire {
    pub limit: u64,
    pub remaining: u64,
    pub reset: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct SetLabelsBody<'a> {
    pub labels: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MoveCardBody {
    pub position: &'static str,
    pub column_id: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateCardBody {
    pub content_id: u64,
    pub content_type: &'static str,
}

/// Core API quota, as reported by `GET /rate_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    /// When the quota window resets.
    pub reset: Timestamp,
}

fn decode_error(operation: &str, message: impl Into<String>) -> GatewayError {
    GatewayError::Decode {
        operation: operation.to_string(),
        message: message.into(),
    }
}

impl IssueWire {
    pub fn into_issue(self) -> Result<Issue, GatewayError> {
        let labels = self
            .labels
            .into_iter()
            .map(|label| {
                LabelName::new(label.name)
                    .ok_or_else(|| decode_error("get issue", "issue carries an unnamed label"))
            })
            .collect::<Result<_, _>>()?;
        Ok(Issue {
            id: IssueId::new(self.id),
            number: IssueNumber::new(self.number),
            url: self.url,
            labels,
        })
    }
}

impl LabelWire {
    pub fn into_label(self) -> Result<Label, GatewayError> {
        let name =
            LabelName::new(self.name).ok_or_else(|| decode_error("get label", "empty label name"))?;
        Ok(Label { name })
    }
}

impl ProjectWire {
    pub fn into_project(self) -> Result<Project, GatewayError> {
        let name = ProjectName::new(self.name)
            .ok_or_else(|| decode_error("list projects", format!("project {} has no name", self.id)))?;
        Ok(Project {
            id: ProjectId::new(self.id),
            name,
        })
    }
}

impl ColumnWire {
    pub fn into_column(self) -> Result<Column, GatewayError> {
        let name = ColumnName::new(self.name)
            .ok_or_else(|| decode_error("list columns", format!("column {} has no name", self.id)))?;
        Ok(Column {
            id: ColumnId::new(self.id),
            name,
        })
    }
}

impl CardWire {
    /// Converts a card, taking its column from `column_url`.
    pub fn into_card(self) -> Result<ProjectCard, GatewayError> {
        let column = self
            .column_url
            .as_deref()
            .and_then(trailing_number)
            .ok_or_else(|| {
                decode_error(
                    "get card",
                    format!("card {} has no usable column_url", self.id),
                )
            })?;
        Ok(self.into_card_in(ColumnId::new(column)))
    }

    /// Converts a card known to sit in `column` (listing a column's cards).
    pub fn into_card_in(self, column: ColumnId) -> ProjectCard {
        ProjectCard {
            id: CardId::new(self.id),
            column_id: column,
            content_url: self.content_url,
            created_at: self.created_at.map(Timestamp::from_utc),
        }
    }
}

impl RateLimitWire {
    pub fn into_rate_limit(self) -> Result<RateLimit, GatewayError> {
        let core = self.resources.core;
        let reset = Timestamp::from_unix_seconds(core.reset)
            .ok_or_else(|| decode_error("rate limit", format!("reset {} out of range", core.reset)))?;
        Ok(RateLimit {
            limit: core.limit,
            remaining: core.remaining,
            reset,
        })
    }
}
