//! Shared value types for the reconciliation domain.
//!
//! These are read-only snapshots of GitHub objects as the engine needs them.
//! They carry only the fields reconciliation decisions depend on; everything
//! else in GitHub's payloads is dropped at the adapter boundary.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CardId, ColumnId, ColumnName, IssueId, IssueNumber, LabelName, ProjectId, ProjectName};

/// A set of label names.
///
/// Ordered so that label writes and log output are deterministic.
pub type LabelSet = BTreeSet<LabelName>;

// ---------------------------------------------------------------------------
// Issues and labels
// ---------------------------------------------------------------------------

/// A snapshot of an issue, fetched fresh for every event.
///
/// Labels are the most volatile field the engine reads, so issues are never
/// cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Global database ID (used to link cards).
    pub id: IssueId,
    /// Repository-scoped issue number.
    pub number: IssueNumber,
    /// API URL of the issue (`https://api.github.com/repos/<owner>/<repo>/issues/<n>`).
    pub url: String,
    /// Current label names.
    pub labels: LabelSet,
}

/// A repository label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Canonical label name as stored by GitHub.
    pub name: LabelName,
}

// ---------------------------------------------------------------------------
// Project boards
// ---------------------------------------------------------------------------

/// A project board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: ProjectName,
}

/// A column on a project board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub name: ColumnName,
}

/// A card on a project board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCard {
    pub id: CardId,
    /// Column the card sat in when this snapshot was taken.
    pub column_id: ColumnId,
    /// API URL of the linked issue. `None` for note cards.
    pub content_url: Option<String>,
    pub created_at: Option<Timestamp>,
}

impl ProjectCard {
    /// Returns the number of the issue this card links to, if any.
    pub fn issue_number(&self) -> Option<IssueNumber> {
        self.content_url.as_deref().and_then(issue_number_from_url)
    }

    /// Returns `true` if this card links to `issue`.
    ///
    /// Compares by issue number rather than by raw URL so that host or scheme
    /// differences between payloads do not hide a match.
    pub fn refers_to(&self, issue: &Issue) -> bool {
        match self.content_url.as_deref() {
            Some(url) if url == issue.url => true,
            Some(url) => issue_number_from_url(url) == Some(issue.number),
            None => false,
        }
    }
}

/// Where a moved card lands within its target column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardPosition {
    Top,
    /// Keeps the oldest card on top of the column.
    #[default]
    Bottom,
}

impl CardPosition {
    /// Returns the value GitHub's card move API expects.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }
}

impl std::fmt::Display for CardPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// URL helpers
// ---------------------------------------------------------------------------

/// Parses the trailing path segment of `url` as an integer.
///
/// A single trailing `/` is tolerated. Returns `None` when the final segment
/// is empty or not numeric.
pub fn trailing_number(url: &str) -> Option<u64> {
    let trimmed = url.strip_suffix('/').unwrap_or(url);
    trimmed.rsplit('/').next()?.parse().ok()
}

/// Extracts the issue number from an issue URL.
///
/// Stable across `https://api.<host>/repos/<owner>/<repo>/issues/<n>`, the
/// HTML form, and any other URL whose final segment is the issue number.
pub fn issue_number_from_url(url: &str) -> Option<IssueNumber> {
    trailing_number(url).map(IssueNumber::new)
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Creates a [`Timestamp`] from seconds since the Unix epoch.
    pub fn from_unix_seconds(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(Self)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
