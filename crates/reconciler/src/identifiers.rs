//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! an [`IssueNumber`] with an [`IssueId`] even though both are `u64` under the
//! hood: GitHub links a card to an issue by its database ID but addresses the
//! issue by its repository-scoped number.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for u64-wrapped newtypes (GitHub-assigned integers).
// Generates: struct (Copy), new(), as_u64(), Display.
// ---------------------------------------------------------------------------
macro_rules! u64_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new identifier from a raw integer.
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the underlying integer value.
            pub fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: GitHub-integer-backed
// ---------------------------------------------------------------------------

u64_id! {
    /// The repository-scoped number of a GitHub issue (`#42`).
    ///
    /// This is the number that appears as the trailing path segment of an
    /// issue's API URL and therefore of a project card's `content_url`.
    IssueNumber
}

u64_id! {
    /// The global database ID of a GitHub issue.
    ///
    /// Required when creating a project card that links to the issue.
    IssueId
}

u64_id! {
    /// Identifies a GitHub Project (classic) board.
    ProjectId
}

u64_id! {
    /// Identifies a column on a project board.
    ColumnId
}

u64_id! {
    /// Identifies a card on a project board.
    ///
    /// Card IDs are assigned in creation order, so the lowest ID is the oldest
    /// card. This is the deterministic tie-break when an issue has more than
    /// one card.
    CardId
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed (configuration / GitHub names)
// ---------------------------------------------------------------------------

string_id! {
    /// The name of a repository label (e.g. `"Suggestion"`).
    LabelName
}

string_id! {
    /// The display name of a project board (e.g. `"Suggestions overview"`).
    ProjectName
}

string_id! {
    /// The display name of a column on a project board.
    ColumnName
}

string_id! {
    /// The configured name of a sync state (e.g. `"Pending"`).
    StateName
}

string_id! {
    /// The GitHub login the bot acts as (e.g. `"boardsync[bot]"`).
    ///
    /// Events whose sender matches this identity were caused by the bot's own
    /// writes and are never reconciled.
    BotIdentity
}

impl BotIdentity {
    /// Returns `true` if `login` is this identity.
    ///
    /// GitHub logins are case-insensitive.
    pub fn matches(&self, login: &str) -> bool {
        self.0.eq_ignore_ascii_case(login)
    }
}
