//! Reconciliation domain for boardsync.
//!
//! boardsync keeps an issue's labels and the column its card sits in on a
//! GitHub project board consistent. A *sync state* pairs a set of labels with
//! one column; whichever side a human changes, the engine rewrites the other.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! The GitHub adapter implements [`RepositoryGateway`]; the webhook receiver
//! decodes deliveries into [`SyncEvent`]s and hands them to the
//! [`EventDispatcher`].
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`IssueNumber`, `ColumnId`, `LabelName`, etc.) |
//! | [`types`] | Value types (`Issue`, `ProjectCard`, `LabelSet`, `Timestamp`, etc.) |
//! | [`errors`] | Gateway, configuration, and reconciliation errors |
//! | [`cache`] | Process-lifetime lookup cache for projects, columns, and cards |
//! | [`gateway`] | The [`RepositoryGateway`] port |
//! | [`registry`] | Sync-state definitions and the [`SyncStateRegistry`] |
//! | [`engine`] | The [`ReconciliationEngine`] |
//! | [`events`] | Typed webhook events |
//! | [`dispatcher`] | Self-trigger suppression and routing to the engine |
//! | `testing` | In-memory gateway (`test-support` feature) |

pub mod cache;
pub mod dispatcher;
pub mod engine;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod identifiers;
pub mod registry;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use cache::{CacheInvalidation, CacheStats, LookupCache, CACHE_INVALIDATION};
pub use dispatcher::{DispatchOutcome, DispatchSummary, EventDispatcher};
pub use engine::{corrected_labels, ReconcileOutcome, ReconciliationEngine};
pub use errors::{ConfigurationError, GatewayError, SyncError};
pub use events::{
    Actor, IssuesAction, IssuesEvent, ProjectCardAction, ProjectCardEvent, SyncEvent,
};
pub use gateway::RepositoryGateway;
pub use identifiers::{
    BotIdentity, CardId, ColumnId, ColumnName, IssueId, IssueNumber, LabelName, ProjectId,
    ProjectName, StateName,
};
pub use registry::{ColumnRef, SyncState, SyncStateDefinition, SyncStateRegistry};
pub use types::{
    issue_number_from_url, trailing_number, CardPosition, Column, Issue, Label, LabelSet, Project,
    ProjectCard, Timestamp,
};
