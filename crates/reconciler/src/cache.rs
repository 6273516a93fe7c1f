//! Process-local lookup cache for board directory objects.
//!
//! Projects and columns are resolved by name once and then reused for the
//! lifetime of the process. Renaming a project or column on GitHub therefore
//! requires a restart. Cards are recorded as last-seen snapshots only: card
//! placement is volatile, so every decision that depends on it re-reads the
//! column from GitHub.
//!
//! The cache is shared by concurrent webhook deliveries. Each map sits behind
//! its own [`RwLock`]; readers never block each other. Staleness is accepted,
//! so the locks only guarantee memory safety, not freshness.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{CardId, Column, ColumnId, ColumnName, Project, ProjectCard, ProjectName};

/// When cached entries are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheInvalidation {
    /// Entries live as long as the process.
    Never,
}

/// The invalidation policy every [`LookupCache`] follows.
pub const CACHE_INVALIDATION: CacheInvalidation = CacheInvalidation::Never;

/// Entry counts, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub projects: usize,
    pub columns: usize,
    pub cards: usize,
}

/// Memoizes project, column, and card lookups.
#[derive(Debug, Default)]
pub struct LookupCache {
    projects: RwLock<HashMap<ProjectName, Project>>,
    columns: RwLock<HashMap<(ProjectName, ColumnName), Column>>,
    columns_by_id: RwLock<HashMap<ColumnId, Column>>,
    cards: RwLock<HashMap<CardId, ProjectCard>>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the invalidation policy of this cache.
    pub fn invalidation(&self) -> CacheInvalidation {
        CACHE_INVALIDATION
    }

    // -- projects -----------------------------------------------------------

    pub fn project(&self, name: &ProjectName) -> Option<Project> {
        read(&self.projects).get(name).cloned()
    }

    pub fn insert_project(&self, project: Project) {
        write(&self.projects).insert(project.name.clone(), project);
    }

    // -- columns ------------------------------------------------------------

    /// Looks up a column by its project and column names.
    pub fn column(&self, project: &ProjectName, column: &ColumnName) -> Option<Column> {
        read(&self.columns)
            .get(&(project.clone(), column.clone()))
            .cloned()
    }

    pub fn column_by_id(&self, id: ColumnId) -> Option<Column> {
        read(&self.columns_by_id).get(&id).cloned()
    }

    /// Records a column under both its name pair and its ID.
    pub fn insert_column(&self, project: &ProjectName, column: Column) {
        write(&self.columns_by_id).insert(column.id, column.clone());
        write(&self.columns).insert((project.clone(), column.name.clone()), column);
    }

    /// Records a column whose project is unknown; only ID lookups will find it.
    pub fn insert_column_by_id(&self, column: Column) {
        write(&self.columns_by_id).insert(column.id, column);
    }

    // -- cards --------------------------------------------------------------

    /// Returns the last-seen snapshot of a card.
    pub fn card(&self, id: CardId) -> Option<ProjectCard> {
        read(&self.cards).get(&id).cloned()
    }

    /// Records a card snapshot, returning the one it replaced.
    pub fn record_card(&self, card: ProjectCard) -> Option<ProjectCard> {
        write(&self.cards).insert(card.id, card)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            projects: read(&self.projects).len(),
            columns: read(&self.columns_by_id).len(),
            cards: read(&self.cards).len(),
        }
    }
}

// A poisoned lock still guards consistent map data: every write is a single
// insert.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
